//! RSA-Schluesselautoritaet des Servers
//!
//! Das Schluesselpaar wird einmal beim Start erzeugt und lebt so lange wie
//! der Prozess. Nach aussen sichtbar sind nur der oeffentliche Schluessel
//! (SPKI-PEM) und die Entpack-Operation. Der private Schluessel wird weder
//! geklont noch serialisiert.
//!
//! Entpacken nutzt RSA-OAEP mit SHA-256. Der Server sieht den entpackten
//! Raum-Schluessel im Klartext.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::types::SecretBytes;

/// Minimale RSA-Schluessellaenge in Bit
pub const MIN_RSA_BITS: usize = 2048;

/// Haelt das RSA-Schluesselpaar des Servers
pub struct KeyAuthority {
    private_key: RsaPrivateKey,
    public_key_pem: String,
    bits: usize,
}

impl KeyAuthority {
    /// Erzeugt ein neues Schluesselpaar (e = 65537)
    ///
    /// Schlaegt fehl wenn `bits` kleiner als [`MIN_RSA_BITS`] ist.
    /// Die Erzeugung ist rechenintensiv und sollte nicht auf einem
    /// Async-Worker laufen.
    pub fn generieren(bits: usize) -> CryptoResult<Self> {
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::SchluesselZuKurz {
                bits,
                minimum: MIN_RSA_BITS,
            });
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::SchluesselGenerierung(e.to_string()))?;
        let public_key_pem = RsaPublicKey::from(&private_key)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::SchluesselGenerierung(e.to_string()))?;

        tracing::info!(bits, "RSA-Schluesselpaar erzeugt");

        Ok(Self {
            private_key,
            public_key_pem,
            bits,
        })
    }

    /// Oeffentlicher Schluessel im SPKI-PEM-Format
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Entpackt einen RSA-OAEP-eingewickelten Raum-Schluessel
    ///
    /// Fehlschlaege (fremder Schluessel, Padding, Laenge) liefern
    /// [`CryptoError::Entpacken`] und veraendern keinen Zustand.
    pub fn entpacken(&self, wrapped: &[u8]) -> CryptoResult<SecretBytes> {
        let key = self
            .private_key
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map(SecretBytes::new)
            .map_err(|e| CryptoError::Entpacken(e.to_string()))?;

        if !key.ist_aes_schluessel() {
            return Err(CryptoError::Entpacken(format!(
                "kein AES-Schluessel ({} Bytes)",
                key.len()
            )));
        }
        Ok(key)
    }

    /// Wie [`entpacken`](Self::entpacken), nimmt aber Base64 entgegen
    pub fn entpacken_base64(&self, wrapped: &str) -> CryptoResult<SecretBytes> {
        let bytes = STANDARD
            .decode(wrapped)
            .map_err(|e| CryptoError::Entpacken(format!("Base64: {}", e)))?;
        self.entpacken(&bytes)
    }
}

impl std::fmt::Debug for KeyAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAuthority")
            .field("bits", &self.bits)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{decrypt_message, encrypt_message};
    use crate::room_key::{generate_room_key, wrap_room_key, wrap_room_key_base64};
    use crate::types::AES_SCHLUESSEL_LAENGEN;
    use std::sync::OnceLock;

    fn authority() -> &'static KeyAuthority {
        static AUTHORITY: OnceLock<KeyAuthority> = OnceLock::new();
        AUTHORITY.get_or_init(|| KeyAuthority::generieren(MIN_RSA_BITS).unwrap())
    }

    #[test]
    fn zu_kurzer_schluessel_wird_abgelehnt() {
        let err = KeyAuthority::generieren(1024).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::SchluesselZuKurz {
                bits: 1024,
                minimum: 2048
            }
        ));
    }

    #[test]
    fn public_key_ist_spki_pem() {
        let pem = authority().public_key_pem();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
        assert_eq!(authority().bits(), 2048);
    }

    #[test]
    fn eingewickelter_schluessel_wird_exakt_entpackt() {
        let key = generate_room_key();
        let wrapped = wrap_room_key(authority().public_key_pem(), &key).unwrap();
        let entpackt = authority().entpacken(&wrapped).unwrap();
        assert_eq!(entpackt, key);
    }

    #[test]
    fn base64_variante() {
        let key = SecretBytes::new(vec![7u8; 16]);
        let wrapped = wrap_room_key_base64(authority().public_key_pem(), &key).unwrap();
        let entpackt = authority().entpacken_base64(&wrapped).unwrap();
        assert_eq!(entpackt.as_bytes(), &[7u8; 16]);
    }

    #[test]
    fn fremder_ciphertext_schlaegt_fehl() {
        let muell = vec![0x42u8; 256];
        assert!(matches!(
            authority().entpacken(&muell),
            Err(CryptoError::Entpacken(_))
        ));
    }

    #[test]
    fn kaputtes_base64_schlaegt_fehl() {
        assert!(matches!(
            authority().entpacken_base64("%%%"),
            Err(CryptoError::Entpacken(_))
        ));
        assert!(authority().entpacken_base64("").is_err());
    }

    #[test]
    fn kein_aes_schluessel_wird_abgelehnt() {
        let kurz = SecretBytes::new(vec![1u8; 10]);
        let wrapped = wrap_room_key(authority().public_key_pem(), &kurz).unwrap();
        assert!(matches!(
            authority().entpacken(&wrapped),
            Err(CryptoError::Entpacken(_))
        ));
    }

    #[test]
    fn aes192_schluessel_wird_nicht_angenommen() {
        let key = SecretBytes::new(vec![5u8; 24]);
        let wrapped = wrap_room_key(authority().public_key_pem(), &key).unwrap();
        assert!(matches!(
            authority().entpacken(&wrapped),
            Err(CryptoError::Entpacken(_))
        ));
    }

    #[test]
    fn jeder_angenommene_schluessel_ist_verwendbar() {
        for laenge in AES_SCHLUESSEL_LAENGEN {
            let key = SecretBytes::new(vec![3u8; laenge]);
            let wrapped = wrap_room_key(authority().public_key_pem(), &key).unwrap();
            let entpackt = authority().entpacken(&wrapped).unwrap();
            let msg = encrypt_message(&entpackt, b"hallo").unwrap();
            assert_eq!(decrypt_message(&entpackt, &msg).unwrap(), b"hallo");
        }
    }

    #[test]
    fn debug_verraet_keinen_privaten_schluessel() {
        let debug = format!("{:?}", authority());
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("2048"));
    }
}
