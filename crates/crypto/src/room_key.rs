//! Raum-Schluessel (Client-Seite)
//!
//! Der erste Teilnehmer eines Raums erzeugt den symmetrischen Schluessel,
//! wickelt ihn mit dem oeffentlichen Schluessel des Servers ein und sendet
//! ihn als `key_submission`.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::types::SecretBytes;

/// Laenge eines neu erzeugten Raum-Schluessels (AES-256)
pub const ROOM_KEY_LEN: usize = 32;

/// Erzeugt einen neuen zufaelligen Raum-Schluessel aus dem OS-CSPRNG
pub fn generate_room_key() -> SecretBytes {
    let mut key = vec![0u8; ROOM_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    SecretBytes::new(key)
}

/// Wickelt einen Raum-Schluessel mit RSA-OAEP (SHA-256) ein
///
/// `public_key_pem` ist der vom Server angekuendigte SPKI-PEM-Schluessel.
pub fn wrap_room_key(public_key_pem: &str, key: &SecretBytes) -> CryptoResult<Vec<u8>> {
    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| CryptoError::UngueltigerPublicKey(e.to_string()))?;

    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::Einwickeln(e.to_string()))
}

/// Wie [`wrap_room_key`], liefert Base64 fuer das `wrapped_key`-Feld
pub fn wrap_room_key_base64(public_key_pem: &str, key: &SecretBytes) -> CryptoResult<String> {
    wrap_room_key(public_key_pem, key).map(|w| STANDARD.encode(w))
}
