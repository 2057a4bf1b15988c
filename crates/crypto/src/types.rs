//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{CryptoError, CryptoResult};

/// Laenge einer AES-GCM Nonce in Bytes
pub const NONCE_LEN: usize = 12;

/// Erlaubte AES-Schluessellaengen (128 und 256 Bit)
///
/// Muss zu den Laengen passen, die `encrypt_message`/`decrypt_message`
/// verarbeiten.
pub const AES_SCHLUESSEL_LAENGEN: [usize; 2] = [16, 32];

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Dekodiert einen Base64-String
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        Ok(Self(STANDARD.decode(encoded)?))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Prueft ob die Laenge einem AES-Schluessel entspricht
    pub fn ist_aes_schluessel(&self) -> bool {
        AES_SCHLUESSEL_LAENGEN.contains(&self.0.len())
    }
}

/// Verschluesselte Chat-Nachricht (Ciphertext inkl. Auth-Tag + Nonce)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    pub fn ciphertext_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    pub fn iv_base64(&self) -> String {
        STANDARD.encode(self.nonce)
    }

    /// Baut eine Nachricht aus den Base64-Feldern eines Envelopes
    pub fn from_base64(ciphertext: &str, iv: &str) -> CryptoResult<Self> {
        let ciphertext = STANDARD.decode(ciphertext)?;
        let iv = STANDARD.decode(iv)?;
        let nonce: [u8; NONCE_LEN] =
            iv.as_slice()
                .try_into()
                .map_err(|_| CryptoError::UngueltigeNonce {
                    erwartet: NONCE_LEN,
                    erhalten: iv.len(),
                })?;
        Ok(Self { nonce, ciphertext })
    }
}
