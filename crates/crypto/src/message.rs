//! Chat-Nachrichten Verschluesselung (Client-Seite)
//!
//! AES-GCM mit dem Raum-Schluessel und einer frischen 12-Byte-Zufallsnonce
//! pro Nachricht. Der Auth-Tag (16 Bytes) haengt am Ciphertext.
//!
//! Unterstuetzt werden 128- und 256-Bit-Schluessel.

use aes_gcm::{
    aead::{consts::U12, Aead, KeyInit},
    Aes128Gcm, Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{EncryptedMessage, SecretBytes, NONCE_LEN};

/// Verschluesselt eine Nachricht mit dem Raum-Schluessel
pub fn encrypt_message(key: &SecretBytes, plaintext: &[u8]) -> CryptoResult<EncryptedMessage> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let aes_nonce = Nonce::<U12>::from_slice(&nonce);

    let ciphertext = match key.len() {
        16 => Aes128Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?
            .encrypt(aes_nonce, plaintext),
        32 => Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?
            .encrypt(aes_nonce, plaintext),
        andere => return Err(CryptoError::UngueltigeSchluesselLaenge(andere)),
    }
    .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    Ok(EncryptedMessage { nonce, ciphertext })
}

/// Entschluesselt eine Nachricht mit dem Raum-Schluessel
///
/// Falscher Schluessel oder manipulierter Ciphertext liefern
/// [`CryptoError::Entschluesselung`].
pub fn decrypt_message(key: &SecretBytes, message: &EncryptedMessage) -> CryptoResult<Vec<u8>> {
    let aes_nonce = Nonce::<U12>::from_slice(&message.nonce);

    match key.len() {
        16 => Aes128Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::Entschluesselung)?
            .decrypt(aes_nonce, message.ciphertext.as_slice()),
        32 => Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::Entschluesselung)?
            .decrypt(aes_nonce, message.ciphertext.as_slice()),
        andere => return Err(CryptoError::UngueltigeSchluesselLaenge(andere)),
    }
    .map_err(|_| CryptoError::Entschluesselung)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
