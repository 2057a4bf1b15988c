//! # kryptochat-crypto
//!
//! Kryptografie fuer Kryptochat.
//!
//! ## Module
//! - `authority` - RSA-Schluesselpaar des Servers, Entpacken eingewickelter Raum-Schluessel
//! - `room_key` - Raum-Schluessel erzeugen und fuer den Server einwickeln (Client-Seite)
//! - `message` - AES-GCM Verschluesselung von Chat-Nachrichten (Client-Seite)
//! - `types` - Gemeinsame Typen (SecretBytes, EncryptedMessage)
//! - `error` - Fehlertypen

pub mod authority;
pub mod error;
pub mod message;
pub mod room_key;
pub mod types;

pub use authority::{KeyAuthority, MIN_RSA_BITS};
pub use error::{CryptoError, CryptoResult};
pub use message::{decrypt_message, encrypt_message};
pub use room_key::{generate_room_key, wrap_room_key, wrap_room_key_base64};
pub use types::{EncryptedMessage, SecretBytes};
