//! kryptochat-client – Client-Endpunkt fuer den Kryptochat-Relay
//!
//! Der Client erzeugt den Raum-Schluessel selbst, wickelt ihn mit dem
//! Public Key des Servers ein und ver- bzw. entschluesselt Chat-Inhalte
//! lokal. Der Server sieht nur Ciphertext und IV.
//!
//! ```text
//! verbinden ──► public_key
//! beitreten ──► room_list, room_joined
//!               key_present = false ──► key_submission (automatisch)
//!               key_distribution    ──► SchluesselBereit
//! nachricht_senden ──► chat_message (AES-GCM)
//! ```

pub mod connection;
pub mod error;
pub mod event;

pub use connection::RelayClient;
pub use error::{ClientError, ClientResult};
pub use event::{ChatInhalt, ClientEvent};
