//! kryptochat-relay – TCP-Relay fuer Ende-zu-Ende verschluesselte Raeume
//!
//! Der Relay-Service verwaltet TCP-Verbindungen, Raeume und die
//! Verteilung der Raum-Schluessel. Chat-Inhalte sieht er nur als
//! AES-GCM-Ciphertext.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (RelayServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Verbindend -> PublicKeyGesendet -> Beigetreten -> SchluesselBereit
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- RoomHandler     (join, create_room, leave_room)
//!     +-- KeyLifecycle    (key_submission -> key_distribution)
//!     +-- Relay           (chat_message Fan-out)
//!
//! RoomRegistry     – Raeume, Mitglieder, aktueller Schluessel
//! SessionManager   – Zustand pro Verbindung
//! EventBroadcaster – Send-Queues pro Verbindung
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod key_lifecycle;
pub mod registry;
pub mod relay;
pub mod server_state;
pub mod session;
pub mod tcp;

#[cfg(test)]
mod test_hilfe;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use connection::ClientConnection;
pub use dispatcher::MessageDispatcher;
pub use error::{DropReason, RelayError, RelayResult};
pub use registry::RoomRegistry;
pub use server_state::{RelayConfig, RelayState, SchluesselRichtlinie};
pub use session::SessionManager;
pub use tcp::RelayServer;
