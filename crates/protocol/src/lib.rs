//! kryptochat-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen, die zwischen Client und
//! Relay-Server ausgetauscht werden, sowie das Frame-Format auf TCP.

pub mod control;
pub mod wire;

pub use control::{ControlMessage, ControlPayload, ErrorCode};
pub use wire::FrameCodec;
