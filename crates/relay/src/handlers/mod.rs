//! Handler fuer Raum-Nachrichten
//!
//! Schluessel-Einreichungen laufen ueber `key_lifecycle`, Chat-Envelopes
//! ueber `relay`.

pub mod room_handler;
