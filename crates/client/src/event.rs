//! Ereignisse, die der Client an die Anwendung weiterreicht

use chrono::{DateTime, Utc};
use kryptochat_core::types::RoomName;
use kryptochat_protocol::ErrorCode;

/// Inhalt einer empfangenen Chat-Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInhalt {
    Text(String),
    /// Entschluesselung fehlgeschlagen (falscher oder fehlender Schluessel)
    Unentschluesselbar,
}

impl ChatInhalt {
    pub fn als_text(&self) -> Option<&str> {
        match self {
            ChatInhalt::Text(t) => Some(t),
            ChatInhalt::Unentschluesselbar => None,
        }
    }
}

/// Ereignis aus `RelayClient::naechstes_ereignis`
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    RaumListe(Vec<RoomName>),
    Beigetreten {
        raum: RoomName,
        mitglieder: Vec<String>,
        schluessel_vorhanden: bool,
    },
    /// Raum-Schluessel vom Server erhalten
    SchluesselBereit {
        raum: RoomName,
        epoch: u64,
        /// Ob es der selbst eingereichte Schluessel ist
        eigener: bool,
    },
    Nachricht {
        raum: RoomName,
        sender: String,
        inhalt: ChatInhalt,
        zeitstempel: Option<DateTime<Utc>>,
    },
    BenutzerBeigetreten {
        raum: RoomName,
        username: String,
    },
    BenutzerVerlassen {
        raum: RoomName,
        username: String,
    },
    ServerFehler {
        code: ErrorCode,
        message: String,
    },
}
