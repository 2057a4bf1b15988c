//! Gemeinsame Identifikationstypen fuer Kryptochat
//!
//! Newtype-Pattern, damit Verbindungs-IDs und Raumnamen zur Compilezeit
//! nicht mit beliebigen Strings verwechselt werden koennen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID einer TCP-Verbindung (eine Session pro Verbindung)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Name eines Raums
///
/// Raumnamen sind frei waehlbar und unterscheiden Gross-/Kleinschreibung.
/// Auf dem Wire ist der Name ein einfacher JSON-String.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Erstellt einen Raumnamen (ohne Pruefung)
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Gibt den Namen als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ein Raumname ist gueltig wenn er nicht nur aus Leerzeichen besteht
    pub fn ist_gueltig(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl From<&str> for RoomName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RoomName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
