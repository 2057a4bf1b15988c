//! Control-Protokoll (TCP)
//!
//! Definiert alle Nachrichten, die ueber die TCP-Verbindung zwischen Client
//! und Relay-Server ausgetauscht werden.
//!
//! ## Design
//! - Jede Nachricht traegt eine `request_id: u32`; Server-Pushes verwenden 0
//! - JSON-Serialisierung via serde
//! - Tagged Enum (`"type"`) fuer typsichere Nachrichtentypen
//! - Felder von Client-Nachrichten sind optional auf dem Wire. Fehlende
//!   Felder werden leer dekodiert und erst im Relay als ungueltig verworfen,
//!   damit ein einzelnes kaputtes Envelope nicht die Verbindung beendet.

use chrono::{DateTime, Utc};
use kryptochat_core::types::RoomName;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Fehler-Codes fuer transportbezogene Fehler-Nachrichten
///
/// Krypto-Fehler (falscher Schluessel, kaputtes Padding) werden bewusst
/// nie als Fehler-Nachricht gemeldet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InternalError,
    InvalidRequest,
    ServerFull,
}

/// Fehler-Antwort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Schluessel-Austausch
// ---------------------------------------------------------------------------

/// Oeffentlicher Schluessel des Servers (direkt nach dem Verbindungsaufbau)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyAnnounce {
    /// RSA Public Key im SPKI-PEM-Format
    pub public_key: String,
    /// Schluessellaenge in Bit
    pub bits: usize,
}

/// Eingewickelter Raum-Schluessel vom Client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeySubmission {
    #[serde(default)]
    pub room: RoomName,
    /// RSA-OAEP-verschluesselter Raum-Schluessel (Base64)
    #[serde(default)]
    pub wrapped_key: String,
}

/// Klartext-Raum-Schluessel vom Server an ein Raum-Mitglied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDistribution {
    pub room: RoomName,
    /// Raum-Schluessel (Base64)
    pub key: String,
    /// Zaehler der Schluesselwechsel in diesem Raum (beginnt bei 1)
    pub epoch: u64,
}

// ---------------------------------------------------------------------------
// Raeume
// ---------------------------------------------------------------------------

/// Raum betreten (oder in einen anderen Raum wechseln)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    /// Frei gewaehlter Anzeigename (nicht authentifiziert)
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub room: RoomName,
}

/// Bestaetigung des Beitritts an den Beitretenden
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomJoinedResponse {
    pub room: RoomName,
    /// Benutzernamen aller Mitglieder (inklusive des Beitretenden)
    pub members: Vec<String>,
    /// Ob der Raum bereits einen Schluessel hat (dann folgt eine KeyDistribution)
    pub key_present: bool,
}

/// Aktuelle Raumliste in Erstellungsreihenfolge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomName>,
}

/// Raum anlegen (idempotent)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub room: RoomName,
}

/// Ein Benutzer hat den Raum betreten oder verlassen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPresence {
    pub room: RoomName,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Verschluesselte Chat-Nachricht
///
/// Der Server sieht nur Ciphertext und IV. `sender` und `timestamp` werden
/// beim Weiterleiten vom Server gesetzt, Client-Werte werden ueberschrieben.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatEnvelope {
    #[serde(default)]
    pub room: RoomName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Ciphertext (Base64)
    #[serde(default)]
    pub ciphertext: String,
    /// Nonce/IV (Base64), pro Nachricht eindeutig
    #[serde(default)]
    pub iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatEnvelope {
    /// Prueft ob Raum, Ciphertext und IV vorhanden sind
    pub fn ist_vollstaendig(&self) -> bool {
        self.room.ist_gueltig() && !self.ciphertext.is_empty() && !self.iv.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

/// Ping (Client -> Server oder Server -> Client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp_ms: u64,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    pub echo_timestamp_ms: u64,
    pub server_timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// Haupt-Enum
// ---------------------------------------------------------------------------

/// Alle moeglichen Control-Nachrichten
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlPayload {
    // Schluessel-Austausch
    PublicKey(PublicKeyAnnounce),
    KeySubmission(KeySubmission),
    KeyDistribution(KeyDistribution),

    // Raeume
    Join(JoinRoomRequest),
    RoomJoined(RoomJoinedResponse),
    RoomList(RoomListResponse),
    CreateRoom(CreateRoomRequest),
    LeaveRoom,
    UserJoined(UserPresence),
    UserLeft(UserPresence),

    // Chat
    ChatMessage(ChatEnvelope),

    // Keepalive
    Ping(PingMessage),
    Pong(PongMessage),

    // Fehler
    Error(ErrorResponse),

    /// Unbekannter Nachrichtentyp (wird ignoriert)
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Control-Frame
// ---------------------------------------------------------------------------

/// Control-Nachricht mit Request-ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(default)]
    pub request_id: u32,
    pub payload: ControlPayload,
}

impl ControlMessage {
    /// Erstellt eine neue Control-Nachricht
    pub fn new(request_id: u32, payload: ControlPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Erstellt einen Server-Push (request_id 0)
    pub fn push(payload: ControlPayload) -> Self {
        Self::new(0, payload)
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(request_id: u32, timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Ping(PingMessage { timestamp_ms }),
        )
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(request_id: u32, echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Pong(PongMessage {
                echo_timestamp_ms,
                server_timestamp_ms,
            }),
        )
    }

    /// Erstellt eine Fehler-Nachricht
    pub fn error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ControlPayload::Error(ErrorResponse {
                code,
                message: message.into(),
            }),
        )
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Aktueller Unix-Timestamp in Millisekunden
pub fn jetzt_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
