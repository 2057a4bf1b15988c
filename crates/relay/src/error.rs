//! Fehlertypen fuer den Relay-Service

use thiserror::Error;

/// Grund fuer das stille Verwerfen einer Client-Nachricht
///
/// Verworfene Nachrichten werden geloggt und gezaehlt, aber nie mit einer
/// Fehler-Nachricht an den Client beantwortet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Eingewickelter Schluessel liess sich nicht entpacken
    EntpackenFehlgeschlagen,
    /// Der genannte Raum existiert nicht
    UnbekannterRaum,
    /// Die Verbindung ist kein Mitglied des genannten Raums
    KeinMitglied,
    /// Envelope ohne Raum, Ciphertext oder IV
    UngueltigesEnvelope,
    /// Raumname leer oder nur Leerzeichen
    UngueltigerRaumname,
    /// Schluessel-Richtlinie erlaubt den Wechsel nicht
    RichtlinieVerweigert,
    /// Nachricht im aktuellen Verbindungszustand nicht erlaubt
    FalscherZustand,
    /// Unbekannter Nachrichtentyp oder reine Server-Nachricht vom Client
    UnerwarteteNachricht,
}

impl DropReason {
    /// Label fuer die Metrik `kryptochat_dropped_messages_total`
    pub fn als_label(&self) -> &'static str {
        match self {
            Self::EntpackenFehlgeschlagen => "unwrap_failed",
            Self::UnbekannterRaum => "unknown_room",
            Self::KeinMitglied => "not_member",
            Self::UngueltigesEnvelope => "malformed_envelope",
            Self::UngueltigerRaumname => "invalid_room_name",
            Self::RichtlinieVerweigert => "policy_denied",
            Self::FalscherZustand => "wrong_state",
            Self::UnerwarteteNachricht => "unexpected_message",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_label())
    }
}

/// Fehlertyp fuer den Relay-Service
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Nachricht wird verworfen (keine Antwort an den Client)
    #[error("Nachricht verworfen: {0}")]
    Verwerfen(DropReason),

    /// Verbindung wurde getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Timeout (Keepalive)
    #[error("Timeout")]
    Timeout,
}

impl From<DropReason> for RelayError {
    fn from(grund: DropReason) -> Self {
        Self::Verwerfen(grund)
    }
}

/// Result-Typ fuer den Relay-Service
pub type RelayResult<T> = Result<T, RelayError>;
