//! Fehlertypen fuer den Client

use kryptochat_crypto::CryptoError;
use kryptochat_protocol::ErrorCode;
use thiserror::Error;

/// Fehler die bei der Verbindung zum Relay auftreten koennen
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP-Verbindung oder Frame-Fehler
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Krypto-Fehler: {0}")]
    Krypto(#[from] CryptoError),

    /// Server hat die Verbindung geschlossen
    #[error("Verbindung vom Server getrennt")]
    VerbindungGetrennt,

    /// Server hat mit einem Fehler geantwortet (z.B. `server_full`)
    #[error("Server-Fehler ({code:?}): {message}")]
    Server { code: ErrorCode, message: String },

    /// Noch keinem Raum beigetreten
    #[error("Kein Raum beigetreten")]
    KeinRaum,

    /// Fuer den aktuellen Raum liegt noch kein Schluessel vor
    #[error("Kein Raum-Schluessel vorhanden")]
    KeinRaumSchluessel,
}

/// Result-Typ fuer den Client
pub type ClientResult<T> = Result<T, ClientError>;
