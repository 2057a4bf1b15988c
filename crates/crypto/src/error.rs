//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Schluessel-Generierung fehlgeschlagen: {0}")]
    SchluesselGenerierung(String),

    #[error("RSA-Schluessel zu kurz: {bits} Bit (Minimum: {minimum} Bit)")]
    SchluesselZuKurz { bits: usize, minimum: usize },

    #[error("Ungueltiger oeffentlicher Schluessel: {0}")]
    UngueltigerPublicKey(String),

    /// Eingewickelter Schluessel konnte nicht entpackt werden
    /// (fremder Schluessel, kaputtes Padding, falsche Laenge)
    #[error("Entpacken fehlgeschlagen: {0}")]
    Entpacken(String),

    #[error("Einwickeln fehlgeschlagen: {0}")]
    Einwickeln(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    #[error("Entschluesselung fehlgeschlagen")]
    Entschluesselung,

    #[error("Ungueltige Nonce-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeNonce { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Schluessel-Laenge: {0} Bytes")]
    UngueltigeSchluesselLaenge(usize),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
