//! Gemeinsame Hilfen fuer Unit-Tests

use kryptochat_core::types::{ConnectionId, RoomName};
use kryptochat_crypto::{KeyAuthority, MIN_RSA_BITS};
use kryptochat_observability::RelayMetrics;
use kryptochat_protocol::control::ControlMessage;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

use crate::server_state::{RelayConfig, RelayState};

/// RSA-Schluessel einmal pro Test-Binary erzeugen
pub(crate) fn test_authority() -> Arc<KeyAuthority> {
    static AUTHORITY: OnceLock<Arc<KeyAuthority>> = OnceLock::new();
    AUTHORITY
        .get_or_init(|| Arc::new(KeyAuthority::generieren(MIN_RSA_BITS).unwrap()))
        .clone()
}

pub(crate) fn test_state(config: RelayConfig) -> Arc<RelayState> {
    RelayState::neu(config, test_authority(), RelayMetrics::neu().unwrap())
}

/// Registriert eine Verbindung und setzt sie direkt in einen Raum,
/// ohne Raumliste, Bestaetigung oder Benachrichtigungen zu verschicken
pub(crate) fn verbundene_verbindung(
    state: &RelayState,
) -> (ConnectionId, mpsc::Receiver<ControlMessage>) {
    let id = ConnectionId::new();
    let rx = state.broadcaster.client_registrieren(id);
    state.sessions.registrieren(id);
    state.sessions.public_key_gesendet(&id);
    (id, rx)
}

pub(crate) fn beigetretene_verbindung(
    state: &RelayState,
    username: &str,
    raum: &str,
) -> (ConnectionId, mpsc::Receiver<ControlMessage>) {
    let (id, rx) = verbundene_verbindung(state);
    let raum = RoomName::from(raum);
    state.registry.beitreten(&raum, id);
    state.sessions.beigetreten(&id, username, raum).unwrap();
    (id, rx)
}

/// Leert eine Empfangs-Queue und gibt alle Nachrichten zurueck
pub(crate) fn alle_empfangen(rx: &mut mpsc::Receiver<ControlMessage>) -> Vec<ControlMessage> {
    let mut nachrichten = Vec::new();
    while let Ok(n) = rx.try_recv() {
        nachrichten.push(n);
    }
    nachrichten
}
