//! Event-Broadcaster – Send-Queues aller verbundenen Clients
//!
//! Jede Verbindung besitzt eine begrenzte mpsc-Queue. Der Verbindungs-Task
//! liest daraus und schreibt auf den TCP-Stream. Eingereiht wird immer
//! nicht-blockierend (`try_send`), damit ein langsamer Client keine anderen
//! Sessions aufhaelt. Ist eine Queue voll, wird die Nachricht fuer diesen
//! Empfaenger verworfen.
//!
//! ## Selektives Broadcasting
//! - An eine Verbindung: `an_verbindung_senden`
//! - An eine Liste von Verbindungen: `an_verbindungen_senden`
//! - An alle Verbindungen: `an_alle_senden`

use dashmap::DashMap;
use kryptochat_core::types::ConnectionId;
use kryptochat_protocol::control::ControlMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Standard-Groesse der Send-Queue pro Client
pub const STANDARD_SEND_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Clients
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub connection_id: ConnectionId,
    pub tx: mpsc::Sender<ControlMessage>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ControlMessage) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    "Send-Queue voll – Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    "Send-Queue geschlossen (Client getrennt)"
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle verbundenen Clients
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    clients: DashMap<ConnectionId, ClientSender>,
    queue_groesse: usize,
}

impl EventBroadcaster {
    pub fn neu(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert einen neuen Client und gibt seine Empfangs-Queue zurueck
    ///
    /// Die Verbindung liest aus dieser Queue und sendet via TCP.
    pub fn client_registrieren(&self, connection_id: ConnectionId) -> mpsc::Receiver<ControlMessage> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        self.inner
            .clients
            .insert(connection_id, ClientSender { connection_id, tx });
        tracing::debug!(connection_id = %connection_id, "Client im Broadcaster registriert");
        rx
    }

    pub fn client_entfernen(&self, connection_id: &ConnectionId) {
        if self.inner.clients.remove(connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Client aus Broadcaster entfernt");
        }
    }

    /// Sendet eine Nachricht an eine einzelne Verbindung
    pub fn an_verbindung_senden(&self, connection_id: &ConnectionId, nachricht: ControlMessage) -> bool {
        match self.inner.clients.get(connection_id) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(connection_id = %connection_id, "Senden an unbekannte Verbindung");
                false
            }
        }
    }

    /// Sendet eine Nachricht an alle genannten Verbindungen
    ///
    /// Gibt die Anzahl der erfolgreich eingereihten Nachrichten zurueck.
    pub fn an_verbindungen_senden<'a>(
        &self,
        empfaenger: impl IntoIterator<Item = &'a ConnectionId>,
        nachricht: &ControlMessage,
    ) -> usize {
        empfaenger
            .into_iter()
            .filter(|id| self.an_verbindung_senden(id, nachricht.clone()))
            .count()
    }

    /// Sendet eine Nachricht an alle verbundenen Clients
    pub fn an_alle_senden(&self, nachricht: &ControlMessage) -> usize {
        self.inner
            .clients
            .iter()
            .filter(|entry| entry.value().senden(nachricht.clone()))
            .count()
    }

    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn ist_registriert(&self, connection_id: &ConnectionId) -> bool {
        self.inner.clients.contains_key(connection_id)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu(STANDARD_SEND_QUEUE_GROESSE)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
