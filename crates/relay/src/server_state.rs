//! Gemeinsamer Server-Zustand fuer den Relay-Service
//!
//! Haelt alle geteilten Services und Zustands-Manager, die sicher zwischen
//! tokio-Tasks geteilt werden koennen. Es gibt keinen globalen Zustand: jeder
//! Server (und jeder Test) baut sich seinen eigenen `RelayState`.

use kryptochat_crypto::KeyAuthority;
use kryptochat_observability::RelayMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::broadcast::{EventBroadcaster, STANDARD_SEND_QUEUE_GROESSE};
use crate::registry::RoomRegistry;
use crate::session::SessionManager;

/// Wer einen vorhandenen Raum-Schluessel ersetzen darf
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchluesselRichtlinie {
    /// Jedes Mitglied des Raums (letzter Schreiber gewinnt)
    #[default]
    JederTeilnehmer,
    /// Nur die Verbindung, die den Raum angelegt hat. Den ersten Schluessel
    /// darf jedes Mitglied setzen.
    NurErsteller,
}

/// Konfiguration fuer den Relay-Service
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_clients: usize,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer stille Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Chat-Envelopes auch an den Absender zurueckschicken
    pub echo_an_absender: bool,
    pub schluessel_richtlinie: SchluesselRichtlinie,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server_name: "Kryptochat Relay".to_string(),
            max_clients: 512,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: STANDARD_SEND_QUEUE_GROESSE,
            echo_an_absender: false,
            schluessel_richtlinie: SchluesselRichtlinie::default(),
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    /// RSA-Schluesselpaar des Servers (nur Public Key und Entpacken sichtbar)
    pub authority: Arc<KeyAuthority>,
    pub registry: RoomRegistry,
    pub sessions: SessionManager,
    pub broadcaster: EventBroadcaster,
    pub metriken: RelayMetrics,
    /// Freie Verbindungsplaetze (`max_clients`)
    pub verbindungs_plaetze: Arc<Semaphore>,
}

impl RelayState {
    pub fn neu(
        config: RelayConfig,
        authority: Arc<KeyAuthority>,
        metriken: RelayMetrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            broadcaster: EventBroadcaster::neu(config.send_queue_groesse),
            verbindungs_plaetze: Arc::new(Semaphore::new(config.max_clients)),
            config: Arc::new(config),
            authority,
            registry: RoomRegistry::neu(),
            sessions: SessionManager::neu(),
            metriken,
        })
    }

    /// Aktualisiert die Raum-Gauge
    pub fn raum_gauge_aktualisieren(&self) {
        self.metriken.rooms_active.set(self.registry.anzahl() as i64);
    }
}
