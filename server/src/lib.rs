//! kryptochat-server – Bibliotheks-Root
//!
//! Setzt Relay und Observability-Server aus der Konfiguration zusammen und
//! stellt den Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use kryptochat_crypto::KeyAuthority;
use kryptochat_observability::{observability_server_starten, HealthState, RelayMetrics};
use kryptochat_relay::{RelayServer, RelayState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Initialisierter, aber noch nicht laufender Server
pub struct Server {
    config: ServerConfig,
    state: Arc<RelayState>,
    relay: RelayServer,
    health: HealthState,
}

impl Server {
    /// Validiert die Konfiguration, erzeugt das RSA-Schluesselpaar und
    /// bindet den Relay-Socket
    ///
    /// Scheitert die Schluesselerzeugung, startet der Server nicht.
    pub async fn initialisieren(config: ServerConfig) -> Result<Self> {
        config.validieren()?;

        let bits = config.krypto.rsa_bits;
        tracing::info!(bits, "RSA-Schluesselpaar wird erzeugt");
        let authority = tokio::task::spawn_blocking(move || KeyAuthority::generieren(bits))
            .await
            .context("Schluesselerzeugung abgebrochen")?
            .context("RSA-Schluesselpaar konnte nicht erzeugt werden")?;

        let metriken = RelayMetrics::neu()?;
        let health = HealthState::neu(metriken.clone());
        let state = RelayState::neu(config.relay_config(), Arc::new(authority), metriken);

        let bind_addr: SocketAddr = config
            .tcp_bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{}'", config.tcp_bind_adresse()))?;
        let relay = RelayServer::binden(Arc::clone(&state), bind_addr)
            .await
            .with_context(|| format!("TCP-Port {bind_addr} konnte nicht gebunden werden"))?;

        Ok(Self {
            config,
            state,
            relay,
            health,
        })
    }

    /// Tatsaechliche Adresse des Relay-Sockets (relevant bei Port 0)
    pub fn relay_adresse(&self) -> Result<SocketAddr> {
        Ok(self.relay.lokale_adresse()?)
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt
    ///
    /// Reihenfolge:
    /// 1. Observability-Server starten (falls aktiviert)
    /// 2. Relay-Accept-Loop ausfuehren
    /// 3. Auf das Ende des Observability-Nachlaufs warten
    ///
    /// `/health` meldet `shutting_down`, sobald das Signal eintrifft.
    pub async fn ausfuehren(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %self.relay.lokale_adresse()?,
            max_clients = self.config.server.max_clients,
            richtlinie = ?self.config.relay.schluessel_richtlinie,
            "Server startet"
        );

        let observability = if self.config.observability.aktiviert {
            let obs_addr: SocketAddr = self
                .config
                .observability_bind_adresse()
                .parse()
                .context("Ungueltige Observability-Adresse")?;
            let nachlauf = Duration::from_millis(self.config.observability.shutdown_nachlauf_ms);
            let metriken = self.state.metriken.clone();
            let health = self.health.clone();
            let obs_shutdown = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                if let Err(e) =
                    observability_server_starten(obs_addr, metriken, health, obs_shutdown, nachlauf)
                        .await
                {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }))
        } else {
            None
        };

        self.relay.starten(shutdown_rx).await?;

        if let Some(handle) = observability {
            if let Err(e) = handle.await {
                tracing::error!(fehler = %e, "Observability-Task abgebrochen");
            }
        }

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Wartet auf Ctrl-C und setzt das Shutdown-Signal
pub async fn auf_ctrl_c_warten(shutdown_tx: watch::Sender<bool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
        Err(e) => tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht registriert werden"),
    }
    let _ = shutdown_tx.send(true);
}
