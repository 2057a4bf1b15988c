//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `RelayServer` startet fuer jede eingehende Verbindung einen eigenen
//! tokio-Task mit einer `ClientConnection`. Jede Verbindung braucht einen
//! freien Platz im Semaphor des `RelayState`. Ist keiner frei, bekommt der
//! Client `error{server_full}` und die Verbindung wird geschlossen.

use futures_util::SinkExt;
use kryptochat_protocol::{
    control::{ControlMessage, ErrorCode},
    wire::FrameCodec,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::Framed;

use crate::connection::ClientConnection;
use crate::server_state::RelayState;

/// TCP-Relay-Server
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
}

impl RelayServer {
    /// Bindet den TCP-Socket
    ///
    /// Port 0 waehlt einen freien Port, siehe `lokale_adresse`.
    pub async fn binden(state: Arc<RelayState>, bind_addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self { state, listener })
    }

    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        let lokale_addr = self.listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            server = %self.state.config.server_name,
            max_clients = self.state.config.max_clients,
            "TCP Relay-Server gestartet"
        );

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => self.annehmen(stream, peer_addr, &shutdown_rx),
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Relay-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("TCP Relay-Server gestoppt");
        Ok(())
    }

    fn annehmen(&self, stream: TcpStream, peer_addr: SocketAddr, shutdown_rx: &watch::Receiver<bool>) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }

        let platz = match Arc::clone(&self.state.verbindungs_plaetze).try_acquire_owned() {
            Ok(platz) => platz,
            Err(_) => {
                tracing::warn!(
                    peer = %peer_addr,
                    max = self.state.config.max_clients,
                    "Server voll – Verbindung abgelehnt"
                );
                tokio::spawn(ablehnen(stream));
                return;
            }
        };

        tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
        let verbindung = ClientConnection::neu(Arc::clone(&self.state), peer_addr, platz);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            verbindung.verarbeiten(stream, shutdown_rx).await;
        });
    }
}

/// Sendet `server_full` und schliesst die Verbindung
async fn ablehnen(stream: TcpStream) {
    let mut framed = Framed::new(stream, FrameCodec::new());
    let antwort = ControlMessage::error(0, ErrorCode::ServerFull, "Server ist voll");
    if let Err(e) = framed.send(antwort).await {
        tracing::debug!(fehler = %e, "server_full konnte nicht gesendet werden");
    }
}
