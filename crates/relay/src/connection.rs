//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Direkt nach dem Verbindungsaufbau sendet der Server seinen
//! RSA-Public-Key (`public_key`), danach laufen eingehende Frames durch den
//! `MessageDispatcher` und ausgehende Nachrichten aus der Send-Queue des
//! `EventBroadcaster` auf den Socket.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Kommt innerhalb von `verbindungs_timeout_sek` kein Frame, wird die
//!   Verbindung getrennt

use futures_util::{SinkExt, StreamExt};
use kryptochat_core::types::ConnectionId;
use kryptochat_protocol::{
    control::{jetzt_ms, ControlMessage, ControlPayload, ErrorCode, PublicKeyAnnounce},
    wire::FrameCodec,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Framed;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::error::{RelayError, RelayResult};
use crate::server_state::RelayState;

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Haelt einen Verbindungsplatz (`max_clients`) bis zum Ende des Tasks.
pub struct ClientConnection {
    state: Arc<RelayState>,
    peer_addr: SocketAddr,
    connection_id: ConnectionId,
    _platz: OwnedSemaphorePermit,
}

impl ClientConnection {
    pub fn neu(state: Arc<RelayState>, peer_addr: SocketAddr, platz: OwnedSemaphorePermit) -> Self {
        Self {
            state,
            peer_addr,
            connection_id: ConnectionId::new(),
            _platz: platz,
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird, der Keepalive-Timeout
    /// greift oder ein Shutdown-Signal eingeht. Raeumt danach Raum,
    /// Session und Send-Queue auf.
    pub async fn verarbeiten(self, stream: TcpStream, shutdown_rx: watch::Receiver<bool>) {
        let connection_id = self.connection_id;
        let peer_addr = self.peer_addr;
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        tracing::info!(connection_id = %connection_id, peer = %peer_addr, "Neue Verbindung");

        let sende_rx = self.state.broadcaster.client_registrieren(connection_id);
        self.state.sessions.registrieren(connection_id);
        self.state.metriken.connected_clients.inc();

        let mut framed = Framed::new(stream, FrameCodec::new());
        let ergebnis = self
            .schleife(&mut framed, &dispatcher, sende_rx, shutdown_rx)
            .await;

        match ergebnis {
            Ok(()) | Err(RelayError::VerbindungGetrennt) => {}
            Err(RelayError::Timeout) => {
                tracing::warn!(connection_id = %connection_id, peer = %peer_addr, "Verbindungs-Timeout");
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    peer = %peer_addr,
                    fehler = %e,
                    "Verbindung mit Fehler beendet"
                );
            }
        }

        dispatcher.verbindung_beenden(&connection_id);
        self.state.metriken.connected_clients.dec();

        tracing::info!(connection_id = %connection_id, peer = %peer_addr, "Verbindungs-Task beendet");
    }

    async fn schleife(
        &self,
        framed: &mut Framed<TcpStream, FrameCodec>,
        dispatcher: &MessageDispatcher,
        mut sende_rx: tokio::sync::mpsc::Receiver<ControlMessage>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> RelayResult<()> {
        let ctx = DispatcherContext {
            connection_id: self.connection_id,
            peer_addr: self.peer_addr,
        };
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        // Public Key zuerst, vor jeder anderen Nachricht
        let ankuendigung = ControlMessage::push(ControlPayload::PublicKey(PublicKeyAnnounce {
            public_key: self.state.authority.public_key_pem().to_string(),
            bits: self.state.authority.bits(),
        }));
        framed.send(ankuendigung).await?;
        self.state.sessions.public_key_gesendet(&self.connection_id);

        let mut letzter_empfang = Instant::now();
        let mut keepalive =
            tokio::time::interval_at(Instant::now() + keepalive_intervall, keepalive_intervall);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ping_request_id: u32 = 0;

        loop {
            tokio::select! {
                // Eingehende Nachricht vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(
                                connection_id = %self.connection_id,
                                request_id = nachricht.request_id,
                                "Nachricht empfangen"
                            );
                            if let Some(antwort) = dispatcher.dispatch(nachricht, &ctx) {
                                framed.send(antwort).await?;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::debug!(
                                connection_id = %self.connection_id,
                                fehler = %e,
                                "Frame-Lesefehler"
                            );
                            return Err(e.into());
                        }
                        None => {
                            tracing::info!(
                                connection_id = %self.connection_id,
                                "Verbindung vom Client getrennt"
                            );
                            return Err(RelayError::VerbindungGetrennt);
                        }
                    }
                }

                // Ausgehende Nachricht aus dem Broadcaster
                Some(ausgehend) = sende_rx.recv() => {
                    framed.send(ausgehend).await?;
                }

                // Keepalive-Ping und Timeout-Pruefung
                _ = keepalive.tick() => {
                    if letzter_empfang.elapsed() > timeout_dauer {
                        return Err(RelayError::Timeout);
                    }
                    ping_request_id = ping_request_id.wrapping_add(1);
                    framed.send(ControlMessage::ping(ping_request_id, jetzt_ms())).await?;
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(
                            connection_id = %self.connection_id,
                            "Shutdown-Signal – Verbindung wird getrennt"
                        );
                        let abschied = ControlMessage::error(
                            0,
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}
