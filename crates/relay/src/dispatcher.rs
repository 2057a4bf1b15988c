//! Message-Dispatcher – Routet ControlMessages an die richtigen Handler
//!
//! Der Dispatcher ist synchron: kein Handler wartet auf IO, alle
//! ausgehenden Nachrichten laufen ueber die Send-Queues des
//! `EventBroadcaster`. Nur `ping` wird direkt beantwortet.
//!
//! Ungueltige oder unerlaubte Nachrichten werden ohne Antwort verworfen,
//! geloggt und in `dropped_messages_total` gezaehlt.

use kryptochat_core::types::ConnectionId;
use kryptochat_protocol::control::{jetzt_ms, ControlMessage, ControlPayload};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{DropReason, RelayError, RelayResult};
use crate::handlers::room_handler;
use crate::key_lifecycle;
use crate::relay;
use crate::server_state::RelayState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug, Clone, Copy)]
pub struct DispatcherContext {
    pub connection_id: ConnectionId,
    pub peer_addr: SocketAddr,
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<RelayState>,
}

impl MessageDispatcher {
    pub fn neu(state: Arc<RelayState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende ControlMessage
    ///
    /// Gibt nur fuer `ping` eine direkte Antwort zurueck.
    pub fn dispatch(
        &self,
        message: ControlMessage,
        ctx: &DispatcherContext,
    ) -> Option<ControlMessage> {
        let request_id = message.request_id;
        let conn = ctx.connection_id;

        let ergebnis: RelayResult<()> = match message.payload {
            // -------------------------------------------------------------------
            // Keepalive
            // -------------------------------------------------------------------
            ControlPayload::Ping(ping) => {
                return Some(ControlMessage::pong(request_id, ping.timestamp_ms, jetzt_ms()));
            }

            ControlPayload::Pong(pong) => {
                tracing::trace!(
                    connection_id = %conn,
                    rtt_ms = jetzt_ms().saturating_sub(pong.echo_timestamp_ms),
                    "Pong empfangen"
                );
                return None;
            }

            // -------------------------------------------------------------------
            // Raeume
            // -------------------------------------------------------------------
            ControlPayload::Join(req) => room_handler::handle_join(&self.state, conn, req),
            ControlPayload::CreateRoom(req) => {
                room_handler::handle_create_room(&self.state, conn, req)
            }
            ControlPayload::LeaveRoom => room_handler::handle_leave(&self.state, conn),

            // -------------------------------------------------------------------
            // Schluessel und Nachrichten
            // -------------------------------------------------------------------
            ControlPayload::KeySubmission(einreichung) => {
                key_lifecycle::schluessel_einreichen(&self.state, conn, einreichung).map(|_| ())
            }
            ControlPayload::ChatMessage(envelope) => {
                relay::weiterleiten(&self.state, conn, envelope).map(|_| ())
            }

            // -------------------------------------------------------------------
            // Server->Client Nachrichten und unbekannte Typen
            // -------------------------------------------------------------------
            ControlPayload::PublicKey(_)
            | ControlPayload::KeyDistribution(_)
            | ControlPayload::RoomJoined(_)
            | ControlPayload::RoomList(_)
            | ControlPayload::UserJoined(_)
            | ControlPayload::UserLeft(_)
            | ControlPayload::Error(_)
            | ControlPayload::Unknown => Err(DropReason::UnerwarteteNachricht.into()),
        };

        if let Err(fehler) = ergebnis {
            self.fehler_verbuchen(ctx, request_id, fehler);
        }
        None
    }

    fn fehler_verbuchen(&self, ctx: &DispatcherContext, request_id: u32, fehler: RelayError) {
        match fehler {
            RelayError::Verwerfen(grund) => {
                self.state.metriken.verworfen_zaehlen(grund.als_label());
                tracing::debug!(
                    connection_id = %ctx.connection_id,
                    peer = %ctx.peer_addr,
                    request_id,
                    grund = %grund,
                    "Nachricht verworfen"
                );
            }
            andere => {
                tracing::warn!(
                    connection_id = %ctx.connection_id,
                    peer = %ctx.peer_addr,
                    request_id,
                    fehler = %andere,
                    "Nachricht konnte nicht verarbeitet werden"
                );
            }
        }
    }

    /// Bereinigt alle Ressourcen einer Verbindung beim Trennen
    ///
    /// Verlaesst den aktuellen Raum (mit `user_left` an die Verbliebenen),
    /// entfernt Session und Send-Queue.
    pub fn verbindung_beenden(&self, connection_id: &ConnectionId) {
        if let Some(session) = self.state.sessions.entfernen(connection_id) {
            if let Some(raum) = session.aktueller_raum.as_ref() {
                let username = session.username.as_deref().unwrap_or_default();
                room_handler::austritt_verarbeiten(&self.state, *connection_id, raum, username);
            }
        }
        self.state.broadcaster.client_entfernen(connection_id);

        tracing::debug!(connection_id = %connection_id, "Verbindungs-Ressourcen bereinigt");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::RelayConfig;
    use crate::test_hilfe::{alle_empfangen, beigetretene_verbindung, test_state};
    use kryptochat_core::types::RoomName;
    use kryptochat_protocol::control::{ChatEnvelope, PingMessage, UserPresence};

    fn kontext(connection_id: ConnectionId) -> DispatcherContext {
        DispatcherContext {
            connection_id,
            peer_addr: "127.0.0.1:50000".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn ping_wird_direkt_beantwortet() {
        let state = test_state(RelayConfig::default());
        let (x, _rx) = beigetretene_verbindung(&state, "x", "Lobby");
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));

        let antwort = dispatcher
            .dispatch(
                ControlMessage::new(7, ControlPayload::Ping(PingMessage { timestamp_ms: 1234 })),
                &kontext(x),
            )
            .unwrap();
        assert_eq!(antwort.request_id, 7);
        match antwort.payload {
            ControlPayload::Pong(p) => assert_eq!(p.echo_timestamp_ms, 1234),
            andere => panic!("Erwartet Pong, erhalten {:?}", andere),
        }
    }

    #[tokio::test]
    async fn server_nachrichten_vom_client_werden_verworfen() {
        let state = test_state(RelayConfig::default());
        let (x, _rx_x) = beigetretene_verbindung(&state, "x", "Lobby");
        let (_y, mut rx_y) = beigetretene_verbindung(&state, "y", "Lobby");
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));

        let gefaelscht = ControlMessage::push(ControlPayload::UserJoined(UserPresence {
            room: RoomName::from("Lobby"),
            username: "mallory".into(),
        }));
        assert!(dispatcher.dispatch(gefaelscht, &kontext(x)).is_none());
        assert!(dispatcher
            .dispatch(ControlMessage::push(ControlPayload::Unknown), &kontext(x))
            .is_none());

        assert!(alle_empfangen(&mut rx_y).is_empty());
        assert_eq!(
            state
                .metriken
                .dropped_messages_total
                .with_label_values(&["unexpected_message"])
                .get(),
            2
        );
    }

    #[tokio::test]
    async fn envelope_wird_weitergeleitet() {
        let state = test_state(RelayConfig::default());
        let (x, _rx_x) = beigetretene_verbindung(&state, "x", "Lobby");
        let (_y, mut rx_y) = beigetretene_verbindung(&state, "y", "Lobby");
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));

        let envelope = ChatEnvelope {
            room: RoomName::from("Lobby"),
            ciphertext: "AAAA".into(),
            iv: "BBBB".into(),
            ..Default::default()
        };
        let antwort =
            dispatcher.dispatch(ControlMessage::push(ControlPayload::ChatMessage(envelope)), &kontext(x));
        assert!(antwort.is_none());
        assert_eq!(alle_empfangen(&mut rx_y).len(), 1);
    }

    #[tokio::test]
    async fn verbindung_beenden_raeumt_auf() {
        let state = test_state(RelayConfig::default());
        let (x, _rx_x) = beigetretene_verbindung(&state, "x", "Lobby");
        let (y, mut rx_y) = beigetretene_verbindung(&state, "y", "Lobby");
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));

        dispatcher.verbindung_beenden(&x);

        let bei_y = alle_empfangen(&mut rx_y);
        assert!(matches!(
            &bei_y[0].payload,
            ControlPayload::UserLeft(p) if p.username == "x"
        ));
        assert_eq!(state.registry.mitglieder(&RoomName::from("Lobby")), vec![y]);
        assert!(!state.broadcaster.ist_registriert(&x));
        assert!(state.sessions.zustand(&x).is_none());

        dispatcher.verbindung_beenden(&y);
        assert_eq!(state.registry.anzahl(), 0);
        assert_eq!(state.metriken.rooms_active.get(), 0);
    }
}
