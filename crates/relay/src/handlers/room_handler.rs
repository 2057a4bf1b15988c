//! Raum-Handler – Join, Create, Leave
//!
//! Beitritt (`join`) an den Beitretenden, in dieser Reihenfolge:
//! 1. `room_list` (an alle, wenn der Raum dabei neu angelegt wurde)
//! 2. `room_joined` mit Mitgliedern und `key_present`
//! 3. `key_distribution`, falls der Raum schon einen Schluessel hat
//!
//! Die uebrigen Mitglieder bekommen `user_joined`. Ein Beitritt in einen
//! anderen Raum verlaesst vorher den alten Raum (`user_left` dort).

use kryptochat_core::types::{ConnectionId, RoomName};
use kryptochat_protocol::control::{
    ControlMessage, ControlPayload, CreateRoomRequest, JoinRoomRequest, RoomJoinedResponse,
    RoomListResponse, UserPresence,
};

use crate::error::{DropReason, RelayResult};
use crate::key_lifecycle;
use crate::server_state::RelayState;
use crate::session::SessionZustand;

/// Aktuelle Raumliste als `room_list`-Nachricht
pub fn raumliste_nachricht(state: &RelayState) -> ControlMessage {
    ControlMessage::push(ControlPayload::RoomList(RoomListResponse {
        rooms: state.registry.raeume_auflisten(),
    }))
}

fn praesenz_nachricht(raum: &RoomName, username: &str, beigetreten: bool) -> ControlMessage {
    let praesenz = UserPresence {
        room: raum.clone(),
        username: username.to_string(),
    };
    ControlMessage::push(if beigetreten {
        ControlPayload::UserJoined(praesenz)
    } else {
        ControlPayload::UserLeft(praesenz)
    })
}

/// Verarbeitet einen Beitritt (auch Raumwechsel)
pub fn handle_join(
    state: &RelayState,
    connection_id: ConnectionId,
    request: JoinRoomRequest,
) -> RelayResult<()> {
    let raum = request.room;
    if !raum.ist_gueltig() {
        return Err(DropReason::UngueltigerRaumname.into());
    }
    let username = request.username;

    let bisheriger_name = state.sessions.username(&connection_id);
    let war_schon_im_raum = state.sessions.aktueller_raum(&connection_id).as_ref() == Some(&raum);

    let nicht_erlaubt = |zustand: SessionZustand| {
        tracing::debug!(
            connection_id = %connection_id,
            zustand = ?zustand,
            "Beitritt im aktuellen Zustand nicht erlaubt"
        );
        DropReason::FalscherZustand
    };
    let alter_raum = state
        .sessions
        .beitritt_pruefen(&connection_id, &raum)
        .map_err(nicht_erlaubt)?;

    // Raumwechsel: erst aus dem alten Raum austragen, dann die Session
    // umstellen. Solange die Verbindung im alten Raum Mitglied ist, zeigt
    // ihre Session auch noch auf ihn.
    if let Some(alter_raum) = alter_raum {
        let alter_name = bisheriger_name.as_deref().unwrap_or(&username);
        austritt_verarbeiten(state, connection_id, &alter_raum, alter_name);
    }
    state
        .sessions
        .beigetreten(&connection_id, &username, raum.clone())
        .map_err(nicht_erlaubt)?;

    let identitaet = state.registry.beitreten(&raum, connection_id);
    if identitaet.neu_erstellt {
        state.raum_gauge_aktualisieren();
        state.broadcaster.an_alle_senden(&raumliste_nachricht(state));
    } else {
        state
            .broadcaster
            .an_verbindung_senden(&connection_id, raumliste_nachricht(state));
    }

    // Bestaetigung und vorhandenen Schluessel unter der Raum-Sperre senden,
    // damit eine parallele Einreichung nicht dazwischen faellt
    let (andere, schluessel_zugestellt) = state
        .registry
        .mit_raum(&raum, |r| {
            let mitglieder: Vec<String> = r
                .mitglieder()
                .iter()
                .filter_map(|id| state.sessions.username(id))
                .collect();
            let bestaetigung = ControlMessage::push(ControlPayload::RoomJoined(RoomJoinedResponse {
                room: raum.clone(),
                members: mitglieder,
                key_present: r.schluessel().is_some(),
            }));
            state.broadcaster.an_verbindung_senden(&connection_id, bestaetigung);

            let zugestellt = key_lifecycle::beim_beitritt_zustellen(state, &connection_id, r);
            let andere: Vec<ConnectionId> = r
                .mitglieder()
                .iter()
                .copied()
                .filter(|id| *id != connection_id)
                .collect();
            (andere, zugestellt)
        })
        .unwrap_or_default();

    if !war_schon_im_raum {
        state
            .broadcaster
            .an_verbindungen_senden(&andere, &praesenz_nachricht(&raum, &username, true));
    }

    tracing::info!(
        connection_id = %connection_id,
        username = %username,
        room = %raum,
        neuer_raum = identitaet.neu_erstellt,
        schluessel_zugestellt,
        "Raum beigetreten"
    );
    Ok(())
}

/// Legt einen Raum an (idempotent)
///
/// Nur ein neu angelegter Raum loest eine Raumliste an alle aus. Der
/// Anfragende bekommt die Liste in jedem Fall.
pub fn handle_create_room(
    state: &RelayState,
    connection_id: ConnectionId,
    request: CreateRoomRequest,
) -> RelayResult<()> {
    let raum = request.room;
    if !raum.ist_gueltig() {
        return Err(DropReason::UngueltigerRaumname.into());
    }

    let identitaet = state.registry.raum_sicherstellen(&raum, connection_id);
    if identitaet.neu_erstellt {
        state.raum_gauge_aktualisieren();
        state.broadcaster.an_alle_senden(&raumliste_nachricht(state));
        tracing::info!(connection_id = %connection_id, room = %raum, "Raum angelegt");
    } else {
        state
            .broadcaster
            .an_verbindung_senden(&connection_id, raumliste_nachricht(state));
    }
    Ok(())
}

/// Verlaesst den aktuellen Raum, die Verbindung bleibt bestehen
pub fn handle_leave(state: &RelayState, connection_id: ConnectionId) -> RelayResult<()> {
    let username = state.sessions.username(&connection_id).unwrap_or_default();
    let raum = state
        .sessions
        .raum_verlassen(&connection_id)
        .ok_or(DropReason::FalscherZustand)?;

    austritt_verarbeiten(state, connection_id, &raum, &username);
    Ok(())
}

/// Entfernt eine Verbindung aus einem Raum und benachrichtigt die
/// verbleibenden Mitglieder
///
/// Wird auch beim Raumwechsel und beim Verbindungsende verwendet.
pub fn austritt_verarbeiten(
    state: &RelayState,
    connection_id: ConnectionId,
    raum: &RoomName,
    username: &str,
) {
    let Some(austritt) = state.registry.verlassen(raum, &connection_id) else {
        return;
    };

    if austritt.raum_geloescht {
        state.raum_gauge_aktualisieren();
    } else {
        state.broadcaster.an_verbindungen_senden(
            &austritt.verbleibende,
            &praesenz_nachricht(raum, username, false),
        );
    }

    tracing::info!(
        connection_id = %connection_id,
        username = %username,
        room = %raum,
        raum_geloescht = austritt.raum_geloescht,
        "Raum verlassen"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
