//! Message-Relay – Fan-out verschluesselter Envelopes
//!
//! Der Server sieht nur Ciphertext und IV. Er setzt Absender und
//! Zeitstempel und stellt das Envelope allen Mitgliedern des Raums zu, die
//! zum Zeitpunkt des Weiterleitens im Raum sind. Der Absender selbst wird
//! ausgelassen, ausser `echo_an_absender` ist gesetzt.
//!
//! Zustellung ist fire-and-forget: keine Bestaetigung, keine Wiederholung.

use chrono::Utc;
use kryptochat_core::types::ConnectionId;
use kryptochat_protocol::control::{ChatEnvelope, ControlMessage, ControlPayload};

use crate::error::{DropReason, RelayResult};
use crate::server_state::RelayState;

/// Leitet ein Envelope an den Raum weiter
///
/// Gibt die Anzahl der Empfaenger zurueck.
pub fn weiterleiten(
    state: &RelayState,
    absender: ConnectionId,
    envelope: ChatEnvelope,
) -> RelayResult<usize> {
    if !envelope.ist_vollstaendig() {
        return Err(DropReason::UngueltigesEnvelope.into());
    }

    let username = state
        .sessions
        .username(&absender)
        .ok_or(DropReason::KeinMitglied)?;
    let echo = state.config.echo_an_absender;
    let raum_name = envelope.room.clone();

    let gestempelt = ControlMessage::push(ControlPayload::ChatMessage(ChatEnvelope {
        sender: Some(username),
        timestamp: Some(Utc::now()),
        ..envelope
    }));

    // Fan-out unter der Raum-Sperre: Mitgliedschaft und Schluesselwechsel
    // koennen sich waehrenddessen nicht aendern
    let zugestellt = state
        .registry
        .mit_raum(&raum_name, |raum| {
            if !raum.ist_mitglied(&absender) {
                return Err(DropReason::KeinMitglied);
            }
            let empfaenger = raum
                .mitglieder()
                .iter()
                .filter(|id| echo || **id != absender);
            Ok(state.broadcaster.an_verbindungen_senden(empfaenger, &gestempelt))
        })
        .ok_or(DropReason::UnbekannterRaum)??;

    state
        .metriken
        .envelopes_relayed_total
        .inc_by(zugestellt as u64);

    tracing::trace!(
        connection_id = %absender,
        room = %raum_name,
        empfaenger = zugestellt,
        "Envelope weitergeleitet"
    );
    Ok(zugestellt)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
