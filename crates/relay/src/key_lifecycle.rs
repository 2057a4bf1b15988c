//! Raum-Schluessel-Lebenszyklus
//!
//! Ablauf einer Einreichung (`key_submission`) fuer Raum R von Verbindung C:
//! 1. Vorpruefung: R existiert, C ist Mitglied, Richtlinie erlaubt den Wechsel
//! 2. Entpacken mit dem privaten RSA-Schluessel (ohne Raum-Sperre)
//! 3. Unter der Schreib-Sperre von R: erneut pruefen, Schluessel setzen und an
//!    alle aktuellen Mitglieder verteilen
//!
//! Schlaegt ein Schritt fehl, wird die Einreichung verworfen; der Raum
//! behaelt seinen bisherigen Schluessel. Neue Mitglieder bekommen den
//! vorhandenen Schluessel beim Beitritt zugestellt, ohne dass er neu
//! gesetzt wird.

use kryptochat_core::types::{ConnectionId, RoomName};
use kryptochat_crypto::SecretBytes;
use kryptochat_protocol::control::{ControlMessage, ControlPayload, KeyDistribution, KeySubmission};

use crate::error::{DropReason, RelayResult};
use crate::registry::Room;
use crate::server_state::{RelayState, SchluesselRichtlinie};

/// Baut die `key_distribution`-Nachricht fuer einen Raum
pub fn verteilungs_nachricht(raum: &RoomName, schluessel: &SecretBytes, epoch: u64) -> ControlMessage {
    ControlMessage::push(ControlPayload::KeyDistribution(KeyDistribution {
        room: raum.clone(),
        key: schluessel.to_base64(),
        epoch,
    }))
}

/// Prueft Mitgliedschaft und Richtlinie fuer eine Einreichung
fn einreichung_pruefen(
    raum: &Room,
    connection_id: &ConnectionId,
    richtlinie: SchluesselRichtlinie,
) -> Result<(), DropReason> {
    if !raum.ist_mitglied(connection_id) {
        return Err(DropReason::KeinMitglied);
    }
    match richtlinie {
        SchluesselRichtlinie::JederTeilnehmer => Ok(()),
        SchluesselRichtlinie::NurErsteller => {
            if raum.schluessel().is_none() || raum.ersteller() == *connection_id {
                Ok(())
            } else {
                Err(DropReason::RichtlinieVerweigert)
            }
        }
    }
}

/// Verarbeitet eine Schluessel-Einreichung
///
/// Gibt die Anzahl der Mitglieder zurueck, denen der neue Schluessel
/// zugestellt wurde.
pub fn schluessel_einreichen(
    state: &RelayState,
    connection_id: ConnectionId,
    einreichung: KeySubmission,
) -> RelayResult<usize> {
    let ergebnis = einreichen_intern(state, connection_id, einreichung);
    state.metriken.einreichung_zaehlen(ergebnis.is_ok());
    ergebnis
}

fn einreichen_intern(
    state: &RelayState,
    connection_id: ConnectionId,
    einreichung: KeySubmission,
) -> RelayResult<usize> {
    let raum_name = einreichung.room;
    let richtlinie = state.config.schluessel_richtlinie;

    // Vorpruefung, damit Nicht-Mitglieder keine RSA-Operation ausloesen
    state
        .registry
        .mit_raum(&raum_name, |raum| einreichung_pruefen(raum, &connection_id, richtlinie))
        .ok_or(DropReason::UnbekannterRaum)??;

    let schluessel = state
        .authority
        .entpacken_base64(&einreichung.wrapped_key)
        .map_err(|e| {
            tracing::warn!(
                connection_id = %connection_id,
                room = %raum_name,
                fehler = %e,
                "Raum-Schluessel konnte nicht entpackt werden"
            );
            DropReason::EntpackenFehlgeschlagen
        })?;
    let schluessel_laenge = schluessel.len();

    let (epoch, zugestellt) = state
        .registry
        .mit_raum_mut(&raum_name, |raum| {
            einreichung_pruefen(raum, &connection_id, richtlinie)?;

            let nachricht = verteilungs_nachricht(&raum_name, &schluessel, raum.epoch() + 1);
            let epoch = raum.schluessel_setzen(schluessel);

            let zugestellt = state
                .broadcaster
                .an_verbindungen_senden(raum.mitglieder(), &nachricht);
            for mitglied in raum.mitglieder() {
                state.sessions.schluessel_bereit(mitglied, &raum_name);
            }
            Ok::<_, DropReason>((epoch, zugestellt))
        })
        .ok_or(DropReason::UnbekannterRaum)??;

    state
        .metriken
        .key_distributions_total
        .inc_by(zugestellt as u64);

    tracing::info!(
        connection_id = %connection_id,
        room = %raum_name,
        epoch,
        schluessel_bytes = schluessel_laenge,
        empfaenger = zugestellt,
        "Raum-Schluessel gesetzt und verteilt"
    );
    Ok(zugestellt)
}

/// Stellt einem neuen Mitglied den vorhandenen Raum-Schluessel zu
///
/// Muss unter der Sperre des Raums aufgerufen werden. Setzt den Schluessel
/// nie neu. Gibt `false` zurueck wenn der Raum noch keinen Schluessel hat.
pub fn beim_beitritt_zustellen(state: &RelayState, connection_id: &ConnectionId, raum: &Room) -> bool {
    let Some(schluessel) = raum.schluessel() else {
        return false;
    };

    let nachricht = verteilungs_nachricht(raum.name(), schluessel, raum.epoch());
    if state.broadcaster.an_verbindung_senden(connection_id, nachricht) {
        state.metriken.key_distributions_total.inc();
        state.sessions.schluessel_bereit(connection_id, raum.name());
        tracing::debug!(
            connection_id = %connection_id,
            room = %raum.name(),
            epoch = raum.epoch(),
            "Vorhandenen Raum-Schluessel an neues Mitglied zugestellt"
        );
        true
    } else {
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
