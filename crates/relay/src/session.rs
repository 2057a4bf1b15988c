//! Session-Manager – Zustand jeder Verbindung
//!
//! Haelt pro Verbindung Benutzername, aktuellen Raum und den Zustand der
//! State Machine.
//!
//! ## State Machine
//! ```text
//! Verbindend -> PublicKeyGesendet -> Beigetreten -> SchluesselBereit
//!                      ^                  ^               |
//!                      |                  +-- Raumwechsel-+
//!                      +------ leave_room ----------------+
//!
//! Jeder Zustand -> Beendet (Verbindung getrennt)
//! ```
//!
//! Chat-Nachrichten werden unabhaengig vom Zustand weitergeleitet; der
//! Zustand sequenziert nur die Schluesselzustellung.

use dashmap::DashMap;
use kryptochat_core::types::{ConnectionId, RoomName};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// SessionZustand
// ---------------------------------------------------------------------------

/// Zustand einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// TCP-Verbindung angenommen, Public Key noch nicht gesendet
    Verbindend,
    /// Public Key gesendet, in keinem Raum
    PublicKeyGesendet,
    /// In einem Raum, noch kein Raum-Schluessel zugestellt
    Beigetreten,
    /// Raum-Schluessel zugestellt
    SchluesselBereit,
    /// Verbindung getrennt
    Beendet,
}

impl SessionZustand {
    /// Prueft ob der Uebergang in `ziel` erlaubt ist
    pub fn kann_wechseln_zu(self, ziel: SessionZustand) -> bool {
        use SessionZustand::*;
        match (self, ziel) {
            (Beendet, _) => false,
            (_, Beendet) => true,
            (Verbindend, PublicKeyGesendet) => true,
            // Beitritt oder Raumwechsel
            (PublicKeyGesendet | Beigetreten | SchluesselBereit, Beigetreten) => true,
            (Beigetreten, SchluesselBereit) => true,
            // leave_room
            (Beigetreten | SchluesselBereit, PublicKeyGesendet) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionSession
// ---------------------------------------------------------------------------

/// Session-Info einer Verbindung
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub connection_id: ConnectionId,
    /// Selbst gewaehlter Anzeigename (darf kollidieren)
    pub username: Option<String>,
    pub aktueller_raum: Option<RoomName>,
    pub zustand: SessionZustand,
}

impl ConnectionSession {
    fn neu(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            username: None,
            aktueller_raum: None,
            zustand: SessionZustand::Verbindend,
        }
    }

    fn wechseln(&mut self, ziel: SessionZustand) -> bool {
        if !self.zustand.kann_wechseln_zu(ziel) {
            tracing::debug!(
                connection_id = %self.connection_id,
                von = ?self.zustand,
                nach = ?ziel,
                "Ungueltiger Zustandswechsel ignoriert"
            );
            return false;
        }
        self.zustand = ziel;
        true
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Verwaltet die Sessions aller verbundenen Clients
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct SessionManager {
    inner: Arc<DashMap<ConnectionId, ConnectionSession>>,
}

impl SessionManager {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt eine Session im Zustand `Verbindend` an
    pub fn registrieren(&self, connection_id: ConnectionId) {
        self.inner
            .insert(connection_id, ConnectionSession::neu(connection_id));
    }

    /// Public Key wurde gesendet
    pub fn public_key_gesendet(&self, connection_id: &ConnectionId) -> bool {
        self.inner
            .get_mut(connection_id)
            .map(|mut s| s.wechseln(SessionZustand::PublicKeyGesendet))
            .unwrap_or(false)
    }

    /// Prueft einen Beitritt ohne die Session zu aendern
    ///
    /// Gibt den bisherigen Raum zurueck, falls der Beitritt ein Raumwechsel
    /// ist. `Err` wenn der Beitritt im aktuellen Zustand nicht erlaubt ist.
    pub fn beitritt_pruefen(
        &self,
        connection_id: &ConnectionId,
        raum: &RoomName,
    ) -> Result<Option<RoomName>, SessionZustand> {
        let session = self
            .inner
            .get(connection_id)
            .ok_or(SessionZustand::Beendet)?;
        if session.aktueller_raum.as_ref() == Some(raum) {
            return Ok(None);
        }
        if !session.zustand.kann_wechseln_zu(SessionZustand::Beigetreten) {
            return Err(session.zustand);
        }
        Ok(session.aktueller_raum.clone())
    }

    /// Setzt Benutzername und Raum, Zustand wird `Beigetreten`
    ///
    /// Gibt den vorherigen Raum zurueck (bei Raumwechsel). `Err` wenn der
    /// Beitritt im aktuellen Zustand nicht erlaubt ist.
    pub fn beigetreten(
        &self,
        connection_id: &ConnectionId,
        username: &str,
        raum: RoomName,
    ) -> Result<Option<RoomName>, SessionZustand> {
        let mut session = self
            .inner
            .get_mut(connection_id)
            .ok_or(SessionZustand::Beendet)?;

        // Erneuter Beitritt in denselben Raum behaelt den Zustand
        if session.aktueller_raum.as_ref() == Some(&raum) {
            session.username = Some(username.to_string());
            return Ok(None);
        }

        if !session.wechseln(SessionZustand::Beigetreten) {
            return Err(session.zustand);
        }
        session.username = Some(username.to_string());
        Ok(session.aktueller_raum.replace(raum))
    }

    /// Markiert eine Verbindung als `SchluesselBereit` wenn sie in `raum` ist
    pub fn schluessel_bereit(&self, connection_id: &ConnectionId, raum: &RoomName) -> bool {
        match self.inner.get_mut(connection_id) {
            Some(mut s) if s.aktueller_raum.as_ref() == Some(raum) => {
                s.zustand == SessionZustand::SchluesselBereit
                    || s.wechseln(SessionZustand::SchluesselBereit)
            }
            _ => false,
        }
    }

    /// Verlaesst den aktuellen Raum, Zustand wird `PublicKeyGesendet`
    ///
    /// Gibt den verlassenen Raum zurueck.
    pub fn raum_verlassen(&self, connection_id: &ConnectionId) -> Option<RoomName> {
        let mut session = self.inner.get_mut(connection_id)?;
        let raum = session.aktueller_raum.take()?;
        session.wechseln(SessionZustand::PublicKeyGesendet);
        Some(raum)
    }

    /// Entfernt die Session (Verbindung getrennt)
    pub fn entfernen(&self, connection_id: &ConnectionId) -> Option<ConnectionSession> {
        self.inner.remove(connection_id).map(|(_, mut s)| {
            s.wechseln(SessionZustand::Beendet);
            s
        })
    }

    pub fn zustand(&self, connection_id: &ConnectionId) -> Option<SessionZustand> {
        self.inner.get(connection_id).map(|s| s.zustand)
    }

    pub fn username(&self, connection_id: &ConnectionId) -> Option<String> {
        self.inner.get(connection_id).and_then(|s| s.username.clone())
    }

    pub fn aktueller_raum(&self, connection_id: &ConnectionId) -> Option<RoomName> {
        self.inner
            .get(connection_id)
            .and_then(|s| s.aktueller_raum.clone())
    }

    pub fn anzahl(&self) -> usize {
        self.inner.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
