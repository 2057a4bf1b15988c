//! Raum-Registry – Raeume, Mitgliedschaft und aktueller Raum-Schluessel
//!
//! Jeder Raum liegt in einem eigenen DashMap-Eintrag. Alle Aenderungen an
//! einem Raum (Mitglied hinzufuegen/entfernen, Schluessel setzen) laufen
//! unter der Sperre dieses Eintrags und sind damit pro Raum atomar.
//!
//! ## Sperr-Reihenfolge
//! Closures, die unter einer Raum-Sperre laufen, duerfen auf den
//! `EventBroadcaster` und den `SessionManager` zugreifen, aber nie erneut
//! auf die Registry.
//!
//! ## Lebenszyklus
//! - Ein Raum entsteht beim ersten Beitritt oder durch `create_room`
//! - Verlaesst das letzte Mitglied den Raum, wird er samt Schluessel geloescht
//! - Ein spaeterer Beitritt beginnt daher immer ohne Schluessel

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use kryptochat_core::types::{ConnectionId, RoomName};
use kryptochat_crypto::SecretBytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Zustand eines einzelnen Raums
#[derive(Debug)]
pub struct Room {
    name: RoomName,
    /// Erstellungs-Sequenz (bestimmt die Reihenfolge der Raumliste)
    seq: u64,
    /// Verbindung, die den Raum angelegt hat
    ersteller: ConnectionId,
    /// Mitglieder in Beitrittsreihenfolge (ohne Duplikate)
    mitglieder: Vec<ConnectionId>,
    schluessel: Option<SecretBytes>,
    /// Anzahl bisheriger Schluesselwechsel
    epoch: u64,
}

impl Room {
    fn neu(name: RoomName, seq: u64, ersteller: ConnectionId) -> Self {
        Self {
            name,
            seq,
            ersteller,
            mitglieder: Vec::new(),
            schluessel: None,
            epoch: 0,
        }
    }

    pub fn name(&self) -> &RoomName {
        &self.name
    }

    pub fn ersteller(&self) -> ConnectionId {
        self.ersteller
    }

    pub fn mitglieder(&self) -> &[ConnectionId] {
        &self.mitglieder
    }

    pub fn ist_mitglied(&self, connection_id: &ConnectionId) -> bool {
        self.mitglieder.contains(connection_id)
    }

    /// Aktueller Raum-Schluessel (None bis zum ersten Schluesselaustausch)
    pub fn schluessel(&self) -> Option<&SecretBytes> {
        self.schluessel.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Ersetzt den Schluessel bedingungslos und gibt die neue Epoch zurueck
    pub fn schluessel_setzen(&mut self, schluessel: SecretBytes) -> u64 {
        self.schluessel = Some(schluessel);
        self.epoch += 1;
        self.epoch
    }

    /// Gibt `false` zurueck wenn die Verbindung bereits Mitglied war
    fn mitglied_hinzufuegen(&mut self, connection_id: ConnectionId) -> bool {
        if self.ist_mitglied(&connection_id) {
            return false;
        }
        self.mitglieder.push(connection_id);
        true
    }

    fn mitglied_entfernen(&mut self, connection_id: &ConnectionId) -> bool {
        let vorher = self.mitglieder.len();
        self.mitglieder.retain(|m| m != connection_id);
        self.mitglieder.len() != vorher
    }
}

// ---------------------------------------------------------------------------
// Rueckgabetypen
// ---------------------------------------------------------------------------

/// Identitaet eines Raums nach `raum_sicherstellen` / `beitreten`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaumIdentitaet {
    /// Erstellungs-Sequenz, bleibt fuer die Lebensdauer des Raums gleich
    pub seq: u64,
    /// Ob der Raum durch diesen Aufruf angelegt wurde
    pub neu_erstellt: bool,
}

/// Ergebnis von `verlassen`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Austritt {
    /// Verbleibende Mitglieder (zum Benachrichtigen)
    pub verbleibende: Vec<ConnectionId>,
    /// Ob der Raum dadurch geloescht wurde
    pub raum_geloescht: bool,
}

// ---------------------------------------------------------------------------
// RoomRegistry
// ---------------------------------------------------------------------------

/// Injizierbarer Raum-Zustand des Relays
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RoomRegistryInner>,
}

#[derive(Default)]
struct RoomRegistryInner {
    raeume: DashMap<RoomName, Room>,
    naechste_seq: AtomicU64,
}

impl RoomRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt einen Raum an falls er nicht existiert (idempotent)
    pub fn raum_sicherstellen(&self, name: &RoomName, ersteller: ConnectionId) -> RaumIdentitaet {
        match self.inner.raeume.entry(name.clone()) {
            Entry::Occupied(e) => RaumIdentitaet {
                seq: e.get().seq,
                neu_erstellt: false,
            },
            Entry::Vacant(e) => {
                let seq = self.inner.naechste_seq.fetch_add(1, Ordering::Relaxed);
                e.insert(Room::neu(name.clone(), seq, ersteller));
                tracing::debug!(room = %name, "Raum angelegt");
                RaumIdentitaet {
                    seq,
                    neu_erstellt: true,
                }
            }
        }
    }

    /// Fuegt eine Verbindung einem Raum hinzu und legt ihn bei Bedarf an
    pub fn beitreten(&self, name: &RoomName, connection_id: ConnectionId) -> RaumIdentitaet {
        let mut neu_erstellt = false;
        let mut raum = self.inner.raeume.entry(name.clone()).or_insert_with(|| {
            neu_erstellt = true;
            let seq = self.inner.naechste_seq.fetch_add(1, Ordering::Relaxed);
            Room::neu(name.clone(), seq, connection_id)
        });
        raum.mitglied_hinzufuegen(connection_id);

        if neu_erstellt {
            tracing::debug!(room = %name, "Raum beim Beitritt angelegt");
        }
        RaumIdentitaet {
            seq: raum.seq,
            neu_erstellt,
        }
    }

    /// Entfernt eine Verbindung aus einem Raum
    ///
    /// Wird der Raum leer, wird er im selben Schritt geloescht. Gibt `None`
    /// zurueck wenn der Raum nicht existiert oder die Verbindung kein
    /// Mitglied war.
    pub fn verlassen(&self, name: &RoomName, connection_id: &ConnectionId) -> Option<Austritt> {
        match self.inner.raeume.entry(name.clone()) {
            Entry::Occupied(mut e) => {
                if !e.get_mut().mitglied_entfernen(connection_id) {
                    return None;
                }
                if e.get().mitglieder.is_empty() {
                    e.remove();
                    tracing::debug!(room = %name, "Leerer Raum geloescht");
                    Some(Austritt {
                        verbleibende: Vec::new(),
                        raum_geloescht: true,
                    })
                } else {
                    Some(Austritt {
                        verbleibende: e.get().mitglieder.clone(),
                        raum_geloescht: false,
                    })
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Alle Raumnamen in Erstellungsreihenfolge
    pub fn raeume_auflisten(&self) -> Vec<RoomName> {
        let mut raeume: Vec<(u64, RoomName)> = self
            .inner
            .raeume
            .iter()
            .map(|e| (e.seq, e.name.clone()))
            .collect();
        raeume.sort_unstable_by_key(|(seq, _)| *seq);
        raeume.into_iter().map(|(_, name)| name).collect()
    }

    /// Fuehrt `f` unter der Lese-Sperre des Raums aus
    pub fn mit_raum<R>(&self, name: &RoomName, f: impl FnOnce(&Room) -> R) -> Option<R> {
        self.inner.raeume.get(name).map(|raum| f(&raum))
    }

    /// Fuehrt `f` unter der Schreib-Sperre des Raums aus
    pub fn mit_raum_mut<R>(&self, name: &RoomName, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        self.inner.raeume.get_mut(name).map(|mut raum| f(&mut raum))
    }

    /// Mitglieder eines Raums (leer wenn der Raum nicht existiert)
    pub fn mitglieder(&self, name: &RoomName) -> Vec<ConnectionId> {
        self.mit_raum(name, |r| r.mitglieder.clone())
            .unwrap_or_default()
    }

    pub fn existiert(&self, name: &RoomName) -> bool {
        self.inner.raeume.contains_key(name)
    }

    pub fn anzahl(&self) -> usize {
        self.inner.raeume.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> RoomName {
        RoomName::from("Lobby")
    }

    #[test]
    fn raum_sicherstellen_ist_idempotent() {
        let registry = RoomRegistry::neu();
        let x = ConnectionId::new();

        let erst = registry.raum_sicherstellen(&lobby(), x);
        let zweit = registry.raum_sicherstellen(&lobby(), ConnectionId::new());

        assert!(erst.neu_erstellt);
        assert!(!zweit.neu_erstellt);
        assert_eq!(erst.seq, zweit.seq);
        assert_eq!(registry.anzahl(), 1);
        assert_eq!(registry.mit_raum(&lobby(), |r| r.ersteller()), Some(x));
    }

    #[test]
    fn raumliste_in_erstellungsreihenfolge() {
        let registry = RoomRegistry::neu();
        let c = ConnectionId::new();
        for name in ["Zeta", "Alpha", "Mitte", "alpha"] {
            registry.raum_sicherstellen(&RoomName::from(name), c);
        }
        let namen: Vec<String> = registry
            .raeume_auflisten()
            .into_iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(namen, vec!["Zeta", "Alpha", "Mitte", "alpha"]);
    }

    #[test]
    fn doppelter_beitritt_ohne_duplikat() {
        let registry = RoomRegistry::neu();
        let x = ConnectionId::new();
        registry.beitreten(&lobby(), x);
        registry.beitreten(&lobby(), x);
        assert_eq!(registry.mitglieder(&lobby()), vec![x]);
    }

    #[test]
    fn letzter_austritt_loescht_raum_und_schluessel() {
        let registry = RoomRegistry::neu();
        let x = ConnectionId::new();
        let y = ConnectionId::new();

        registry.beitreten(&lobby(), x);
        registry.beitreten(&lobby(), y);
        registry.mit_raum_mut(&lobby(), |r| r.schluessel_setzen(SecretBytes::new(vec![1; 32])));

        let austritt = registry.verlassen(&lobby(), &x).unwrap();
        assert!(!austritt.raum_geloescht);
        assert_eq!(austritt.verbleibende, vec![y]);

        let austritt = registry.verlassen(&lobby(), &y).unwrap();
        assert!(austritt.raum_geloescht);
        assert!(!registry.existiert(&lobby()));
        assert!(registry.raeume_auflisten().is_empty());

        // Neuer Beitritt beginnt ohne Schluessel
        let identitaet = registry.beitreten(&lobby(), x);
        assert!(identitaet.neu_erstellt);
        assert_eq!(registry.mit_raum(&lobby(), |r| r.schluessel().is_none()), Some(true));
        assert_eq!(registry.mit_raum(&lobby(), |r| r.epoch()), Some(0));
    }

    #[test]
    fn verlassen_ohne_mitgliedschaft() {
        let registry = RoomRegistry::neu();
        let x = ConnectionId::new();
        assert!(registry.verlassen(&lobby(), &x).is_none());

        registry.beitreten(&lobby(), ConnectionId::new());
        assert!(registry.verlassen(&lobby(), &x).is_none());
        assert!(registry.existiert(&lobby()));
    }

    #[test]
    fn explizit_angelegter_raum_bleibt_ohne_mitglieder() {
        let registry = RoomRegistry::neu();
        registry.raum_sicherstellen(&lobby(), ConnectionId::new());
        assert!(registry.existiert(&lobby()));
        assert!(registry.mitglieder(&lobby()).is_empty());
    }

    #[test]
    fn schluessel_setzen_letzter_gewinnt() {
        let registry = RoomRegistry::neu();
        registry.beitreten(&lobby(), ConnectionId::new());

        let e1 = registry
            .mit_raum_mut(&lobby(), |r| r.schluessel_setzen(SecretBytes::new(vec![1; 32])))
            .unwrap();
        let e2 = registry
            .mit_raum_mut(&lobby(), |r| r.schluessel_setzen(SecretBytes::new(vec![2; 32])))
            .unwrap();
        assert_eq!((e1, e2), (1, 2));

        let aktuell = registry
            .mit_raum(&lobby(), |r| r.schluessel().cloned())
            .flatten()
            .unwrap();
        assert_eq!(aktuell.as_bytes(), &[2u8; 32]);
    }

    #[test]
    fn gleichzeitige_beitritte_und_austritte() {
        let registry = RoomRegistry::neu();
        let ids: Vec<ConnectionId> = (0..32).map(|_| ConnectionId::new()).collect();

        std::thread::scope(|s| {
            for id in &ids {
                let registry = registry.clone();
                s.spawn(move || {
                    registry.beitreten(&RoomName::from("Lobby"), *id);
                });
            }
        });
        assert_eq!(registry.mitglieder(&lobby()).len(), 32);

        std::thread::scope(|s| {
            for id in &ids {
                let registry = registry.clone();
                s.spawn(move || {
                    registry.verlassen(&RoomName::from("Lobby"), id);
                });
            }
        });
        assert!(!registry.existiert(&lobby()));
    }
}
