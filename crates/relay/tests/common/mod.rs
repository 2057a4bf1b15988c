//! Gemeinsame Hilfen fuer die Relay-Integrationstests
//!
//! Startet einen echten TCP-Relay auf `127.0.0.1:0` und stellt einen
//! rohen Framed-Client fuer Protokollfehler bereit.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use kryptochat_client::{ClientEvent, RelayClient};
use kryptochat_crypto::{KeyAuthority, MIN_RSA_BITS};
use kryptochat_observability::RelayMetrics;
use kryptochat_protocol::{ControlMessage, FrameCodec};
use kryptochat_relay::{RelayConfig, RelayServer, RelayState};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;

pub const WARTEZEIT: Duration = Duration::from_secs(5);
pub const KURZE_WARTEZEIT: Duration = Duration::from_millis(300);

fn authority() -> Arc<KeyAuthority> {
    static AUTHORITY: OnceLock<Arc<KeyAuthority>> = OnceLock::new();
    AUTHORITY
        .get_or_init(|| Arc::new(KeyAuthority::generieren(MIN_RSA_BITS).unwrap()))
        .clone()
}

/// Laufender Test-Relay
pub struct TestRelay {
    pub addr: SocketAddr,
    pub state: Arc<RelayState>,
    shutdown_tx: watch::Sender<bool>,
}

impl TestRelay {
    pub async fn starten() -> Self {
        Self::mit_config(RelayConfig::default()).await
    }

    pub async fn mit_config(config: RelayConfig) -> Self {
        let state = RelayState::neu(config, authority(), RelayMetrics::neu().unwrap());
        let server = RelayServer::binden(Arc::clone(&state), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = server.lokale_adresse().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(server.starten(shutdown_rx));
        Self {
            addr,
            state,
            shutdown_tx,
        }
    }

    pub async fn client(&self) -> RelayClient {
        RelayClient::verbinden(self.addr).await.unwrap()
    }

    pub fn herunterfahren(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wartet bis eine Bedingung auf dem Server-Zustand erfuellt ist
    pub async fn warten_bis(&self, mut bedingung: impl FnMut(&RelayState) -> bool) {
        tokio::time::timeout(WARTEZEIT, async {
            while !bedingung(&self.state) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("Bedingung nicht rechtzeitig erfuellt");
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Liest Ereignisse bis eines die Bedingung erfuellt
pub async fn ereignis_bis(
    client: &mut RelayClient,
    mut bedingung: impl FnMut(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(WARTEZEIT, async {
        loop {
            let ereignis = client.naechstes_ereignis().await.unwrap();
            if bedingung(&ereignis) {
                return ereignis;
            }
        }
    })
    .await
    .expect("Ereignis nicht rechtzeitig empfangen")
}

/// Prueft, dass in kurzer Zeit kein passendes Ereignis eintrifft
pub async fn kein_ereignis(client: &mut RelayClient, mut bedingung: impl FnMut(&ClientEvent) -> bool) {
    let ergebnis = tokio::time::timeout(KURZE_WARTEZEIT, async {
        loop {
            let ereignis = client.naechstes_ereignis().await.unwrap();
            if bedingung(&ereignis) {
                return ereignis;
            }
        }
    })
    .await;
    if let Ok(ereignis) = ergebnis {
        panic!("Unerwartetes Ereignis: {:?}", ereignis);
    }
}

/// Tritt bei und wartet bis der Raum-Schluessel bereit ist
pub async fn beitreten_mit_schluessel(client: &mut RelayClient, username: &str, raum: &str) {
    client.beitreten(username, raum).await.unwrap();
    ereignis_bis(client, |e| matches!(e, ClientEvent::SchluesselBereit { .. })).await;
}

// ---------------------------------------------------------------------------
// Roher Client
// ---------------------------------------------------------------------------

/// Framed-Verbindung ohne Client-Logik
pub struct RohVerbindung {
    framed: Framed<TcpStream, FrameCodec>,
}

impl RohVerbindung {
    pub async fn verbinden(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }

    pub async fn senden(&mut self, nachricht: ControlMessage) {
        self.framed.send(nachricht).await.unwrap();
    }

    /// Schreibt einen Frame mit beliebigem Inhalt
    pub async fn roh_senden(&mut self, inhalt: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(&(inhalt.len() as u32).to_be_bytes()).await.unwrap();
        stream.write_all(inhalt).await.unwrap();
        stream.flush().await.unwrap();
    }

    /// Naechste Nachricht, `None` wenn die Verbindung geschlossen wurde
    pub async fn empfangen(&mut self) -> Option<ControlMessage> {
        tokio::time::timeout(WARTEZEIT, self.framed.next())
            .await
            .expect("Keine Nachricht rechtzeitig empfangen")
            .and_then(Result::ok)
    }
}
