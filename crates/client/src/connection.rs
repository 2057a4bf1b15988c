//! Client-seitige TCP-Verbindung zum Kryptochat-Relay
//!
//! Nutzt den FrameCodec aus kryptochat-protocol fuer das Wire-Format
//! (u32 BE length + JSON payload). Der Stream ist generisch, damit Tests
//! den Client ueber `tokio::io::duplex` betreiben koennen.

use futures_util::{SinkExt, StreamExt};
use kryptochat_core::types::RoomName;
use kryptochat_crypto::{
    decrypt_message, encrypt_message, generate_room_key, wrap_room_key_base64, EncryptedMessage,
    SecretBytes,
};
use kryptochat_protocol::{
    control::{
        jetzt_ms, ChatEnvelope, ControlMessage, ControlPayload, CreateRoomRequest,
        ErrorResponse, JoinRoomRequest, KeySubmission,
    },
    wire::FrameCodec,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::error::{ClientError, ClientResult};
use crate::event::{ChatInhalt, ClientEvent};

/// Verbindung zum Relay mit lokalem Schluessel-Zustand
pub struct RelayClient<S = TcpStream> {
    framed: Framed<S, FrameCodec>,
    /// Public Key des Servers (SPKI-PEM)
    server_public_key: String,
    next_request_id: u32,
    /// Vom Server bestaetigter Raum
    raum: Option<RoomName>,
    /// Selbst erzeugter und eingereichter Schluessel
    eingereicht: Option<SecretBytes>,
    /// Zuletzt vom Server verteilter Schluessel fuer `raum`
    aktiv: Option<SecretBytes>,
}

impl RelayClient<TcpStream> {
    /// Baut eine TCP-Verbindung auf und wartet auf den Public Key
    pub async fn verbinden(addr: impl ToSocketAddrs) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        tracing::debug!(peer = ?stream.peer_addr().ok(), "TCP-Verbindung hergestellt");
        Self::ueber_stream(stream).await
    }
}

impl<S> RelayClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Startet das Protokoll ueber einen bestehenden Stream
    ///
    /// Die erste Nachricht des Servers muss `public_key` sein. Ein
    /// `error`-Frame (z.B. `server_full`) wird als `ClientError::Server`
    /// zurueckgegeben.
    pub async fn ueber_stream(stream: S) -> ClientResult<Self> {
        let mut framed = Framed::new(stream, FrameCodec::new());

        let server_public_key = loop {
            let nachricht = framed.next().await.ok_or(ClientError::VerbindungGetrennt)??;
            match nachricht.payload {
                ControlPayload::PublicKey(ankuendigung) => {
                    tracing::debug!(bits = ankuendigung.bits, "Public Key vom Server erhalten");
                    break ankuendigung.public_key;
                }
                ControlPayload::Error(ErrorResponse { code, message }) => {
                    return Err(ClientError::Server { code, message });
                }
                andere => {
                    tracing::debug!(payload = ?andere, "Nachricht vor dem Public Key ignoriert");
                }
            }
        };

        Ok(Self {
            framed,
            server_public_key,
            next_request_id: 1,
            raum: None,
            eingereicht: None,
            aktiv: None,
        })
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }

    /// Sendet eine beliebige Nachricht
    pub async fn senden(&mut self, payload: ControlPayload) -> ClientResult<()> {
        let request_id = self.next_id();
        self.framed.send(ControlMessage::new(request_id, payload)).await?;
        Ok(())
    }

    /// Tritt einem Raum bei (legt ihn bei Bedarf an)
    ///
    /// Die Bestaetigung kommt als `ClientEvent::Beigetreten`.
    pub async fn beitreten(&mut self, username: &str, raum: &str) -> ClientResult<()> {
        self.senden(ControlPayload::Join(JoinRoomRequest {
            username: username.to_string(),
            room: RoomName::from(raum),
        }))
        .await
    }

    pub async fn raum_erstellen(&mut self, raum: &str) -> ClientResult<()> {
        self.senden(ControlPayload::CreateRoom(CreateRoomRequest {
            room: RoomName::from(raum),
        }))
        .await
    }

    /// Verlaesst den aktuellen Raum und verwirft dessen Schluessel
    pub async fn verlassen(&mut self) -> ClientResult<()> {
        self.senden(ControlPayload::LeaveRoom).await?;
        self.raum = None;
        self.eingereicht = None;
        self.aktiv = None;
        Ok(())
    }

    /// Wickelt einen Schluessel mit dem Public Key des Servers ein und
    /// reicht ihn fuer den aktuellen Raum ein
    pub async fn schluessel_einreichen(&mut self, schluessel: SecretBytes) -> ClientResult<()> {
        let raum = self.raum.clone().ok_or(ClientError::KeinRaum)?;
        let wrapped_key = wrap_room_key_base64(&self.server_public_key, &schluessel)?;
        self.senden(ControlPayload::KeySubmission(KeySubmission { room: raum.clone(), wrapped_key }))
            .await?;
        self.eingereicht = Some(schluessel);
        tracing::debug!(room = %raum, "Raum-Schluessel eingereicht");
        Ok(())
    }

    /// Verschluesselt und sendet eine Text-Nachricht an den aktuellen Raum
    ///
    /// Ohne verteilten Raum-Schluessel wird nicht gesendet.
    pub async fn nachricht_senden(&mut self, text: &str) -> ClientResult<()> {
        let raum = self.raum.clone().ok_or(ClientError::KeinRaum)?;
        let schluessel = self.aktiv.as_ref().ok_or(ClientError::KeinRaumSchluessel)?;
        let verschluesselt = encrypt_message(schluessel, text.as_bytes())?;

        self.senden(ControlPayload::ChatMessage(ChatEnvelope {
            room: raum,
            ciphertext: verschluesselt.ciphertext_base64(),
            iv: verschluesselt.iv_base64(),
            ..Default::default()
        }))
        .await
    }

    /// Wartet auf das naechste Ereignis fuer die Anwendung
    ///
    /// Pings werden intern beantwortet. Fehlt im neuen Raum ein Schluessel,
    /// wird automatisch einer erzeugt und eingereicht.
    pub async fn naechstes_ereignis(&mut self) -> ClientResult<ClientEvent> {
        loop {
            let nachricht = self
                .framed
                .next()
                .await
                .ok_or(ClientError::VerbindungGetrennt)??;

            if let Some(ereignis) = self.verarbeiten(nachricht).await? {
                return Ok(ereignis);
            }
        }
    }

    async fn verarbeiten(&mut self, nachricht: ControlMessage) -> ClientResult<Option<ClientEvent>> {
        let ereignis = match nachricht.payload {
            ControlPayload::Ping(ping) => {
                let pong = ControlMessage::pong(nachricht.request_id, ping.timestamp_ms, jetzt_ms());
                self.framed.send(pong).await?;
                None
            }

            ControlPayload::RoomList(liste) => Some(ClientEvent::RaumListe(liste.rooms)),

            ControlPayload::RoomJoined(bestaetigung) => {
                if self.raum.as_ref() != Some(&bestaetigung.room) {
                    self.eingereicht = None;
                    self.aktiv = None;
                }
                self.raum = Some(bestaetigung.room.clone());

                if !bestaetigung.key_present && self.eingereicht.is_none() {
                    self.schluessel_einreichen(generate_room_key()).await?;
                }
                Some(ClientEvent::Beigetreten {
                    raum: bestaetigung.room,
                    mitglieder: bestaetigung.members,
                    schluessel_vorhanden: bestaetigung.key_present,
                })
            }

            ControlPayload::KeyDistribution(verteilung) => {
                if self.raum.as_ref() != Some(&verteilung.room) {
                    tracing::debug!(room = %verteilung.room, "Schluessel fuer fremden Raum ignoriert");
                    return Ok(None);
                }
                let schluessel = SecretBytes::from_base64(&verteilung.key)?;
                let eigener = self.eingereicht.as_ref() == Some(&schluessel);
                self.aktiv = Some(schluessel);
                Some(ClientEvent::SchluesselBereit {
                    raum: verteilung.room,
                    epoch: verteilung.epoch,
                    eigener,
                })
            }

            ControlPayload::ChatMessage(envelope) => {
                let inhalt = self.entschluesseln(&envelope);
                Some(ClientEvent::Nachricht {
                    raum: envelope.room,
                    sender: envelope.sender.unwrap_or_default(),
                    inhalt,
                    zeitstempel: envelope.timestamp,
                })
            }

            ControlPayload::UserJoined(p) => Some(ClientEvent::BenutzerBeigetreten {
                raum: p.room,
                username: p.username,
            }),
            ControlPayload::UserLeft(p) => Some(ClientEvent::BenutzerVerlassen {
                raum: p.room,
                username: p.username,
            }),

            ControlPayload::Error(ErrorResponse { code, message }) => {
                Some(ClientEvent::ServerFehler { code, message })
            }

            ControlPayload::PublicKey(ankuendigung) => {
                self.server_public_key = ankuendigung.public_key;
                None
            }

            andere => {
                tracing::trace!(payload = ?andere, "Nachricht ignoriert");
                None
            }
        };
        Ok(ereignis)
    }

    /// Fehler beim Entschluesseln fuehren nie zum Abbruch
    fn entschluesseln(&self, envelope: &ChatEnvelope) -> ChatInhalt {
        let Some(schluessel) = self.aktiv.as_ref().filter(|_| self.raum.as_ref() == Some(&envelope.room))
        else {
            return ChatInhalt::Unentschluesselbar;
        };

        let klartext = EncryptedMessage::from_base64(&envelope.ciphertext, &envelope.iv)
            .and_then(|nachricht| decrypt_message(schluessel, &nachricht));
        match klartext.map(String::from_utf8) {
            Ok(Ok(text)) => ChatInhalt::Text(text),
            _ => {
                tracing::debug!(room = %envelope.room, "Nachricht nicht entschluesselbar");
                ChatInhalt::Unentschluesselbar
            }
        }
    }

    pub fn server_public_key(&self) -> &str {
        &self.server_public_key
    }

    pub fn aktueller_raum(&self) -> Option<&RoomName> {
        self.raum.as_ref()
    }

    /// Selbst erzeugter Schluessel fuer den aktuellen Raum
    pub fn eingereichter_schluessel(&self) -> Option<&SecretBytes> {
        self.eingereicht.as_ref()
    }

    /// Vom Server verteilter Schluessel fuer den aktuellen Raum
    pub fn aktiver_schluessel(&self) -> Option<&SecretBytes> {
        self.aktiv.as_ref()
    }

    /// Schliesst die Verbindung
    pub async fn trennen(mut self) {
        let _ = self.framed.close().await;
        tracing::debug!("Verbindung getrennt");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use kryptochat_crypto::{KeyAuthority, MIN_RSA_BITS};
    use kryptochat_protocol::control::{
        KeyDistribution, PingMessage, PublicKeyAnnounce, RoomJoinedResponse,
    };
    use std::sync::OnceLock;
    use tokio::io::DuplexStream;

    fn authority() -> &'static KeyAuthority {
        static AUTHORITY: OnceLock<KeyAuthority> = OnceLock::new();
        AUTHORITY.get_or_init(|| KeyAuthority::generieren(MIN_RSA_BITS).unwrap())
    }

    /// Client plus Server-Seite einer In-Memory-Verbindung
    async fn verbunden() -> (RelayClient<DuplexStream>, Framed<DuplexStream, FrameCodec>) {
        let (client_seite, server_seite) = tokio::io::duplex(64 * 1024);
        let mut server = Framed::new(server_seite, FrameCodec::new());
        server
            .send(ControlMessage::push(ControlPayload::PublicKey(PublicKeyAnnounce {
                public_key: authority().public_key_pem().to_string(),
                bits: authority().bits(),
            })))
            .await
            .unwrap();
        let client = RelayClient::ueber_stream(client_seite).await.unwrap();
        (client, server)
    }

    fn beigetreten(raum: &str, key_present: bool) -> ControlMessage {
        ControlMessage::push(ControlPayload::RoomJoined(RoomJoinedResponse {
            room: RoomName::from(raum),
            members: vec!["x".into()],
            key_present,
        }))
    }

    fn verteilung(raum: &str, schluessel: &SecretBytes, epoch: u64) -> ControlMessage {
        ControlMessage::push(ControlPayload::KeyDistribution(KeyDistribution {
            room: RoomName::from(raum),
            key: schluessel.to_base64(),
            epoch,
        }))
    }

    #[tokio::test]
    async fn server_full_beim_verbinden() {
        let (client_seite, server_seite) = tokio::io::duplex(4096);
        let mut server = Framed::new(server_seite, FrameCodec::new());
        server
            .send(ControlMessage::error(
                0,
                kryptochat_protocol::ErrorCode::ServerFull,
                "Server ist voll",
            ))
            .await
            .unwrap();

        let err = RelayClient::ueber_stream(client_seite).await.err().unwrap();
        assert!(matches!(
            err,
            ClientError::Server { code: kryptochat_protocol::ErrorCode::ServerFull, .. }
        ));
    }

    #[tokio::test]
    async fn leerer_raum_reicht_automatisch_ein() {
        let (mut client, mut server) = verbunden().await;

        server.send(beigetreten("Lobby", false)).await.unwrap();
        let ereignis = client.naechstes_ereignis().await.unwrap();
        assert!(matches!(
            ereignis,
            ClientEvent::Beigetreten { schluessel_vorhanden: false, .. }
        ));

        let einreichung = server.next().await.unwrap().unwrap();
        let ControlPayload::KeySubmission(k) = einreichung.payload else {
            panic!("Erwartet KeySubmission");
        };
        assert_eq!(k.room.as_str(), "Lobby");
        let entpackt = authority().entpacken_base64(&k.wrapped_key).unwrap();
        assert_eq!(Some(&entpackt), client.eingereichter_schluessel());
        assert!(client.aktiver_schluessel().is_none());

        server.send(verteilung("Lobby", &entpackt, 1)).await.unwrap();
        let ereignis = client.naechstes_ereignis().await.unwrap();
        assert_eq!(
            ereignis,
            ClientEvent::SchluesselBereit {
                raum: RoomName::from("Lobby"),
                epoch: 1,
                eigener: true
            }
        );
        assert_eq!(client.aktiver_schluessel(), Some(&entpackt));
    }

    #[tokio::test]
    async fn vorhandener_schluessel_ohne_einreichung() {
        let (mut client, mut server) = verbunden().await;

        server.send(beigetreten("Lobby", true)).await.unwrap();
        client.naechstes_ereignis().await.unwrap();
        assert!(client.eingereichter_schluessel().is_none());

        let fremd = SecretBytes::new(vec![3; 32]);
        server.send(verteilung("Lobby", &fremd, 4)).await.unwrap();
        assert!(matches!(
            client.naechstes_ereignis().await.unwrap(),
            ClientEvent::SchluesselBereit { eigener: false, epoch: 4, .. }
        ));
    }

    #[tokio::test]
    async fn senden_ohne_schluessel_wird_verweigert() {
        let (mut client, mut server) = verbunden().await;

        assert!(matches!(
            client.nachricht_senden("hallo").await,
            Err(ClientError::KeinRaum)
        ));

        server.send(beigetreten("Lobby", true)).await.unwrap();
        client.naechstes_ereignis().await.unwrap();
        assert!(matches!(
            client.nachricht_senden("hallo").await,
            Err(ClientError::KeinRaumSchluessel)
        ));
    }

    #[tokio::test]
    async fn nachricht_verschluesseln_und_entschluesseln() {
        let (mut client, mut server) = verbunden().await;
        let schluessel = SecretBytes::new(vec![7; 32]);

        server.send(beigetreten("Lobby", true)).await.unwrap();
        server.send(verteilung("Lobby", &schluessel, 1)).await.unwrap();
        client.naechstes_ereignis().await.unwrap();
        client.naechstes_ereignis().await.unwrap();

        client.nachricht_senden("geheim").await.unwrap();
        let gesendet = server.next().await.unwrap().unwrap();
        let ControlPayload::ChatMessage(mut envelope) = gesendet.payload else {
            panic!("Erwartet ChatMessage");
        };
        assert_ne!(envelope.ciphertext, "geheim");
        assert!(envelope.sender.is_none());

        // Server stempelt und leitet zurueck
        envelope.sender = Some("x".into());
        envelope.timestamp = Some(chrono::Utc::now());
        server
            .send(ControlMessage::push(ControlPayload::ChatMessage(envelope)))
            .await
            .unwrap();

        match client.naechstes_ereignis().await.unwrap() {
            ClientEvent::Nachricht { sender, inhalt, zeitstempel, .. } => {
                assert_eq!(sender, "x");
                assert_eq!(inhalt, ChatInhalt::Text("geheim".into()));
                assert!(zeitstempel.is_some());
            }
            andere => panic!("Erwartet Nachricht, erhalten {:?}", andere),
        }
    }

    #[tokio::test]
    async fn falscher_schluessel_ergibt_platzhalter() {
        let (mut client, mut server) = verbunden().await;

        server.send(beigetreten("Lobby", true)).await.unwrap();
        server
            .send(verteilung("Lobby", &SecretBytes::new(vec![1; 32]), 1))
            .await
            .unwrap();
        client.naechstes_ereignis().await.unwrap();
        client.naechstes_ereignis().await.unwrap();

        let fremd = encrypt_message(&SecretBytes::new(vec![2; 32]), b"fremd").unwrap();
        for (ciphertext, iv) in [
            (fremd.ciphertext_base64(), fremd.iv_base64()),
            ("kein base64!".to_string(), "AAAA".to_string()),
        ] {
            server
                .send(ControlMessage::push(ControlPayload::ChatMessage(ChatEnvelope {
                    room: RoomName::from("Lobby"),
                    sender: Some("y".into()),
                    ciphertext,
                    iv,
                    timestamp: None,
                })))
                .await
                .unwrap();
            assert!(matches!(
                client.naechstes_ereignis().await.unwrap(),
                ClientEvent::Nachricht { inhalt: ChatInhalt::Unentschluesselbar, .. }
            ));
        }
    }

    #[tokio::test]
    async fn ping_wird_automatisch_beantwortet() {
        let (mut client, mut server) = verbunden().await;

        server
            .send(ControlMessage::new(5, ControlPayload::Ping(PingMessage { timestamp_ms: 99 })))
            .await
            .unwrap();
        server.send(beigetreten("Lobby", true)).await.unwrap();
        client.naechstes_ereignis().await.unwrap();

        let pong = server.next().await.unwrap().unwrap();
        assert_eq!(pong.request_id, 5);
        assert!(matches!(pong.payload, ControlPayload::Pong(p) if p.echo_timestamp_ms == 99));
    }

    #[tokio::test]
    async fn raumwechsel_verwirft_alten_schluessel() {
        let (mut client, mut server) = verbunden().await;

        server.send(beigetreten("A", true)).await.unwrap();
        server
            .send(verteilung("A", &SecretBytes::new(vec![1; 32]), 1))
            .await
            .unwrap();
        client.naechstes_ereignis().await.unwrap();
        client.naechstes_ereignis().await.unwrap();
        assert!(client.aktiver_schluessel().is_some());

        server.send(beigetreten("B", true)).await.unwrap();
        client.naechstes_ereignis().await.unwrap();
        assert_eq!(client.aktueller_raum(), Some(&RoomName::from("B")));
        assert!(client.aktiver_schluessel().is_none());
    }
}
