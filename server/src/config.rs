//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::{bail, Result};
use kryptochat_crypto::MIN_RSA_BITS;
use kryptochat_observability::logging::{log_format_gueltig, log_level_gueltig};
use kryptochat_relay::{RelayConfig, SchluesselRichtlinie};
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerEinstellungen,
    pub netzwerk: NetzwerkEinstellungen,
    /// Relay-Verhalten (Keepalive, Queues, Schluessel-Richtlinie)
    pub relay: RelayEinstellungen,
    pub krypto: KryptoEinstellungen,
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen
    pub max_clients: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Kryptochat Relay".into(),
            max_clients: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// Port fuer das Relay-Protokoll (0 = freier Port)
    pub tcp_port: u16,
    /// Port fuer Metriken und Health
    pub observability_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 7400,
            observability_port: 9300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    pub keepalive_sek: u64,
    pub verbindungs_timeout_sek: u64,
    /// Send-Queue pro Verbindung; volle Queues verwerfen Nachrichten
    pub send_queue_groesse: usize,
    /// Chat-Nachrichten auch an den Absender zurueckschicken
    pub echo_an_absender: bool,
    /// `jeder_teilnehmer` oder `nur_ersteller`
    pub schluessel_richtlinie: SchluesselRichtlinie,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Self {
            keepalive_sek: relay.keepalive_sek,
            verbindungs_timeout_sek: relay.verbindungs_timeout_sek,
            send_queue_groesse: relay.send_queue_groesse,
            echo_an_absender: relay.echo_an_absender,
            schluessel_richtlinie: relay.schluessel_richtlinie,
        }
    }
}

/// Krypto-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KryptoEinstellungen {
    /// Groesse des RSA-Schluessels des Servers (mindestens 2048)
    pub rsa_bits: usize,
}

impl Default for KryptoEinstellungen {
    fn default() -> Self {
        Self {
            rsa_bits: MIN_RSA_BITS,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Wie lange `/health` nach dem Shutdown-Signal noch 503 ausliefert
    pub shutdown_nachlauf_ms: u64,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            shutdown_nachlauf_ms: 2000,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> Result<()> {
        if self.krypto.rsa_bits < MIN_RSA_BITS {
            bail!(
                "krypto.rsa_bits = {} ist zu klein (Minimum {MIN_RSA_BITS})",
                self.krypto.rsa_bits
            );
        }
        if !log_level_gueltig(&self.logging.level) {
            bail!("Ungueltiger Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        if self.server.max_clients == 0 {
            bail!("server.max_clients muss groesser als 0 sein");
        }
        if self.relay.send_queue_groesse == 0 {
            bail!("relay.send_queue_groesse muss groesser als 0 sein");
        }
        if self.relay.keepalive_sek == 0 {
            bail!("relay.keepalive_sek muss groesser als 0 sein");
        }
        if self.relay.verbindungs_timeout_sek <= self.relay.keepalive_sek {
            bail!(
                "relay.verbindungs_timeout_sek ({}) muss groesser als relay.keepalive_sek ({}) sein",
                self.relay.verbindungs_timeout_sek,
                self.relay.keepalive_sek
            );
        }
        Ok(())
    }

    /// Konfiguration fuer den Relay-Service
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            keepalive_sek: self.relay.keepalive_sek,
            verbindungs_timeout_sek: self.relay.verbindungs_timeout_sek,
            send_queue_groesse: self.relay.send_queue_groesse,
            echo_an_absender: self.relay.echo_an_absender,
            schluessel_richtlinie: self.relay.schluessel_richtlinie,
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!(
            "{}:{}",
            self.netzwerk.bind_adresse, self.netzwerk.observability_port
        )
    }
}
