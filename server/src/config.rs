//! Proxy-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Proxy ohne Konfigurationsdatei
//! lauffaehig ist.

use std::fmt;
use std::path::PathBuf;

use deskproxy_audio::AudioEinstellungen;
use serde::{Deserialize, Serialize};

/// Vollstaendige Proxy-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// mTLS-Material
    pub tls: TlsEinstellungen,
    /// Desktop-Sitzung (Display, Home, Benutzer)
    pub desktop: DesktopEinstellungen,
    /// PulseAudio- und GStreamer-Einstellungen
    pub audio: AudioEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse des Proxys
    pub bind_adresse: String,
    /// Port des Proxys
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8443,
        }
    }
}

/// Pfade zum mTLS-Material
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsEinstellungen {
    /// CA, gegen die Client-Zertifikate geprueft werden
    pub ca_zertifikat: PathBuf,
    /// Server-Zertifikat
    pub zertifikat: PathBuf,
    /// Privater Schluessel des Servers
    pub schluessel: PathBuf,
}

impl Default for TlsEinstellungen {
    fn default() -> Self {
        Self {
            ca_zertifikat: "/etc/deskproxy/tls/ca.crt".into(),
            zertifikat: "/etc/deskproxy/tls/tls.crt".into(),
            schluessel: "/etc/deskproxy/tls/tls.key".into(),
        }
    }
}

/// Einstellungen der Desktop-Sitzung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopEinstellungen {
    /// Display-Server: `unix:///pfad` oder `tcp://host:port`
    pub display_adresse: String,
    /// Home-Verzeichnis des Desktop-Benutzers (Wurzel aller Dateizugriffe)
    pub home_verzeichnis: PathBuf,
    /// UID des Desktop-Benutzers (Besitzer von Uploads)
    pub benutzer_id: u32,
    /// Virtuelle Audio-Geraete beim Display-Strom anlegen
    pub audio_geraete: bool,
}

impl Default for DesktopEinstellungen {
    fn default() -> Self {
        Self {
            display_adresse: "unix:///var/run/deskproxy/display.sock".into(),
            home_verzeichnis: "/home/deskproxy".into(),
            benutzer_id: 9000,
            audio_geraete: true,
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
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: false,
            port: 9300,
        }
    }
}

/// Adresse des lokalen Display-Servers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayAdresse {
    Tcp(String),
    Unix(PathBuf),
}

impl DisplayAdresse {
    /// Erwartet `tcp://host:port` oder `unix:///pfad`
    pub fn parse(adresse: &str) -> anyhow::Result<Self> {
        if let Some(ziel) = adresse.strip_prefix("tcp://") {
            if ziel.is_empty() {
                anyhow::bail!("Display-Adresse '{adresse}' ohne Ziel");
            }
            return Ok(Self::Tcp(ziel.to_string()));
        }
        if let Some(pfad) = adresse.strip_prefix("unix://") {
            if pfad.is_empty() {
                anyhow::bail!("Display-Adresse '{adresse}' ohne Socket-Pfad");
            }
            return Ok(Self::Unix(PathBuf::from(pfad)));
        }
        anyhow::bail!("Display-Adresse '{adresse}' muss mit tcp:// oder unix:// beginnen")
    }
}

impl fmt::Display for DisplayAdresse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(ziel) => write!(f, "tcp://{ziel}"),
            Self::Unix(pfad) => write!(f, "unix://{}", pfad.display()),
        }
    }
}

impl ProxyConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    ///
    /// Fehlt die Datei, werden Standardwerte verwendet.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
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

    /// Gibt die vollstaendige Bind-Adresse des Proxys zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }

    pub fn display_adresse(&self) -> anyhow::Result<DisplayAdresse> {
        DisplayAdresse::parse(&self.desktop.display_adresse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ProxyConfig::default();
        assert_eq!(cfg.netzwerk.port, 8443);
        assert_eq!(cfg.desktop.benutzer_id, 9000);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.observability.aktiviert);
        assert!(cfg.display_adresse().is_ok());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ProxyConfig::default();
        assert_eq!(cfg.bind_adresse(), "0.0.0.0:8443");
        assert_eq!(cfg.observability_bind_adresse(), "0.0.0.0:9300");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            port = 9443

            [desktop]
            display_adresse = "tcp://127.0.0.1:5900"
            home_verzeichnis = "/home/anna"

            [audio]
            wiedergabe_abtastrate = 48000
        "#;
        let cfg: ProxyConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.netzwerk.port, 9443);
        assert_eq!(cfg.desktop.home_verzeichnis, PathBuf::from("/home/anna"));
        assert_eq!(
            cfg.display_adresse().unwrap(),
            DisplayAdresse::Tcp("127.0.0.1:5900".into())
        );
        assert_eq!(cfg.audio.wiedergabe_abtastrate, 48000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.desktop.benutzer_id, 9000);
        assert_eq!(cfg.audio.aufnahme_abtastrate, 16000);
    }

    #[test]
    fn display_adressen() {
        assert_eq!(
            DisplayAdresse::parse("unix:///var/run/display.sock").unwrap(),
            DisplayAdresse::Unix("/var/run/display.sock".into())
        );
        assert!(DisplayAdresse::parse("udp://1.2.3.4:5").is_err());
        assert!(DisplayAdresse::parse("tcp://").is_err());
        assert!(DisplayAdresse::parse("/var/run/display.sock").is_err());
        assert_eq!(
            DisplayAdresse::Tcp("host:1".into()).to_string(),
            "tcp://host:1"
        );
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ProxyConfig::laden("/nicht/vorhanden/deskproxy.toml").unwrap();
        assert_eq!(cfg.netzwerk.port, 8443);
    }

    #[test]
    fn kaputte_datei_ist_fehler() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("config.toml");
        std::fs::write(&pfad, "[netzwerk\nport = ").unwrap();
        let fehler = ProxyConfig::laden(pfad.to_str().unwrap()).unwrap_err();
        assert!(fehler.to_string().contains("Konfigurationsfehler"));
    }
}
