//! Virtuelle PulseAudio-Geraete via `pactl`
//!
//! Fuer das Desktop-Audio werden zwei Geraete benoetigt:
//! - ein Null-Sink, dessen Monitor die Wiedergabe des Desktops liefert
//! - eine Pipe-Source, die aus einer FIFO das Mikrofon des Clients speist
//!
//! Der [`DeviceManager`] merkt sich die geladenen Modul-IDs und entlaedt sie
//! wieder in [`DeviceManager::abbauen`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{AudioError, AudioResult};

/// Einstellungen der virtuellen Geraete und Pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Pfad des PulseAudio-Sockets; Standard `/run/user/<uid>/pulse/native`
    pub pulse_server: Option<String>,
    pub wiedergabe_geraet: String,
    pub wiedergabe_beschreibung: String,
    pub wiedergabe_kanaele: u32,
    pub wiedergabe_abtastrate: u32,
    pub aufnahme_geraet: String,
    pub aufnahme_beschreibung: String,
    /// FIFO der Mikrofon-Source; Standard `/run/user/<uid>/pulse/mic.fifo`
    pub aufnahme_fifo: Option<String>,
    pub aufnahme_format: String,
    pub aufnahme_kanaele: u32,
    pub aufnahme_abtastrate: u32,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            pulse_server: None,
            wiedergabe_geraet: "deskproxy".into(),
            wiedergabe_beschreibung: "deskproxy-playback".into(),
            wiedergabe_kanaele: 2,
            wiedergabe_abtastrate: 24000,
            aufnahme_geraet: "virtmic".into(),
            aufnahme_beschreibung: "deskproxy-microphone".into(),
            aufnahme_fifo: None,
            aufnahme_format: "s16le".into(),
            aufnahme_kanaele: 1,
            aufnahme_abtastrate: 16000,
        }
    }
}

impl AudioEinstellungen {
    pub fn pulse_server(&self, benutzer_id: u32) -> String {
        self.pulse_server
            .clone()
            .unwrap_or_else(|| format!("/run/user/{benutzer_id}/pulse/native"))
    }

    pub fn aufnahme_fifo(&self, benutzer_id: u32) -> String {
        self.aufnahme_fifo
            .clone()
            .unwrap_or_else(|| format!("/run/user/{benutzer_id}/pulse/mic.fifo"))
    }

    /// Monitor des Wiedergabe-Sinks, Quelle der Playback-Pipeline
    pub fn monitor_geraet(&self) -> String {
        format!("{}.monitor", self.wiedergabe_geraet)
    }
}

/// Verwaltet per `pactl` geladene Module auf einem PulseAudio-Server
#[derive(Debug)]
pub struct DeviceManager {
    server: String,
    module: Vec<String>,
}

impl DeviceManager {
    pub fn neu(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            module: Vec::new(),
        }
    }

    pub fn geladene_module(&self) -> &[String] {
        &self.module
    }

    /// Fragt `pactl info` ab, bis der Server antwortet oder `timeout` ablaeuft
    pub async fn warten_bis_bereit(&self, timeout: Duration) -> AudioResult<()> {
        let ergebnis = tokio::time::timeout(timeout, async {
            loop {
                if self.pactl(&["info".to_string()]).await.is_ok() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;
        ergebnis.map_err(|_| AudioError::PulseNichtBereit(timeout))
    }

    /// Legt Sink, Source und Standard-Source gemaess den Einstellungen an
    pub async fn einrichten(&mut self, einstellungen: &AudioEinstellungen, fifo: &str) -> AudioResult<()> {
        self.modul_laden(sink_argumente(
            &einstellungen.wiedergabe_geraet,
            &einstellungen.wiedergabe_beschreibung,
        ))
        .await?;
        self.modul_laden(source_argumente(einstellungen, fifo)).await?;
        self.pactl(&[
            "set-default-source".to_string(),
            einstellungen.aufnahme_geraet.clone(),
        ])
        .await?;
        Ok(())
    }

    /// Entlaedt alle Module; fehlgeschlagene bleiben fuer einen weiteren Versuch gemerkt
    pub async fn abbauen(&mut self) {
        let mut verbleibend = Vec::new();
        for modul in std::mem::take(&mut self.module) {
            if let Err(e) = self.pactl(&["unload-module".to_string(), modul.clone()]).await {
                tracing::error!(modul = %modul, fehler = %e, "Geraet konnte nicht entfernt werden");
                verbleibend.push(modul);
            }
        }
        self.module = verbleibend;
    }

    async fn modul_laden(&mut self, argumente: Vec<String>) -> AudioResult<()> {
        let id = self.pactl(&argumente).await?;
        tracing::debug!(modul = %id, befehl = %argumente.join(" "), "PulseAudio-Modul geladen");
        self.module.push(id);
        Ok(())
    }

    async fn pactl(&self, argumente: &[String]) -> AudioResult<String> {
        let ausgabe = Command::new("pactl")
            .arg("-s")
            .arg(&self.server)
            .args(argumente)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|quelle| AudioError::ProzessStart {
                programm: "pactl".into(),
                quelle,
            })?;

        if !ausgabe.status.success() {
            return Err(AudioError::Pactl {
                befehl: argumente.join(" "),
                ausgabe: String::from_utf8_lossy(&ausgabe.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&ausgabe.stdout).trim().to_string())
    }
}

fn sink_argumente(name: &str, beschreibung: &str) -> Vec<String> {
    vec![
        "load-module".into(),
        "module-null-sink".into(),
        format!("sink_name={name}"),
        format!("sink_properties=device.description=\"{beschreibung}\""),
    ]
}

fn source_argumente(einstellungen: &AudioEinstellungen, fifo: &str) -> Vec<String> {
    vec![
        "load-module".into(),
        "module-pipe-source".into(),
        format!("source_name={}", einstellungen.aufnahme_geraet),
        format!(
            "source_properties=device.description=\"{}\"",
            einstellungen.aufnahme_beschreibung
        ),
        format!("file={fifo}"),
        format!("format={}", einstellungen.aufnahme_format),
        format!("rate={}", einstellungen.aufnahme_abtastrate),
        format!("channels={}", einstellungen.aufnahme_kanaele),
    ]
}
