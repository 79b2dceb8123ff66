//! Audio-Backend: liefert pro Audio-Verbindung eine laufende Sitzung
//!
//! Eine [`AudioSession`] besteht aus
//! - `wiedergabe`: kodierter Desktop-Ton, wird zum Client kopiert
//! - `aufnahme`: Mikrofon-Daten vom Client
//! - `laufzeit`: Lebenszyklus der dahinterliegenden Prozesse
//!
//! Der Proxy kennt nur den [`AudioBackend`]-Trait; [`GstAudioBackend`] ist die
//! Implementierung ueber GStreamer-Prozesse.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;

use crate::device::AudioEinstellungen;
use crate::error::{AudioError, AudioResult};
use crate::pipeline::{aufnahme_pipeline, wiedergabe_pipeline};

/// Laufende Audio-Sitzung einer Verbindung
pub struct AudioSession {
    pub wiedergabe: Box<dyn AsyncRead + Unpin + Send>,
    pub aufnahme: Box<dyn AsyncWrite + Unpin + Send>,
    pub laufzeit: Box<dyn AudioLaufzeit>,
}

/// Lebenszyklus der Prozesse hinter einer Sitzung
#[async_trait]
pub trait AudioLaufzeit: Send {
    /// Blockiert bis die Sitzung von selbst endet
    async fn warten(&mut self) -> AudioResult<()>;

    /// Beendet die Sitzung; danach kehrt `warten` zurueck
    async fn schliessen(&mut self) -> AudioResult<()>;
}

/// Startet Audio-Sitzungen
#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn starten(&self) -> AudioResult<AudioSession>;
}

/// Audio ueber zwei `gst-launch-1.0`-Prozesse
#[derive(Debug, Clone)]
pub struct GstAudioBackend {
    einstellungen: AudioEinstellungen,
    benutzer_id: u32,
}

impl GstAudioBackend {
    pub fn neu(einstellungen: AudioEinstellungen, benutzer_id: u32) -> Self {
        Self {
            einstellungen,
            benutzer_id,
        }
    }
}

#[async_trait]
impl AudioBackend for GstAudioBackend {
    async fn starten(&self) -> AudioResult<AudioSession> {
        let e = &self.einstellungen;
        let server = e.pulse_server(self.benutzer_id);

        let mut wiedergabe_prozess = wiedergabe_pipeline(
            &server,
            &e.monitor_geraet(),
            e.wiedergabe_kanaele,
            e.wiedergabe_abtastrate,
        )
        .starten(false, true)?;

        let mut aufnahme_prozess = aufnahme_pipeline(
            &e.aufnahme_fifo(self.benutzer_id),
            &e.aufnahme_format,
            e.aufnahme_kanaele,
            e.aufnahme_abtastrate,
        )
        .starten(true, false)?;

        let wiedergabe = wiedergabe_prozess
            .stdout
            .take()
            .ok_or(AudioError::KanalFehlt("stdout der Wiedergabe"))?;
        let aufnahme = aufnahme_prozess
            .stdin
            .take()
            .ok_or(AudioError::KanalFehlt("stdin der Aufnahme"))?;

        Ok(AudioSession {
            wiedergabe: Box::new(wiedergabe),
            aufnahme: Box::new(aufnahme),
            laufzeit: Box::new(GstLaufzeit {
                prozesse: vec![wiedergabe_prozess, aufnahme_prozess],
            }),
        })
    }
}

struct GstLaufzeit {
    prozesse: Vec<Child>,
}

#[async_trait]
impl AudioLaufzeit for GstLaufzeit {
    async fn warten(&mut self) -> AudioResult<()> {
        let mut fehler = Vec::new();
        for prozess in &mut self.prozesse {
            let status = prozess.wait().await?;
            if !status.success() {
                fehler.push(status.to_string());
            }
        }
        if fehler.is_empty() {
            Ok(())
        } else {
            Err(AudioError::PipelineBeendet(fehler.join(" : ")))
        }
    }

    async fn schliessen(&mut self) -> AudioResult<()> {
        for prozess in &mut self.prozesse {
            // Bereits beendete Prozesse liefern hier einen Fehler
            if let Err(e) = prozess.start_kill() {
                tracing::debug!(fehler = %e, "Pipeline war bereits beendet");
            }
        }
        for prozess in &mut self.prozesse {
            prozess.wait().await?;
        }
        Ok(())
    }
}
