//! GStreamer-Pipelines als `gst-launch-1.0`-Prozesse
//!
//! Eine [`GstPipeline`] wird elementweise zusammengesetzt und als
//! Kindprozess gestartet. Ein- und Ausgabe laufen ueber stdin/stdout
//! (`fdsrc fd=0`, `fdsink fd=1`).

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::{AudioError, AudioResult};

pub const GST_LAUNCH: &str = "gst-launch-1.0";

const TRENNER: &str = " ! ";

/// Beschreibung einer gst-launch Pipeline
#[derive(Debug, Clone, Default)]
pub struct GstPipeline {
    name: String,
    elemente: Vec<String>,
}

impl GstPipeline {
    pub fn neu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elemente: Vec::new(),
        }
    }

    pub fn mit_element(mut self, element: impl Into<String>) -> Self {
        self.elemente.push(element.into());
        self
    }

    /// Rohdaten-Caps fuer das vorherige Element
    pub fn mit_raw_caps(self, format: &str, kanaele: u32, abtastrate: u32) -> Self {
        self.mit_element(format!(
            "audio/x-raw, format={}, channels={kanaele}, rate={abtastrate}",
            format.to_uppercase()
        ))
    }

    /// PulseAudio-Quelle als erstes Element
    pub fn mit_pulse_src(self, server: &str, geraet: &str, kanaele: u32, abtastrate: u32) -> Self {
        self.mit_element(format!("pulsesrc server={server} device={geraet}"))
            .mit_raw_caps("s16le", kanaele, abtastrate)
    }

    pub fn mit_fd_src(self, fd: u32, zeitstempel: bool) -> Self {
        self.mit_element(format!("fdsrc fd={fd} do-timestamp={zeitstempel}"))
    }

    pub fn mit_fd_sink(self, fd: u32) -> Self {
        self.mit_element(format!("fdsink fd={fd}"))
    }

    pub fn mit_file_sink(self, datei: &str, anhaengen: bool) -> Self {
        self.mit_element(format!("filesink append={anhaengen} location={datei}"))
    }

    /// Textdarstellung wie auf der Kommandozeile
    pub fn beschreibung(&self) -> String {
        self.elemente.join(TRENNER)
    }

    /// Argumente fuer gst-launch; die Beschreibung wird an Leerzeichen getrennt
    pub fn argumente(&self) -> Vec<String> {
        std::iter::once("-q".to_string())
            .chain(self.beschreibung().split_whitespace().map(str::to_string))
            .collect()
    }

    /// Startet die Pipeline mit verbundenem stdin und/oder stdout
    ///
    /// stderr wird zeilenweise ins Debug-Log uebernommen.
    pub fn starten(&self, stdin: bool, stdout: bool) -> AudioResult<Child> {
        tracing::info!(pipeline = %self.name, befehl = %self.beschreibung(), "Starte GStreamer-Pipeline");

        let mut befehl = Command::new(GST_LAUNCH);
        befehl
            .args(self.argumente())
            .stdin(if stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(if stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut kind = befehl.spawn().map_err(|quelle| AudioError::ProzessStart {
            programm: GST_LAUNCH.into(),
            quelle,
        })?;

        if let Some(stderr) = kind.stderr.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut zeilen = BufReader::new(stderr).lines();
                while let Ok(Some(zeile)) = zeilen.next_line().await {
                    tracing::debug!(pipeline = %name, "{zeile}");
                }
            });
        }

        Ok(kind)
    }
}

/// Wiedergabe: Desktop-Monitor -> Opus/WebM auf stdout
pub fn wiedergabe_pipeline(server: &str, monitor: &str, kanaele: u32, abtastrate: u32) -> GstPipeline {
    GstPipeline::neu("wiedergabe")
        .mit_pulse_src(server, monitor, kanaele, abtastrate)
        .mit_element("cutter")
        .mit_element("opusenc")
        .mit_element("webmmux")
        .mit_fd_sink(1)
}

/// Aufnahme: kodiertes Audio auf stdin -> Rohdaten in die Mikrofon-FIFO
pub fn aufnahme_pipeline(fifo: &str, format: &str, kanaele: u32, abtastrate: u32) -> GstPipeline {
    GstPipeline::neu("aufnahme")
        .mit_fd_src(0, false)
        .mit_element("decodebin")
        .mit_element("audioconvert")
        .mit_element("audioresample")
        .mit_raw_caps(format, kanaele, abtastrate)
        .mit_file_sink(fifo, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiedergabe_beschreibung() {
        let pipeline = wiedergabe_pipeline("/run/user/9000/pulse/native", "deskproxy.monitor", 2, 24000);
        assert_eq!(
            pipeline.beschreibung(),
            "pulsesrc server=/run/user/9000/pulse/native device=deskproxy.monitor \
             ! audio/x-raw, format=S16LE, channels=2, rate=24000 ! cutter ! opusenc ! webmmux ! fdsink fd=1"
        );
    }

    #[test]
    fn aufnahme_schreibt_in_fifo() {
        let pipeline = aufnahme_pipeline("/run/mic.fifo", "s16le", 1, 16000);
        let beschreibung = pipeline.beschreibung();
        assert!(beschreibung.starts_with("fdsrc fd=0 do-timestamp=false ! decodebin"));
        assert!(beschreibung.ends_with("filesink append=true location=/run/mic.fifo"));
    }

    #[test]
    fn argumente_sind_einzelne_token() {
        let pipeline = GstPipeline::neu("test").mit_fd_src(0, true).mit_fd_sink(1);
        assert_eq!(
            pipeline.argumente(),
            vec!["-q", "fdsrc", "fd=0", "do-timestamp=true", "!", "fdsink", "fd=1"]
        );
    }
}
