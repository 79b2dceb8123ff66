//! Fehlertypen fuer Desktop-Audio

use thiserror::Error;

/// Alle moeglichen Fehler beim Aufsetzen und Betreiben der Audio-Pipelines
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Prozess '{programm}' konnte nicht gestartet werden: {quelle}")]
    ProzessStart {
        programm: String,
        #[source]
        quelle: std::io::Error,
    },

    #[error("pactl {befehl} fehlgeschlagen: {ausgabe}")]
    Pactl { befehl: String, ausgabe: String },

    #[error("PulseAudio-Server nicht erreichbar nach {0:?}")]
    PulseNichtBereit(std::time::Duration),

    #[error("Pipeline beendet mit {0}")]
    PipelineBeendet(String),

    #[error("Pipeline-Kanal nicht verfuegbar: {0}")]
    KanalFehlt(&'static str),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
