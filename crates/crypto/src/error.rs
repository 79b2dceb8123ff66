//! Fehlertypen fuer TLS-Material und Zertifikate

use std::path::PathBuf;

use thiserror::Error;

/// Fehler beim Laden oder Erzeugen von TLS-Material
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Zertifikat-Generierung fehlgeschlagen: {0}")]
    ZertifikatGenerierung(String),

    #[error("TLS-Fehler: {0}")]
    Tls(String),

    #[error("Datei '{pfad}' nicht lesbar: {quelle}")]
    Datei {
        pfad: PathBuf,
        #[source]
        quelle: std::io::Error,
    },

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
