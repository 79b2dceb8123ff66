//! Fehlertypen des Client-Treibers

use deskproxy_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Protokoll- oder Serverfehler; die Meldung wird unveraendert weitergegeben
    #[error(transparent)]
    Protokoll(#[from] ProtocolError),

    #[error("Ungueltige Serveradresse '{0}'")]
    UngueltigeAdresse(String),

    #[error("Ungueltiger TLS-Servername '{0}'")]
    UngueltigerServerName(String),

    #[error("Upload-Task abgebrochen: {0}")]
    UploadTask(#[from] tokio::task::JoinError),
}

impl ClientError {
    /// Meldung des Servers, falls dieser `Failed` gesendet hat
    pub fn server_meldung(&self) -> Option<&str> {
        match self {
            Self::Protokoll(ProtocolError::Remote(nachricht)) => Some(nachricht),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
