//! Fehlertypen fuer das Proxy-Protokoll

use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;

/// Fehler beim Lesen oder Schreiben des Wire-Protokolls
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] io::Error),

    /// Die Gegenseite hat `Failed` mit dieser Nachricht gesendet.
    /// Die Darstellung entspricht exakt der uebertragenen Nachricht.
    #[error("{0}")]
    Remote(String),

    #[error("Unbekannter Anfragetyp: {0}")]
    UnbekannterAnfragetyp(u8),

    #[error("Unbekannter Status: {0}")]
    UnbekannterStatus(u8),

    #[error("Verbindung wurde vor dem Zeilenende geschlossen")]
    UnvollstaendigeZeichenkette,

    #[error("Zeichenkette enthaelt einen Zeilenumbruch")]
    ZeilenumbruchImArgument,

    #[error("Zeichenkette ueberschreitet {max} Bytes")]
    ZeichenketteZuLang { max: usize },

    #[error("Zeichenkette ist kein gueltiges UTF-8: {0}")]
    UngueltigesUtf8(#[from] FromUtf8Error),

    #[error("Ungueltige Groesse: {0}")]
    UngueltigeGroesse(i64),

    #[error("Inhalt zu kurz: {erhalten} von {erwartet} Bytes")]
    UnvollstaendigerInhalt { erwartet: u64, erhalten: u64 },

    #[error("Anfragetyp {0} traegt keine Nachricht")]
    KeineNachricht(&'static str),

    #[error("Unerwartete Nachricht: {erhalten} statt {erwartet}")]
    UnerwarteteNachricht {
        erwartet: &'static str,
        erhalten: &'static str,
    },

    #[error("TLS-Fehler: {0}")]
    Tls(String),
}

impl ProtocolError {
    /// Prueft ob der Fehler ein abgebrochener Schreibkanal ist (Peer weg)
    pub fn ist_broken_pipe(&self) -> bool {
        match self {
            Self::Io(e) => ist_broken_pipe(e),
            _ => false,
        }
    }
}

/// Prueft ob ein IO-Fehler durch einen bereits geschlossenen Peer entstand.
///
/// Solche Fehler sind beim Abbau von Stream-Verbindungen normal und werden
/// nicht als Fehler geloggt.
pub fn ist_broken_pipe(fehler: &io::Error) -> bool {
    fehler.kind() == io::ErrorKind::BrokenPipe || fehler.to_string().ends_with("broken pipe")
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_fehler_zeigt_nachricht_unveraendert() {
        let fehler = ProtocolError::Remote("not found".to_string());
        assert_eq!(fehler.to_string(), "not found");
    }

    #[test]
    fn broken_pipe_erkennung() {
        let pipe = ProtocolError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "weg"));
        assert!(pipe.ist_broken_pipe());

        let text = io::Error::new(io::ErrorKind::Other, "write tcp: broken pipe");
        assert!(ist_broken_pipe(&text));

        let anderer = ProtocolError::Io(io::Error::new(io::ErrorKind::NotFound, "fehlt"));
        assert!(!anderer.ist_broken_pipe());
        assert!(!ProtocolError::Remote("broken pipe".into()).ist_broken_pipe());
    }
}
