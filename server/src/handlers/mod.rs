//! Handler pro Anfragetyp
//!
//! Der Dispatcher sucht fuer jede Verbindung anhand ihres [`RequestKind`]
//! einen [`Handler`] in der [`HandlerRegistry`]. Fehler, die vor dem
//! `OK`-Status auftreten, meldet der Handler per `write_error` an den Client;
//! spaetere Fehler gehen als [`HandlerError`] an den Dispatcher zurueck.

pub mod audio;
pub mod display;
pub mod files;
pub mod ueberwachung;

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use deskproxy_audio::AudioError;
use deskproxy_protocol::{ist_broken_pipe, Connection, ProtocolError, RequestKind};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::sandbox::SandboxError;

pub use audio::AudioHandler;
pub use display::DisplayHandler;
pub use files::{GetHandler, PutHandler, StatHandler};
pub use ueberwachung::Ueberwachung;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protokoll(#[from] ProtocolError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("{pfad}: {quelle}")]
    Datei { pfad: String, quelle: io::Error },

    #[error("Display nicht erreichbar ({adresse}): {quelle}")]
    DisplayNichtErreichbar { adresse: String, quelle: io::Error },

    #[error("Ungueltiger Dateiname: {0:?}")]
    UngueltigerName(String),

    #[error("Datei zu gross: {0} Bytes")]
    ZuGross(u64),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archivierung fehlgeschlagen: {0}")]
    Archiv(String),

    #[error("I/O-Fehler: {0}")]
    Io(#[from] io::Error),
}

pub type HandlerResult<T> = Result<T, HandlerError>;

impl HandlerError {
    /// Erwartete Trennung durch die Gegenseite
    pub fn ist_broken_pipe(&self) -> bool {
        match self {
            Self::Protokoll(e) => e.ist_broken_pipe(),
            Self::Io(e) => ist_broken_pipe(e),
            _ => false,
        }
    }

    pub(crate) fn datei(pfad: impl Into<String>, quelle: io::Error) -> Self {
        Self::Datei {
            pfad: pfad.into(),
            quelle,
        }
    }
}

/// Verarbeitet eine Verbindung nach dem Handshake
///
/// Der Dispatcher schliesst die Verbindung, sobald `behandeln` zurueckkehrt.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn behandeln(&self, conn: &mut Connection) -> HandlerResult<()>;
}

/// Zuordnung Anfragetyp -> Handler
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handler: HashMap<RequestKind, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert `handler` fuer `art`; ein vorhandener Handler wird ersetzt
    pub fn registrieren(&mut self, art: RequestKind, handler: Arc<dyn Handler>) -> Option<Arc<dyn Handler>> {
        self.handler.insert(art, handler)
    }

    pub fn entfernen(&mut self, art: RequestKind) -> Option<Arc<dyn Handler>> {
        self.handler.remove(&art)
    }

    pub fn finden(&self, art: RequestKind) -> Option<Arc<dyn Handler>> {
        self.handler.get(&art).cloned()
    }

    pub fn enthaelt(&self, art: RequestKind) -> bool {
        self.handler.contains_key(&art)
    }

    /// Registrierte Typen in Handshake-Reihenfolge
    pub fn arten(&self) -> Vec<RequestKind> {
        RequestKind::ALLE
            .iter()
            .copied()
            .filter(|art| self.enthaelt(*art))
            .collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("arten", &self.arten())
            .finish()
    }
}

/// Meldet `fehler` als `Failed`-Status an den Client
pub(crate) async fn fehler_melden(conn: &mut Connection, fehler: HandlerError) -> HandlerResult<()> {
    conn.write_error(&fehler).await?;
    Ok(())
}

/// Kopiert Rohdaten in beide Richtungen, bis eine Richtung endet
///
/// `von_ziel` wird zum Client kopiert, Daten des Clients landen in `zum_ziel`.
/// Eine getrennte Gegenseite (broken pipe) gilt als normales Ende.
pub(crate) async fn weiterleiten<R, W>(
    conn: &mut Connection,
    mut von_ziel: R,
    mut zum_ziel: W,
) -> HandlerResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (leser, schreiber) = conn.haelften();

    let hoch = async {
        let n = tokio::io::copy_buf(leser, &mut zum_ziel).await?;
        zum_ziel.shutdown().await?;
        Ok::<_, io::Error>(n)
    };
    let runter = async {
        let n = tokio::io::copy(&mut von_ziel, schreiber).await?;
        schreiber.flush().await?;
        Ok::<_, io::Error>(n)
    };

    let (richtung, ergebnis) = tokio::select! {
        e = hoch => ("client->ziel", e),
        e = runter => ("ziel->client", e),
    };

    match ergebnis {
        Ok(bytes) => {
            tracing::debug!(richtung, bytes, "Datenstrom beendet");
            Ok(())
        }
        Err(e) if ist_broken_pipe(&e) => {
            tracing::debug!(richtung, fehler = %e, "Gegenseite getrennt");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    struct Leer;

    #[async_trait]
    impl Handler for Leer {
        async fn behandeln(&self, _conn: &mut Connection) -> HandlerResult<()> {
            Ok(())
        }
    }

    #[test]
    fn registry_ersetzt_und_entfernt() {
        let mut registry = HandlerRegistry::neu();
        assert!(registry.registrieren(RequestKind::FStat, Arc::new(Leer)).is_none());
        assert!(registry.registrieren(RequestKind::FStat, Arc::new(Leer)).is_some());
        registry.registrieren(RequestKind::Display, Arc::new(Leer));

        assert_eq!(registry.arten(), vec![RequestKind::Display, RequestKind::FStat]);
        assert!(registry.finden(RequestKind::Audio).is_none());

        assert!(registry.entfernen(RequestKind::Display).is_some());
        assert!(!registry.enthaelt(RequestKind::Display));
    }

    #[test]
    fn broken_pipe_wird_erkannt() {
        let fehler = HandlerError::Io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(fehler.ist_broken_pipe());
        assert!(!HandlerError::UngueltigerName("".into()).ist_broken_pipe());
    }

    #[tokio::test]
    async fn weiterleiten_kopiert_beide_richtungen() {
        let (client, server) = duplex(1024);
        let (ziel_lokal, ziel_fern) = duplex(1024);
        let mut conn = Connection::neu(server, RequestKind::Display, "test");
        let (ziel_lesen, ziel_schreiben) = tokio::io::split(ziel_lokal);

        let weiterleitung = tokio::spawn(async move {
            weiterleiten(&mut conn, ziel_lesen, ziel_schreiben).await
        });

        // Echo auf der Zielseite
        let echo = tokio::spawn(async move {
            let (mut lesen, mut schreiben) = tokio::io::split(ziel_fern);
            tokio::io::copy(&mut lesen, &mut schreiben).await
        });

        let (mut client_lesen, mut client_schreiben) = tokio::io::split(client);
        client_schreiben.write_all(b"\x00\x01rohdaten\n\xff").await.unwrap();
        let mut empfangen = [0u8; 12];
        client_lesen.read_exact(&mut empfangen).await.unwrap();
        assert_eq!(&empfangen, b"\x00\x01rohdaten\n\xff");

        // Client beendet seine Richtung -> Weiterleitung endet
        client_schreiben.shutdown().await.unwrap();
        weiterleitung.await.unwrap().unwrap();
        echo.abort();
    }
}
