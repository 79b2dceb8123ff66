//! Audio-Handler: Desktop-Ton zum Client, Mikrofon-Daten vom Client

use std::sync::Arc;

use async_trait::async_trait;
use deskproxy_audio::{AudioBackend, AudioSession};
use deskproxy_protocol::Connection;

use crate::handlers::{fehler_melden, weiterleiten, Handler, HandlerError, HandlerResult, Ueberwachung};

pub struct AudioHandler {
    backend: Arc<dyn AudioBackend>,
}

impl AudioHandler {
    pub fn neu(backend: Arc<dyn AudioBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Handler for AudioHandler {
    async fn behandeln(&self, conn: &mut Connection) -> HandlerResult<()> {
        let AudioSession {
            wiedergabe,
            aufnahme,
            mut laufzeit,
        } = match self.backend.starten().await {
            Ok(sitzung) => sitzung,
            Err(e) => return fehler_melden(conn, e.into()).await,
        };

        let ergebnis = match conn.write_ok().await {
            Ok(()) => {
                tracing::info!(peer = %conn.peer(), "Audio-Strom gestartet");
                let _ueberwachung = Ueberwachung::starten(conn);
                tokio::select! {
                    e = weiterleiten(conn, wiedergabe, aufnahme) => e,
                    e = laufzeit.warten() => {
                        tracing::debug!("Audio-Sitzung hat sich selbst beendet");
                        e.map_err(HandlerError::from)
                    }
                }
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = laufzeit.schliessen().await {
            tracing::warn!(fehler = %e, "Audio-Sitzung konnte nicht sauber beendet werden");
        }
        ergebnis
    }
}

// ---- Tests ----
