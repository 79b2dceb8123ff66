//! Lebenszeichen laufender Display- und Audio-Stroeme

use std::sync::Arc;
use std::time::Duration;

use deskproxy_protocol::{ByteCounters, Connection, RequestKind};
use tokio::task::JoinHandle;

pub const LOG_INTERVALL: Duration = Duration::from_secs(10);

/// Loggt periodisch die Byte-Zaehler einer Verbindung
///
/// Beim Drop wird der Hintergrund-Task beendet und ein Abschluss-Eintrag
/// geschrieben.
pub struct Ueberwachung {
    task: JoinHandle<()>,
    zaehler: Arc<ByteCounters>,
    art: RequestKind,
    peer: String,
}

impl Ueberwachung {
    pub fn starten(conn: &Connection) -> Self {
        Self::mit_intervall(conn, LOG_INTERVALL)
    }

    pub fn mit_intervall(conn: &Connection, intervall: Duration) -> Self {
        let zaehler = conn.zaehler();
        let art = conn.kind();
        let peer = conn.peer().to_string();

        let task = {
            let zaehler = Arc::clone(&zaehler);
            let peer = peer.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(intervall);
                // Erster Tick kommt sofort
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    tracing::info!(
                        peer = %peer,
                        art = %art,
                        bytes_gesendet = zaehler.bytes_gesendet(),
                        bytes_empfangen = zaehler.bytes_empfangen(),
                        "Verbindung aktiv"
                    );
                }
            })
        };

        Self {
            task,
            zaehler,
            art,
            peer,
        }
    }
}

impl Drop for Ueberwachung {
    fn drop(&mut self) {
        self.task.abort();
        tracing::info!(
            peer = %self.peer,
            art = %self.art,
            bytes_gesendet = self.zaehler.bytes_gesendet(),
            bytes_empfangen = self.zaehler.bytes_empfangen(),
            "Verbindung wird geschlossen"
        );
    }
}
