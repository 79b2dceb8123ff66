//! Display-Handler: Rohdaten zwischen Client und lokalem Display-Server

use std::time::Duration;

use async_trait::async_trait;
use deskproxy_audio::{AudioEinstellungen, DeviceManager};
use deskproxy_protocol::{Connection, ProxyStream};
use tokio::net::TcpStream;

use crate::config::DisplayAdresse;
use crate::handlers::{fehler_melden, weiterleiten, Handler, HandlerError, HandlerResult, Ueberwachung};

/// Wartezeit auf den PulseAudio-Server der Sitzung
const PULSE_WARTEZEIT: Duration = Duration::from_secs(2);

/// Virtuelle Audio-Geraete, die mit dem Display-Strom angelegt werden
#[derive(Debug, Clone)]
pub struct GeraeteEinrichtung {
    pub einstellungen: AudioEinstellungen,
    pub benutzer_id: u32,
}

pub struct DisplayHandler {
    adresse: DisplayAdresse,
    geraete: Option<GeraeteEinrichtung>,
}

impl DisplayHandler {
    pub fn neu(adresse: DisplayAdresse) -> Self {
        Self {
            adresse,
            geraete: None,
        }
    }

    pub fn mit_audio_geraeten(mut self, geraete: GeraeteEinrichtung) -> Self {
        self.geraete = Some(geraete);
        self
    }

    async fn verbinden(&self) -> HandlerResult<Box<dyn ProxyStream>> {
        let fehler = |quelle: std::io::Error| HandlerError::DisplayNichtErreichbar {
            adresse: self.adresse.to_string(),
            quelle,
        };

        match &self.adresse {
            DisplayAdresse::Tcp(ziel) => {
                let stream = TcpStream::connect(ziel).await.map_err(fehler)?;
                stream.set_nodelay(true).map_err(fehler)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            DisplayAdresse::Unix(pfad) => {
                let stream = tokio::net::UnixStream::connect(pfad).await.map_err(fehler)?;
                Ok(Box::new(stream))
            }
            #[cfg(not(unix))]
            DisplayAdresse::Unix(_) => Err(fehler(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "Unix-Sockets werden auf dieser Plattform nicht unterstuetzt",
            ))),
        }
    }
}

#[async_trait]
impl Handler for DisplayHandler {
    async fn behandeln(&self, conn: &mut Connection) -> HandlerResult<()> {
        let display = match self.verbinden().await {
            Ok(stream) => stream,
            Err(e) => return fehler_melden(conn, e).await,
        };
        conn.write_ok().await?;
        tracing::info!(peer = %conn.peer(), display = %self.adresse, "Display-Strom gestartet");

        let geraete = self
            .geraete
            .clone()
            .map(|einrichtung| tokio::spawn(geraete_einrichten(einrichtung)));

        let ergebnis = {
            let _ueberwachung = Ueberwachung::starten(conn);
            let (lesen, schreiben) = tokio::io::split(display);
            weiterleiten(conn, lesen, schreiben).await
        };

        if let Some(task) = geraete {
            match task.await {
                Ok(Some(mut manager)) => manager.abbauen().await,
                Ok(None) => {}
                Err(e) => tracing::warn!(fehler = %e, "Einrichtung der Audio-Geraete abgebrochen"),
            }
        }

        ergebnis
    }
}

/// Legt die Audio-Geraete an; Fehler werden nur geloggt
async fn geraete_einrichten(einrichtung: GeraeteEinrichtung) -> Option<DeviceManager> {
    let e = &einrichtung.einstellungen;
    let mut manager = DeviceManager::neu(e.pulse_server(einrichtung.benutzer_id));

    if let Err(fehler) = manager.warten_bis_bereit(PULSE_WARTEZEIT).await {
        tracing::warn!(fehler = %fehler, "PulseAudio nicht erreichbar, Audio-Geraete werden nicht angelegt");
        return None;
    }

    let fifo = e.aufnahme_fifo(einrichtung.benutzer_id);
    match manager.einrichten(e, &fifo).await {
        Ok(()) => tracing::info!(module = ?manager.geladene_module(), "Audio-Geraete angelegt"),
        Err(fehler) => {
            tracing::warn!(fehler = %fehler, "Audio-Geraete konnten nicht angelegt werden");
        }
    }
    // Auch teilweise geladene Module werden spaeter entfernt
    Some(manager)
}

// ---- Tests ----
