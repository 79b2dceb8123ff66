//! deskproxy-server – Bibliotheks-Root
//!
//! Der [`ProxyServer`] nimmt mTLS-Verbindungen an, liest das Handshake-Byte
//! und uebergibt jede Verbindung in einem eigenen Task an den registrierten
//! Handler. Nach dem Handler wird die Verbindung geschlossen.

pub mod archive;
pub mod config;
pub mod handlers;
pub mod sandbox;
pub mod sniff;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use deskproxy_audio::{AudioBackend, GstAudioBackend};
use deskproxy_observability::ProxyMetrics;
use deskproxy_protocol::{Connection, RequestKind};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::ProxyConfig;
use crate::handlers::display::GeraeteEinrichtung;
use crate::handlers::{
    AudioHandler, DisplayHandler, GetHandler, Handler, HandlerRegistry, PutHandler, StatHandler,
};
use crate::sandbox::{HomeSandbox, PathResolver};

/// Pause nach einem fehlgeschlagenen Accept, etwa bei erschoepften Dateideskriptoren
const ACCEPT_PAUSE: Duration = Duration::from_millis(100);

/// Accept-Loop und Dispatcher
pub struct ProxyServer {
    registry: HandlerRegistry,
    metriken: Option<ProxyMetrics>,
}

struct Zustand {
    registry: HandlerRegistry,
    metriken: Option<ProxyMetrics>,
}

impl ProxyServer {
    /// Server ohne Handler; Verbindungen werden bis zur Registrierung verworfen
    pub fn neu() -> Self {
        Self {
            registry: HandlerRegistry::neu(),
            metriken: None,
        }
    }

    /// Registriert alle fuenf eingebauten Handler gemaess `config`
    pub fn mit_standard_handlern(config: &ProxyConfig) -> anyhow::Result<Self> {
        let backend: Arc<dyn AudioBackend> = Arc::new(GstAudioBackend::neu(
            config.audio.clone(),
            config.desktop.benutzer_id,
        ));
        Self::mit_audio_backend(config, backend)
    }

    /// Wie [`Self::mit_standard_handlern`], mit eigenem Audio-Backend
    pub fn mit_audio_backend(config: &ProxyConfig, backend: Arc<dyn AudioBackend>) -> anyhow::Result<Self> {
        let mut display = DisplayHandler::neu(config.display_adresse()?);
        if config.desktop.audio_geraete {
            display = display.mit_audio_geraeten(GeraeteEinrichtung {
                einstellungen: config.audio.clone(),
                benutzer_id: config.desktop.benutzer_id,
            });
        }

        let resolver: Arc<dyn PathResolver> =
            Arc::new(HomeSandbox::neu(config.desktop.home_verzeichnis.clone()));

        let mut server = Self::neu();
        server
            .handler_registrieren(RequestKind::Display, Arc::new(display))
            .handler_registrieren(RequestKind::Audio, Arc::new(AudioHandler::neu(backend)))
            .handler_registrieren(RequestKind::FStat, Arc::new(StatHandler::neu(resolver.clone())))
            .handler_registrieren(RequestKind::FGet, Arc::new(GetHandler::neu(resolver.clone())))
            .handler_registrieren(
                RequestKind::FPut,
                Arc::new(PutHandler::neu(resolver).mit_besitzer(config.desktop.benutzer_id)),
            );
        Ok(server)
    }

    pub fn mit_metriken(mut self, metriken: ProxyMetrics) -> Self {
        self.metriken = Some(metriken);
        self
    }

    /// Registriert oder ersetzt den Handler fuer `art`
    pub fn handler_registrieren(&mut self, art: RequestKind, handler: Arc<dyn Handler>) -> &mut Self {
        if self.registry.registrieren(art, handler).is_some() {
            tracing::debug!(art = %art, "Handler ersetzt");
        }
        self
    }

    pub fn handler_entfernen(&mut self, art: RequestKind) -> &mut Self {
        self.registry.entfernen(art);
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Bindet `adresse` und bedient Verbindungen bis zum Abbruch des Futures
    ///
    /// Nur ein fehlgeschlagenes Binden wird als Fehler zurueckgegeben.
    pub async fn listen(self, adresse: &str, tls: Arc<ServerConfig>) -> io::Result<()> {
        let listener = TcpListener::bind(adresse).await?;
        tracing::info!(adresse = %listener.local_addr()?, "Proxy lauscht");
        self.serve(listener, TlsAcceptor::from(tls)).await
    }

    /// Accept-Loop auf einem bereits gebundenen Listener
    pub async fn serve(self, listener: TcpListener, acceptor: TlsAcceptor) -> io::Result<()> {
        let zustand = Arc::new(Zustand {
            registry: self.registry,
            metriken: self.metriken,
        });
        tracing::info!(handler = ?zustand.registry.arten(), "Dispatcher bereit");

        loop {
            let (tcp, peer) = naechste_verbindung(|| listener.accept()).await;

            let zustand = Arc::clone(&zustand);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                verbindung_bearbeiten(zustand, acceptor, tcp, peer).await;
            });
        }
    }
}

impl Default for ProxyServer {
    fn default() -> Self {
        Self::neu()
    }
}

/// Wiederholt `annehmen` bis eine Verbindung vorliegt, mit Pause nach Fehlern
async fn naechste_verbindung<T, F, Fut>(mut annehmen: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match annehmen().await {
            Ok(verbindung) => return verbindung,
            Err(e) => {
                tracing::warn!(fehler = %e, pause_ms = ACCEPT_PAUSE.as_millis() as u64, "Accept fehlgeschlagen");
                tokio::time::sleep(ACCEPT_PAUSE).await;
            }
        }
    }
}

/// Ablauf einer Verbindung: TLS, Handshake-Byte, Handler, Schliessen
async fn verbindung_bearbeiten(
    zustand: Arc<Zustand>,
    acceptor: TlsAcceptor,
    tcp: TcpStream,
    peer: SocketAddr,
) {
    if let Err(e) = tcp.set_nodelay(true) {
        tracing::debug!(peer = %peer, fehler = %e, "TCP_NODELAY nicht gesetzt");
    }

    let tls = match acceptor.accept(tcp).await {
        Ok(tls) => tls,
        Err(e) => {
            tracing::warn!(peer = %peer, fehler = %e, "TLS-Handshake fehlgeschlagen");
            zustand.handshake_fehler();
            return;
        }
    };

    let mut conn = match Connection::accept(tls, peer.to_string()).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(peer = %peer, fehler = %e, "Handshake-Byte nicht lesbar, Verbindung verworfen");
            zustand.handshake_fehler();
            return;
        }
    };

    let art = conn.kind();
    let Some(handler) = zustand.registry.finden(art) else {
        tracing::warn!(peer = %peer, art = %art, "Kein Handler registriert, Verbindung verworfen");
        return;
    };

    tracing::debug!(peer = %peer, art = %art, "Verbindung angenommen");
    if let Some(metriken) = &zustand.metriken {
        metriken.verbindung_geoeffnet(art.name());
    }

    match handler.behandeln(&mut conn).await {
        Ok(()) => {}
        Err(e) if e.ist_broken_pipe() => {
            tracing::debug!(peer = %peer, art = %art, fehler = %e, "Gegenseite hat die Verbindung getrennt");
        }
        Err(e) => {
            tracing::error!(peer = %peer, art = %art, fehler = %e, "Handler fehlgeschlagen");
        }
    }

    // Schreibrichtung beenden (close_notify), markiert das Ende ungerahmter Antworten
    if let Err(e) = conn.schliessen().await {
        tracing::debug!(peer = %peer, fehler = %e, "Schliessen fehlgeschlagen");
    }

    if let Some(metriken) = &zustand.metriken {
        metriken.verbindung_geschlossen(art.name(), conn.bytes_gesendet(), conn.bytes_empfangen());
    }
    tracing::debug!(
        peer = %peer,
        art = %art,
        bytes_gesendet = conn.bytes_gesendet(),
        bytes_empfangen = conn.bytes_empfangen(),
        "Verbindung beendet"
    );
}

impl Zustand {
    fn handshake_fehler(&self) {
        if let Some(metriken) = &self.metriken {
            metriken.handshake_fehler_total.inc();
        }
    }
}

// ---- Tests ----
