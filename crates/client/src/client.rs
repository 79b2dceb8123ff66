//! Client-Treiber: eine Methode pro Anfragetyp
//!
//! Jede Methode baut eine eigene TLS-Verbindung auf, fuehrt den Handshake
//! durch und wertet das Status-Byte aus. Meldet der Server `Failed`, kommt
//! dessen Meldung unveraendert als Fehler zurueck.

use std::sync::Arc;

use deskproxy_protocol::{
    wire, Body, Connection, FGetRequest, FGetResponse, FPutRequest, FStatRequest, ProtocolError,
    RequestKind,
};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

use crate::error::{ClientError, ClientResult};

/// Verbindungsdaten eines Desktop-Proxys
#[derive(Clone)]
pub struct ProxyClient {
    adresse: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
}

impl ProxyClient {
    /// Erstellt einen Client fuer `host:port`
    ///
    /// Der TLS-Servername wird aus dem Host-Teil abgeleitet.
    pub fn neu(adresse: impl Into<String>, tls: Arc<ClientConfig>) -> ClientResult<Self> {
        let adresse = adresse.into();
        let host = host_aus_adresse(&adresse)
            .ok_or_else(|| ClientError::UngueltigeAdresse(adresse.clone()))?;
        let server_name = server_name(host)?;

        Ok(Self {
            adresse,
            server_name,
            connector: TlsConnector::from(tls),
        })
    }

    /// Ueberschreibt den TLS-Servernamen (z.B. wenn per IP verbunden wird)
    pub fn mit_server_name(mut self, name: &str) -> ClientResult<Self> {
        self.server_name = server_name(name)?;
        Ok(self)
    }

    pub fn adresse(&self) -> &str {
        &self.adresse
    }

    /// Oeffnet den Display-Strom; nach `OK` fliessen Rohdaten in beide Richtungen
    pub async fn display_proxy(&self) -> ClientResult<Connection> {
        let mut conn = self.verbinden(RequestKind::Display).await?;
        conn.read_status().await?;
        Ok(conn)
    }

    /// Oeffnet den Audio-Strom; nach `OK` fliessen Rohdaten in beide Richtungen
    pub async fn audio_proxy(&self) -> ClientResult<Connection> {
        let mut conn = self.verbinden(RequestKind::Audio).await?;
        conn.read_status().await?;
        Ok(conn)
    }

    /// Fragt Metadaten zu `path` ab
    ///
    /// Die Verbindung liefert danach das JSON-Dokument des Servers bis EOF.
    pub async fn stat_file(&self, path: &str) -> ClientResult<Connection> {
        wire::string_pruefen(path)?;
        let mut conn = self.verbinden(RequestKind::FStat).await?;
        FStatRequest::neu(path).send(&mut conn).await?;
        conn.read_status().await?;
        Ok(conn)
    }

    /// Laedt `path` herunter
    ///
    /// Der Inhalt ist als `body` lesbar, begrenzt auf `size` Bytes. Die
    /// Verbindung gehoert dem Body und wird mit ihm freigegeben.
    pub async fn get_file(&self, path: &str) -> ClientResult<FGetResponse<Body<Connection>>> {
        wire::string_pruefen(path)?;
        let mut conn = self.verbinden(RequestKind::FGet).await?;
        FGetRequest::neu(path).send(&mut conn).await?;
        conn.read_status().await?;

        let antwort = FGetResponse::recv(conn).await?;
        tracing::debug!(antwort = %antwort, "Download empfangen");
        Ok(antwort)
    }

    /// Laedt genau `size` Bytes aus `body` als `name` hoch
    ///
    /// Der Inhalt wird in einem eigenen Task gesendet, waehrend auf den Status
    /// gewartet wird. Lehnt der Server ab, wird der Sendevorgang abgebrochen
    /// und dessen Meldung zurueckgegeben.
    pub async fn put_file<B>(&self, name: &str, size: i64, body: B) -> ClientResult<()>
    where
        B: AsyncRead + Unpin + Send + 'static,
    {
        wire::string_pruefen(name)?;
        if size < 0 {
            return Err(ProtocolError::UngueltigeGroesse(size).into());
        }

        let conn = self.verbinden(RequestKind::FPut).await?;
        let (mut leser, mut schreiber) = conn.into_split();
        let anfrage = FPutRequest {
            name: name.to_string(),
            size,
            body,
        };

        let schreib_task = tokio::spawn(async move {
            let mut ergebnis = anfrage.send(&mut schreiber).await;
            if ergebnis.is_ok() {
                ergebnis = schreiber.flush().await.map_err(ProtocolError::from);
            }
            if ergebnis.is_err() {
                // Server soll nicht auf fehlende Bytes warten
                let _ = schreiber.shutdown().await;
            }
            ergebnis.map(|()| schreiber)
        });

        if let Err(status_fehler) = leser.read_status().await {
            // Die Meldung des Servers hat Vorrang; der Sendevorgang scheitert
            // danach meist nur noch an der geschlossenen Verbindung
            let ist_meldung = matches!(status_fehler, ProtocolError::Remote(_));
            if !ist_meldung && schreib_task.is_finished() {
                if let Ok(Err(sende_fehler)) = schreib_task.await {
                    return Err(sende_fehler.into());
                }
                return Err(status_fehler.into());
            }
            schreib_task.abort();
            return Err(status_fehler.into());
        }

        let mut schreiber = schreib_task.await??;
        if let Err(e) = schreiber.shutdown().await {
            tracing::debug!(fehler = %e, "Schliessen nach Upload fehlgeschlagen");
        }
        tracing::debug!(name = name, size = size, "Upload abgeschlossen");
        Ok(())
    }

    async fn verbinden(&self, art: RequestKind) -> ClientResult<Connection> {
        let conn =
            Connection::dial(&self.adresse, art, &self.connector, self.server_name.clone()).await?;
        Ok(conn)
    }
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("adresse", &self.adresse)
            .field("server_name", &self.server_name)
            .finish()
    }
}

fn server_name(name: &str) -> ClientResult<ServerName<'static>> {
    ServerName::try_from(name.to_string())
        .map_err(|_| ClientError::UngueltigerServerName(name.to_string()))
}

/// Host-Teil aus `host:port` bzw. `[v6]:port`
fn host_aus_adresse(adresse: &str) -> Option<&str> {
    let (host, port) = adresse.rsplit_once(':')?;
    if port.is_empty() || host.is_empty() {
        return None;
    }
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Some(host)
}
