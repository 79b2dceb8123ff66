//! Proxy-Verbindung: ein bidirektionaler Bytestrom mit Anfragetyp und Zaehlern
//!
//! Eine [`Connection`] entsteht entweder clientseitig ueber [`Connection::dial`]
//! (TLS-Verbindung aufbauen, Handshake-Byte senden) oder serverseitig ueber
//! [`Connection::accept`] (Handshake-Byte lesen). Danach ist sie ein normaler
//! Datenstrom, ueber den Nachrichten oder Rohdaten fliessen.
//!
//! Lese- und Schreibrichtung sind getrennte Haelften ([`ConnReader`],
//! [`ConnWriter`]), damit beide Richtungen gleichzeitig bedient werden koennen.
//! Beide Haelften zaehlen die uebertragenen Bytes in einem gemeinsamen
//! [`ByteCounters`].

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{
    AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::body::Body;
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{MessageTag, WireMessage};
use crate::request::{RequestKind, RequestStatus};
use crate::wire;

/// Transport unter einer Verbindung (TLS-Strom, TCP, In-Memory in Tests)
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ProxyStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

type BoxedStream = Box<dyn ProxyStream>;

// ---------------------------------------------------------------------------
// ByteCounters
// ---------------------------------------------------------------------------

/// Gesendete und empfangene Bytes einer Verbindung
///
/// Wird von beiden Haelften gleichzeitig geschrieben und von
/// Ueberwachungs-Tasks gelesen.
#[derive(Debug, Default)]
pub struct ByteCounters {
    gesendet: AtomicU64,
    empfangen: AtomicU64,
}

impl ByteCounters {
    pub fn bytes_gesendet(&self) -> u64 {
        self.gesendet.load(Ordering::Relaxed)
    }

    pub fn bytes_empfangen(&self) -> u64 {
        self.empfangen.load(Ordering::Relaxed)
    }

    fn gesendet_addieren(&self, anzahl: usize) {
        self.gesendet.fetch_add(anzahl as u64, Ordering::Relaxed);
    }

    fn empfangen_addieren(&self, anzahl: usize) {
        self.empfangen.fetch_add(anzahl as u64, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// ConnReader
// ---------------------------------------------------------------------------

/// Lesehaelfte einer Verbindung (gepuffert)
pub struct ConnReader {
    inner: BufReader<ReadHalf<BoxedStream>>,
    zaehler: Arc<ByteCounters>,
}

impl ConnReader {
    pub async fn read_byte(&mut self) -> ProtocolResult<u8> {
        wire::read_byte(self).await
    }

    pub async fn read_string(&mut self) -> ProtocolResult<String> {
        wire::read_string(self).await
    }

    pub async fn read_int64(&mut self) -> ProtocolResult<i64> {
        wire::read_int64(self).await
    }

    /// Liest das Status-Byte einer Antwort
    ///
    /// Bei `Failed` wird die Fehlermeldung gelesen und als
    /// [`ProtocolError::Remote`] zurueckgegeben.
    pub async fn read_status(&mut self) -> ProtocolResult<()> {
        let byte = self.read_byte().await?;
        match RequestStatus::from_byte(byte) {
            Some(RequestStatus::Ok) => Ok(()),
            Some(RequestStatus::Failed) => {
                let nachricht = self.read_string().await?;
                Err(ProtocolError::Remote(nachricht))
            }
            None => Err(ProtocolError::UnbekannterStatus(byte)),
        }
    }

    pub fn zaehler(&self) -> Arc<ByteCounters> {
        Arc::clone(&self.zaehler)
    }
}

impl AsyncRead for ConnReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let vorher = buf.filled().len();
        let ergebnis = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = ergebnis {
            this.zaehler.empfangen_addieren(buf.filled().len() - vorher);
        }
        ergebnis
    }
}

impl AsyncBufRead for ConnReader {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        let this = self.get_mut();
        this.zaehler.empfangen_addieren(amt);
        Pin::new(&mut this.inner).consume(amt);
    }
}

// ---------------------------------------------------------------------------
// ConnWriter
// ---------------------------------------------------------------------------

/// Schreibhaelfte einer Verbindung
pub struct ConnWriter {
    inner: WriteHalf<BoxedStream>,
    zaehler: Arc<ByteCounters>,
}

impl ConnWriter {
    pub async fn write_byte(&mut self, byte: u8) -> ProtocolResult<()> {
        wire::write_byte(self, byte).await
    }

    pub async fn write_string(&mut self, wert: &str) -> ProtocolResult<()> {
        wire::write_string(self, wert).await
    }

    pub async fn write_int64(&mut self, wert: i64) -> ProtocolResult<()> {
        wire::write_int64(self, wert).await
    }

    pub async fn write_status(&mut self, status: RequestStatus) -> ProtocolResult<()> {
        self.write_byte(status.als_byte()).await
    }

    pub fn zaehler(&self) -> Arc<ByteCounters> {
        Arc::clone(&self.zaehler)
    }
}

impl AsyncWrite for ConnWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let ergebnis = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = ergebnis {
            this.zaehler.gesendet_addieren(n);
        }
        ergebnis
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Eine Proxy-Verbindung mit festgelegtem Anfragetyp
pub struct Connection {
    leser: ConnReader,
    schreiber: ConnWriter,
    art: RequestKind,
    peer: String,
}

impl Connection {
    /// Umhuellt einen bereits verbundenen Strom, ohne Handshake
    pub fn neu<S>(stream: S, art: RequestKind, peer: impl Into<String>) -> Self
    where
        S: ProxyStream + 'static,
    {
        let boxed: BoxedStream = Box::new(stream);
        let (lese_haelfte, schreib_haelfte) = tokio::io::split(boxed);
        let zaehler = Arc::new(ByteCounters::default());

        Self {
            leser: ConnReader {
                inner: BufReader::new(lese_haelfte),
                zaehler: Arc::clone(&zaehler),
            },
            schreiber: ConnWriter {
                inner: schreib_haelfte,
                zaehler,
            },
            art,
            peer: peer.into(),
        }
    }

    /// Baut eine TLS-Verbindung zu `adresse` auf und sendet das Handshake-Byte
    pub async fn dial(
        adresse: &str,
        art: RequestKind,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> ProtocolResult<Self> {
        let tcp = TcpStream::connect(adresse).await?;
        tcp.set_nodelay(true)?;

        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ProtocolError::Tls(e.to_string()))?;

        tracing::debug!(adresse = %adresse, art = %art, "Verbindung aufgebaut");
        Self::oeffnen(tls, art, adresse).await
    }

    /// Clientseitiger Handshake ueber einen bestehenden Strom
    pub async fn oeffnen<S>(stream: S, art: RequestKind, peer: impl Into<String>) -> ProtocolResult<Self>
    where
        S: ProxyStream + 'static,
    {
        let mut conn = Self::neu(stream, art, peer);
        conn.write_byte(art.als_byte()).await?;
        conn.flush().await?;
        Ok(conn)
    }

    /// Serverseitiger Handshake: liest genau ein Byte und bestimmt den Typ
    pub async fn accept<S>(stream: S, peer: impl Into<String>) -> ProtocolResult<Self>
    where
        S: ProxyStream + 'static,
    {
        // Typ ist vor dem Lesen unbekannt, wird unten ersetzt
        let mut conn = Self::neu(stream, RequestKind::Display, peer);
        let byte = conn.read_byte().await?;
        conn.art = RequestKind::from_byte(byte).ok_or(ProtocolError::UnbekannterAnfragetyp(byte))?;
        Ok(conn)
    }

    pub fn kind(&self) -> RequestKind {
        self.art
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn zaehler(&self) -> Arc<ByteCounters> {
        self.leser.zaehler()
    }

    pub fn bytes_gesendet(&self) -> u64 {
        self.leser.zaehler.bytes_gesendet()
    }

    pub fn bytes_empfangen(&self) -> u64 {
        self.leser.zaehler.bytes_empfangen()
    }

    pub async fn read_byte(&mut self) -> ProtocolResult<u8> {
        self.leser.read_byte().await
    }

    pub async fn read_string(&mut self) -> ProtocolResult<String> {
        self.leser.read_string().await
    }

    pub async fn read_int64(&mut self) -> ProtocolResult<i64> {
        self.leser.read_int64().await
    }

    pub async fn write_byte(&mut self, byte: u8) -> ProtocolResult<()> {
        self.schreiber.write_byte(byte).await
    }

    pub async fn write_string(&mut self, wert: &str) -> ProtocolResult<()> {
        self.schreiber.write_string(wert).await
    }

    pub async fn write_int64(&mut self, wert: i64) -> ProtocolResult<()> {
        self.schreiber.write_int64(wert).await
    }

    /// Wartet auf das Status-Byte der Gegenseite
    ///
    /// Ausstehende Schreibdaten werden vorher abgeschickt. Bei `Failed` wird
    /// die Verbindung geschlossen und die Meldung als
    /// [`ProtocolError::Remote`] zurueckgegeben.
    pub async fn read_status(&mut self) -> ProtocolResult<()> {
        self.flush().await?;
        match self.leser.read_status().await {
            Err(ProtocolError::Remote(nachricht)) => {
                if let Err(e) = self.schliessen().await {
                    tracing::debug!(peer = %self.peer, fehler = %e, "Schliessen nach Fehlerstatus fehlgeschlagen");
                }
                Err(ProtocolError::Remote(nachricht))
            }
            ergebnis => ergebnis,
        }
    }

    pub async fn write_status(&mut self, status: RequestStatus) -> ProtocolResult<()> {
        self.schreiber.write_status(status).await
    }

    /// Sendet `OK` ohne weitere Nutzdaten (Display, Audio, Put)
    pub async fn write_ok(&mut self) -> ProtocolResult<()> {
        self.write_status(RequestStatus::Ok).await?;
        self.flush().await
    }

    /// Liest die Anfrage, die zum Handshake-Byte dieser Verbindung gehoert
    ///
    /// Ein Upload-Inhalt bleibt als [`Body`] in der Verbindung.
    pub async fn read_request(&mut self) -> ProtocolResult<WireMessage<Body<&mut Self>>> {
        let tag = MessageTag::fuer_anfrage(self.art).ok_or(ProtocolError::KeineNachricht(self.art.name()))?;
        WireMessage::decode(tag, self).await
    }

    /// Sendet `OK` gefolgt von der kodierten Nachricht
    pub async fn write_response<B>(&mut self, nachricht: WireMessage<B>) -> ProtocolResult<()>
    where
        B: AsyncRead + Unpin + Send,
    {
        tracing::debug!(peer = %self.peer, art = %self.art, nachricht = nachricht.name(), "Antwort wird gesendet");
        self.write_status(RequestStatus::Ok).await?;
        nachricht.encode(&mut self.schreiber).await?;
        self.flush().await
    }

    /// Meldet einen Fehler an die Gegenseite: `Failed` gefolgt von der Meldung
    ///
    /// Zeilenumbrueche in der Meldung werden durch Leerzeichen ersetzt.
    pub async fn write_error(&mut self, fehler: &(dyn fmt::Display + Send + Sync)) -> ProtocolResult<()> {
        let nachricht = fehler.to_string().replace('\n', " ");
        tracing::error!(peer = %self.peer, art = %self.art, fehler = %nachricht, "Anfrage fehlgeschlagen");
        self.write_status(RequestStatus::Failed).await?;
        self.write_string(&nachricht).await?;
        self.flush().await
    }

    pub async fn flush(&mut self) -> ProtocolResult<()> {
        self.schreiber.flush().await?;
        Ok(())
    }

    /// Beendet die Schreibrichtung (bei TLS inklusive close_notify)
    pub async fn schliessen(&mut self) -> ProtocolResult<()> {
        self.schreiber.shutdown().await?;
        Ok(())
    }

    /// Zugriff auf beide Richtungen gleichzeitig
    pub fn haelften(&mut self) -> (&mut ConnReader, &mut ConnWriter) {
        (&mut self.leser, &mut self.schreiber)
    }

    /// Trennt die Verbindung in unabhaengig nutzbare Haelften
    pub fn into_split(self) -> (ConnReader, ConnWriter) {
        (self.leser, self.schreiber)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("art", &self.art)
            .field("peer", &self.peer)
            .field("bytes_gesendet", &self.bytes_gesendet())
            .field("bytes_empfangen", &self.bytes_empfangen())
            .finish()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().leser).poll_read(cx, buf)
    }
}

impl AsyncBufRead for Connection {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().leser).poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.get_mut().leser).consume(amt)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().schreiber).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().schreiber).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().schreiber).poll_shutdown(cx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn handshake_fuer_jeden_typ() {
        for art in RequestKind::ALLE {
            let (client_seite, server_seite) = duplex(64);
            let client = Connection::oeffnen(client_seite, art, "test").await.unwrap();
            let server = Connection::accept(server_seite, "test").await.unwrap();
            assert_eq!(client.kind(), art);
            assert_eq!(server.kind(), art);
            assert_eq!(client.bytes_gesendet(), 1);
            assert_eq!(server.bytes_empfangen(), 1);
        }
    }

    #[tokio::test]
    async fn unbekanntes_handshake_byte() {
        let (mut client_seite, server_seite) = duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut client_seite, &[9]).await.unwrap();
        let fehler = Connection::accept(server_seite, "test").await.unwrap_err();
        assert!(matches!(fehler, ProtocolError::UnbekannterAnfragetyp(9)));
    }

    #[tokio::test]
    async fn abbruch_vor_handshake() {
        let (client_seite, server_seite) = duplex(64);
        drop(client_seite);
        let fehler = Connection::accept(server_seite, "test").await.unwrap_err();
        assert!(matches!(fehler, ProtocolError::Io(_)));
    }

    #[tokio::test]
    async fn fehlerstatus_liefert_meldung() {
        let (client_seite, server_seite) = duplex(256);
        let mut client = Connection::oeffnen(client_seite, RequestKind::FGet, "test").await.unwrap();
        let mut server = Connection::accept(server_seite, "test").await.unwrap();

        server.write_error(&"not found").await.unwrap();

        let fehler = client.read_status().await.unwrap_err();
        assert_eq!(fehler.to_string(), "not found");
    }

    #[tokio::test]
    async fn fehlermeldung_mit_zeilenumbruch_bleibt_eine_zeile() {
        let (client_seite, server_seite) = duplex(256);
        let mut client = Connection::oeffnen(client_seite, RequestKind::FStat, "test").await.unwrap();
        let mut server = Connection::accept(server_seite, "test").await.unwrap();

        server.write_error(&"zeile eins\nzeile zwei").await.unwrap();

        let fehler = client.read_status().await.unwrap_err();
        assert_eq!(fehler.to_string(), "zeile eins zeile zwei");
    }

    #[tokio::test]
    async fn ok_status() {
        let (client_seite, server_seite) = duplex(64);
        let mut client = Connection::oeffnen(client_seite, RequestKind::Display, "test").await.unwrap();
        let mut server = Connection::accept(server_seite, "test").await.unwrap();

        server.write_ok().await.unwrap();
        client.read_status().await.unwrap();
    }

    #[tokio::test]
    async fn unbekannter_status() {
        let (client_seite, server_seite) = duplex(64);
        let mut client = Connection::oeffnen(client_seite, RequestKind::Audio, "test").await.unwrap();
        let mut server = Connection::accept(server_seite, "test").await.unwrap();

        server.write_byte(7).await.unwrap();
        server.flush().await.unwrap();
        let fehler = client.read_status().await.unwrap_err();
        assert!(matches!(fehler, ProtocolError::UnbekannterStatus(7)));
    }

    #[tokio::test]
    async fn anfrage_passend_zum_handshake() {
        let (client_seite, server_seite) = duplex(256);
        let mut client = Connection::oeffnen(client_seite, RequestKind::FPut, "test").await.unwrap();
        let mut server = Connection::accept(server_seite, "test").await.unwrap();

        crate::message::FPutRequest {
            name: "notiz.txt".to_string(),
            size: 5,
            body: std::io::Cursor::new(b"hallo".to_vec()),
        }
        .send(&mut client)
        .await
        .unwrap();
        client.flush().await.unwrap();

        let mut anfrage = server.read_request().await.unwrap().into_fput().unwrap();
        assert_eq!(anfrage.name, "notiz.txt");
        let mut inhalt = String::new();
        anfrage.body.read_to_string(&mut inhalt).await.unwrap();
        assert_eq!(inhalt, "hallo");
    }

    #[tokio::test]
    async fn stromtypen_tragen_keine_anfrage() {
        let (client_seite, server_seite) = duplex(64);
        let _client = Connection::oeffnen(client_seite, RequestKind::Display, "test").await.unwrap();
        let mut server = Connection::accept(server_seite, "test").await.unwrap();

        let fehler = server.read_request().await.unwrap_err();
        assert!(matches!(fehler, ProtocolError::KeineNachricht("display")));
    }

    #[tokio::test]
    async fn zaehler_beinhalten_trennzeichen() {
        let (client_seite, server_seite) = duplex(256);
        let mut client = Connection::oeffnen(client_seite, RequestKind::FStat, "test").await.unwrap();
        let mut server = Connection::accept(server_seite, "test").await.unwrap();

        client.write_string("abc").await.unwrap();
        client.write_int64(5).await.unwrap();
        client.flush().await.unwrap();

        assert_eq!(server.read_string().await.unwrap(), "abc");
        assert_eq!(server.read_int64().await.unwrap(), 5);

        // Handshake + "abc\n" + 8 Bytes
        assert_eq!(client.bytes_gesendet(), 13);
        assert_eq!(server.bytes_empfangen(), 13);
    }

    #[tokio::test]
    async fn haelften_arbeiten_gleichzeitig() {
        let (client_seite, server_seite) = duplex(16);
        let client = Connection::oeffnen(client_seite, RequestKind::Display, "test").await.unwrap();
        let mut server = Connection::accept(server_seite, "test").await.unwrap();

        let (mut leser, mut schreiber) = client.into_split();
        let daten: Vec<u8> = (0..200u8).collect();
        let erwartet = daten.clone();

        let schreib_task = tokio::spawn(async move {
            schreiber.write_all(&daten).await.unwrap();
            schreiber.shutdown().await.unwrap();
        });
        let lese_task = tokio::spawn(async move {
            let mut empfangen = Vec::new();
            leser.read_to_end(&mut empfangen).await.unwrap();
            empfangen
        });

        // Echo ueber die Serverseite
        let (server_leser, server_schreiber) = server.haelften();
        tokio::io::copy(server_leser, server_schreiber).await.unwrap();
        server.schliessen().await.unwrap();

        schreib_task.await.unwrap();
        assert_eq!(lese_task.await.unwrap(), erwartet);
    }
}
