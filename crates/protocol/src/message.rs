//! Nachrichtenkatalog
//!
//! Vier strukturierte Nachrichten; Display und Audio haben keine eigenen
//! Strukturen, dort fliessen nach `OK` nur Rohdaten.
//!
//! ```text
//! FStatRequest  : [Path]
//! FGetRequest   : [Path]
//! FGetResponse  : [Name][ContentType][Size][Size Rohbytes]
//! FPutRequest   : [Name][Size][Size Rohbytes]
//! ```
//!
//! Der Katalog ist geschlossen ([`WireMessage`]). Jede Nachricht weiss, wie
//! sie sich schreibt (`send`) und liest (`recv`).

use std::fmt;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite};

use crate::body::Body;
use crate::error::{ProtocolError, ProtocolResult};
use crate::request::RequestKind;
use crate::wire;

/// Platzhalter-Inhalt fuer Nachrichten ohne Rohdaten
pub type OhneInhalt = tokio::io::Empty;

// ---------------------------------------------------------------------------
// Anfragen ohne Inhalt
// ---------------------------------------------------------------------------

/// Metadaten einer Datei oder eines Verzeichnisses abfragen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FStatRequest {
    /// Pfad relativ zum Home-Verzeichnis des Desktop-Benutzers
    pub path: String,
}

impl FStatRequest {
    pub fn neu(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub async fn send<W>(&self, schreiber: &mut W) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        wire::write_string(schreiber, &self.path).await
    }

    pub async fn recv<R>(leser: &mut R) -> ProtocolResult<Self>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        Ok(Self {
            path: wire::read_string(leser).await?,
        })
    }
}

impl fmt::Display for FStatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FStat {{ Path: $HOME/{} }}", self.path)
    }
}

/// Datei herunterladen (Verzeichnisse werden als Archiv geliefert)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FGetRequest {
    pub path: String,
}

impl FGetRequest {
    pub fn neu(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub async fn send<W>(&self, schreiber: &mut W) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        wire::write_string(schreiber, &self.path).await
    }

    pub async fn recv<R>(leser: &mut R) -> ProtocolResult<Self>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        Ok(Self {
            path: wire::read_string(leser).await?,
        })
    }
}

impl fmt::Display for FGetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FGet {{ Path: $HOME/{} }}", self.path)
    }
}

// ---------------------------------------------------------------------------
// Nachrichten mit Inhalt
// ---------------------------------------------------------------------------

/// Antwort auf [`FGetRequest`]: Kopf plus genau `size` Rohbytes
#[derive(Debug)]
pub struct FGetResponse<B> {
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub body: B,
}

impl<B> FGetResponse<B>
where
    B: AsyncRead + Unpin,
{
    /// Schreibt den Kopf und kopiert genau `size` Bytes aus dem Inhalt
    pub async fn send<W>(mut self, schreiber: &mut W) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let groesse = groesse_pruefen(self.size)?;
        wire::string_pruefen(&self.name)?;
        wire::string_pruefen(&self.content_type)?;

        wire::write_string(schreiber, &self.name).await?;
        wire::write_string(schreiber, &self.content_type).await?;
        wire::write_int64(schreiber, self.size).await?;
        inhalt_kopieren(&mut self.body, schreiber, groesse).await
    }
}

impl<C> FGetResponse<Body<C>>
where
    C: AsyncBufRead + Unpin,
{
    /// Liest den Kopf; der Inhalt bleibt als [`Body`] ueber `quelle` lesbar
    pub async fn recv(mut quelle: C) -> ProtocolResult<Self> {
        let name = wire::read_string(&mut quelle).await?;
        let content_type = wire::read_string(&mut quelle).await?;
        let size = wire::read_int64(&mut quelle).await?;
        let groesse = groesse_pruefen(size)?;

        Ok(Self {
            name,
            content_type,
            size,
            body: Body::neu(quelle, groesse),
        })
    }
}

impl<B> fmt::Display for FGetResponse<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FGetResponse {{ Name: {}, Type: {}, Size: {} }}",
            self.name, self.content_type, self.size
        )
    }
}

/// Datei hochladen: Kopf plus genau `size` Rohbytes
#[derive(Debug)]
pub struct FPutRequest<B> {
    pub name: String,
    pub size: i64,
    pub body: B,
}

impl<B> FPutRequest<B>
where
    B: AsyncRead + Unpin,
{
    pub async fn send<W>(mut self, schreiber: &mut W) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let groesse = groesse_pruefen(self.size)?;
        wire::string_pruefen(&self.name)?;

        wire::write_string(schreiber, &self.name).await?;
        wire::write_int64(schreiber, self.size).await?;
        inhalt_kopieren(&mut self.body, schreiber, groesse).await
    }
}

impl<C> FPutRequest<Body<C>>
where
    C: AsyncBufRead + Unpin,
{
    pub async fn recv(mut quelle: C) -> ProtocolResult<Self> {
        let name = wire::read_string(&mut quelle).await?;
        let size = wire::read_int64(&mut quelle).await?;
        let groesse = groesse_pruefen(size)?;

        Ok(Self {
            name,
            size,
            body: Body::neu(quelle, groesse),
        })
    }
}

impl<B> fmt::Display for FPutRequest<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FPut {{ Name: {}, Size: {} }}", self.name, self.size)
    }
}

// ---------------------------------------------------------------------------
// WireMessage
// ---------------------------------------------------------------------------

/// Kennung einer strukturierten Nachricht, zum Dekodieren
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    FStat,
    FGet,
    FPut,
    FGetResponse,
}

/// Geschlossener Katalog aller strukturierten Nachrichten
#[derive(Debug)]
pub enum WireMessage<B> {
    FStat(FStatRequest),
    FGet(FGetRequest),
    FPut(FPutRequest<B>),
    FGetResponse(FGetResponse<B>),
}

impl MessageTag {
    /// Anfrage, die ein Client nach dem Handshake-Byte `art` sendet
    ///
    /// Display und Audio senden keine strukturierte Anfrage.
    pub fn fuer_anfrage(art: RequestKind) -> Option<Self> {
        match art {
            RequestKind::FStat => Some(Self::FStat),
            RequestKind::FGet => Some(Self::FGet),
            RequestKind::FPut => Some(Self::FPut),
            RequestKind::Display | RequestKind::Audio => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::FStat => "FStatRequest",
            Self::FGet => "FGetRequest",
            Self::FPut => "FPutRequest",
            Self::FGetResponse => "FGetResponse",
        }
    }
}

impl<B> WireMessage<B> {
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::FStat(_) => MessageTag::FStat,
            Self::FGet(_) => MessageTag::FGet,
            Self::FPut(_) => MessageTag::FPut,
            Self::FGetResponse(_) => MessageTag::FGetResponse,
        }
    }

    pub fn name(&self) -> &'static str {
        self.tag().name()
    }

    pub fn into_fstat(self) -> ProtocolResult<FStatRequest> {
        match self {
            Self::FStat(anfrage) => Ok(anfrage),
            andere => Err(andere.unerwartet(MessageTag::FStat)),
        }
    }

    pub fn into_fget(self) -> ProtocolResult<FGetRequest> {
        match self {
            Self::FGet(anfrage) => Ok(anfrage),
            andere => Err(andere.unerwartet(MessageTag::FGet)),
        }
    }

    pub fn into_fput(self) -> ProtocolResult<FPutRequest<B>> {
        match self {
            Self::FPut(anfrage) => Ok(anfrage),
            andere => Err(andere.unerwartet(MessageTag::FPut)),
        }
    }

    fn unerwartet(&self, erwartet: MessageTag) -> ProtocolError {
        ProtocolError::UnerwarteteNachricht {
            erwartet: erwartet.name(),
            erhalten: self.name(),
        }
    }
}

impl<B> WireMessage<B>
where
    B: AsyncRead + Unpin,
{
    pub async fn encode<W>(self, schreiber: &mut W) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self {
            Self::FStat(anfrage) => anfrage.send(schreiber).await,
            Self::FGet(anfrage) => anfrage.send(schreiber).await,
            Self::FPut(anfrage) => anfrage.send(schreiber).await,
            Self::FGetResponse(antwort) => antwort.send(schreiber).await,
        }
    }
}

impl<C> WireMessage<Body<C>>
where
    C: AsyncBufRead + Unpin,
{
    /// Liest die Nachricht `tag` aus `quelle`
    ///
    /// Nachrichten mit Inhalt behalten die Quelle im [`Body`].
    pub async fn decode(tag: MessageTag, mut quelle: C) -> ProtocolResult<Self> {
        Ok(match tag {
            MessageTag::FStat => Self::FStat(FStatRequest::recv(&mut quelle).await?),
            MessageTag::FGet => Self::FGet(FGetRequest::recv(&mut quelle).await?),
            MessageTag::FPut => Self::FPut(FPutRequest::recv(quelle).await?),
            MessageTag::FGetResponse => Self::FGetResponse(FGetResponse::recv(quelle).await?),
        })
    }
}

fn groesse_pruefen(size: i64) -> ProtocolResult<u64> {
    u64::try_from(size).map_err(|_| ProtocolError::UngueltigeGroesse(size))
}

/// Kopiert genau `groesse` Bytes; ein zu kurzer Inhalt ist ein Fehler
async fn inhalt_kopieren<B, W>(inhalt: &mut B, schreiber: &mut W, groesse: u64) -> ProtocolResult<()>
where
    B: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let kopiert = tokio::io::copy(&mut inhalt.take(groesse), schreiber).await?;
    if kopiert < groesse {
        return Err(ProtocolError::UnvollstaendigerInhalt {
            erwartet: groesse,
            erhalten: kopiert,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
