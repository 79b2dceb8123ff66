//! Datei-Handler: Metadaten (FStat), Download (FGet) und Upload (FPut)
//!
//! Alle Pfade werden ueber einen [`PathResolver`] aufgeloest, bevor das
//! Dateisystem beruehrt wird.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use deskproxy_protocol::{
    Body, Connection, FGetRequest, FGetResponse, FPutRequest, FStatRequest, RequestStatus,
    WireMessage,
};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::archive::{self, Archiv};
use crate::handlers::{fehler_melden, Handler, HandlerError, HandlerResult};
use crate::sandbox::PathResolver;
use crate::sniff::{self, SNIFF_LAENGE};

/// Zielverzeichnis fuer Uploads, relativ zum Home
pub const UPLOAD_VERZEICHNIS: &str = "Uploads";

// ---------------------------------------------------------------------------
// FStat
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct StatAntwort {
    stat: DateiInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateiInfo {
    name: String,
    is_directory: bool,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    contents: Option<Vec<DateiInfo>>,
}

/// Antwortet mit `OK` und einem JSON-Dokument; das Ende markiert EOF
pub struct StatHandler {
    resolver: Arc<dyn PathResolver>,
}

impl StatHandler {
    pub fn neu(resolver: Arc<dyn PathResolver>) -> Self {
        Self { resolver }
    }

    async fn stat(&self, anfrage: &FStatRequest) -> HandlerResult<Vec<u8>> {
        let pfad = self.resolver.aufloesen(&anfrage.path)?;
        let meta = tokio::fs::metadata(&pfad)
            .await
            .map_err(|e| HandlerError::datei(&anfrage.path, e))?;

        let mut info = DateiInfo {
            name: anzeigename(&pfad),
            is_directory: meta.is_dir(),
            size: 0,
            contents: None,
        };

        if meta.is_dir() {
            info.contents = Some(verzeichnis_lesen(&pfad, &anfrage.path).await?);
        } else {
            info.size = meta.len();
        }

        Ok(serde_json::to_vec_pretty(&StatAntwort { stat: info })?)
    }
}

async fn verzeichnis_lesen(pfad: &Path, anzeige: &str) -> HandlerResult<Vec<DateiInfo>> {
    let mut eintraege = tokio::fs::read_dir(pfad)
        .await
        .map_err(|e| HandlerError::datei(anzeige, e))?;

    let mut inhalt = Vec::new();
    while let Some(eintrag) = eintraege
        .next_entry()
        .await
        .map_err(|e| HandlerError::datei(anzeige, e))?
    {
        let typ = eintrag.file_type().await?;
        // Groesse nur fuer Dateien; nicht lesbare Eintraege zaehlen als 0
        let size = if typ.is_dir() {
            0
        } else {
            eintrag.metadata().await.map(|m| m.len()).unwrap_or(0)
        };
        inhalt.push(DateiInfo {
            name: eintrag.file_name().to_string_lossy().into_owned(),
            is_directory: typ.is_dir(),
            size,
            contents: None,
        });
    }
    inhalt.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(inhalt)
}

#[async_trait]
impl Handler for StatHandler {
    async fn behandeln(&self, conn: &mut Connection) -> HandlerResult<()> {
        let anfrage = match conn.read_request().await.and_then(WireMessage::into_fstat) {
            Ok(anfrage) => anfrage,
            Err(e) => return fehler_melden(conn, e.into()).await,
        };
        tracing::info!(peer = %conn.peer(), anfrage = %anfrage, "Metadaten angefragt");

        let json = match self.stat(&anfrage).await {
            Ok(json) => json,
            Err(e) => return fehler_melden(conn, e).await,
        };

        conn.write_status(RequestStatus::Ok).await?;
        conn.write_all(&json).await?;
        conn.flush().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FGet
// ---------------------------------------------------------------------------

/// Liefert Dateien direkt, Verzeichnisse als tar.gz
pub struct GetHandler {
    resolver: Arc<dyn PathResolver>,
}

/// Geoeffnete Quelle eines Downloads
struct Download {
    name: String,
    datei: File,
    groesse: u64,
    // Temporaeres Archiv lebt bis nach dem Senden
    _archiv: Option<Archiv>,
}

impl GetHandler {
    pub fn neu(resolver: Arc<dyn PathResolver>) -> Self {
        Self { resolver }
    }

    async fn oeffnen(&self, anfrage: &FGetRequest) -> HandlerResult<Download> {
        let pfad = self.resolver.aufloesen(&anfrage.path)?;
        let meta = tokio::fs::metadata(&pfad)
            .await
            .map_err(|e| HandlerError::datei(&anfrage.path, e))?;

        if !meta.is_dir() {
            let datei = File::open(&pfad)
                .await
                .map_err(|e| HandlerError::datei(&anfrage.path, e))?;
            return Ok(Download {
                name: anzeigename(&pfad),
                datei,
                groesse: meta.len(),
                _archiv: None,
            });
        }

        let quelle = pfad.clone();
        let archiv = tokio::task::spawn_blocking(move || archive::verzeichnis_packen(&quelle))
            .await
            .map_err(|e| HandlerError::Archiv(e.to_string()))?
            .map_err(|e| HandlerError::Archiv(format!("{}: {e}", anfrage.path)))?;

        let datei = File::open(archiv.pfad()).await?;
        let groesse = datei.metadata().await?.len();
        Ok(Download {
            name: archiv.name.clone(),
            datei,
            groesse,
            _archiv: Some(archiv),
        })
    }
}

/// Liest den Dateianfang fuer die Typerkennung und spult zurueck
async fn content_type(datei: &mut File) -> HandlerResult<&'static str> {
    let mut kopf = Vec::with_capacity(SNIFF_LAENGE);
    (&mut *datei).take(SNIFF_LAENGE as u64).read_to_end(&mut kopf).await?;
    datei.seek(SeekFrom::Start(0)).await?;
    Ok(sniff::content_type_erkennen(&kopf))
}

#[async_trait]
impl Handler for GetHandler {
    async fn behandeln(&self, conn: &mut Connection) -> HandlerResult<()> {
        let anfrage = match conn.read_request().await.and_then(WireMessage::into_fget) {
            Ok(anfrage) => anfrage,
            Err(e) => return fehler_melden(conn, e.into()).await,
        };
        tracing::info!(peer = %conn.peer(), anfrage = %anfrage, "Download angefragt");

        let mut download = match self.oeffnen(&anfrage).await {
            Ok(download) => download,
            Err(e) => return fehler_melden(conn, e).await,
        };
        let typ = match content_type(&mut download.datei).await {
            Ok(typ) => typ,
            Err(e) => return fehler_melden(conn, e).await,
        };
        let size = match i64::try_from(download.groesse) {
            Ok(size) => size,
            Err(_) => return fehler_melden(conn, HandlerError::ZuGross(download.groesse)).await,
        };

        let antwort = FGetResponse {
            name: download.name,
            content_type: typ.to_string(),
            size,
            body: download.datei,
        };
        tracing::debug!(peer = %conn.peer(), antwort = %antwort, "Download wird gesendet");
        conn.write_response(WireMessage::FGetResponse(antwort)).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FPut
// ---------------------------------------------------------------------------

/// Speichert Uploads unter `<home>/Uploads/<name>`
pub struct PutHandler {
    resolver: Arc<dyn PathResolver>,
    besitzer: Option<u32>,
}

impl PutHandler {
    pub fn neu(resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            resolver,
            besitzer: None,
        }
    }

    /// Verzeichnis und Datei werden `uid:uid` uebereignet
    pub fn mit_besitzer(mut self, uid: u32) -> Self {
        self.besitzer = Some(uid);
        self
    }

    async fn speichern(&self, mut anfrage: FPutRequest<Body<&mut Connection>>) -> HandlerResult<PathBuf> {
        let name = dateiname_bereinigen(&anfrage.name)?;
        let verzeichnis = self.resolver.aufloesen(UPLOAD_VERZEICHNIS)?;

        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        builder
            .create(&verzeichnis)
            .await
            .map_err(|e| HandlerError::datei(UPLOAD_VERZEICHNIS, e))?;
        self.besitzer_setzen(&verzeichnis)?;

        let ziel = verzeichnis.join(&name);
        let anzeige = format!("{UPLOAD_VERZEICHNIS}/{name}");
        let mut datei = File::create(&ziel)
            .await
            .map_err(|e| HandlerError::datei(&anzeige, e))?;

        if let Err(e) = inhalt_schreiben(&mut anfrage.body, &mut datei).await {
            drop(datei);
            // Keine halben Uploads zuruecklassen
            if let Err(loeschen) = tokio::fs::remove_file(&ziel).await {
                tracing::warn!(ziel = %ziel.display(), fehler = %loeschen, "Unvollstaendiger Upload nicht entfernt");
            }
            return Err(e.into());
        }
        self.besitzer_setzen(&ziel)?;
        Ok(ziel)
    }

    #[cfg(unix)]
    fn besitzer_setzen(&self, pfad: &Path) -> HandlerResult<()> {
        use std::os::unix::fs::MetadataExt;

        let Some(uid) = self.besitzer else {
            return Ok(());
        };
        let anzeige = pfad.display().to_string();
        let meta = std::fs::metadata(pfad).map_err(|e| HandlerError::datei(&anzeige, e))?;
        if meta.uid() == uid {
            return Ok(());
        }
        std::os::unix::fs::chown(pfad, Some(uid), Some(uid)).map_err(|e| HandlerError::datei(&anzeige, e))
    }

    #[cfg(not(unix))]
    fn besitzer_setzen(&self, _pfad: &Path) -> HandlerResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Handler for PutHandler {
    async fn behandeln(&self, conn: &mut Connection) -> HandlerResult<()> {
        let peer = conn.peer().to_string();
        let ergebnis = match conn.read_request().await.and_then(WireMessage::into_fput) {
            Ok(anfrage) => {
                tracing::info!(peer = %peer, anfrage = %anfrage, "Upload empfangen");
                self.speichern(anfrage).await
            }
            Err(e) => Err(e.into()),
        };

        match ergebnis {
            Ok(ziel) => {
                tracing::info!(peer = %peer, ziel = %ziel.display(), "Upload gespeichert");
                conn.write_ok().await?;
                Ok(())
            }
            Err(e) => fehler_melden(conn, e).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

async fn inhalt_schreiben<R>(inhalt: &mut R, datei: &mut File) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    tokio::io::copy(inhalt, datei).await?;
    datei.flush().await?;
    datei.sync_all().await
}

fn anzeigename(pfad: &Path) -> String {
    pfad.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Letzte Pfadkomponente, Zeichen ausserhalb `[A-Za-z0-9._-]` werden zu `-`
pub fn dateiname_bereinigen(name: &str) -> HandlerResult<String> {
    let basis = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let bereinigt: String = basis
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    if bereinigt.is_empty() || bereinigt == "." || bereinigt == ".." {
        return Err(HandlerError::UngueltigerName(name.to_string()));
    }
    Ok(bereinigt)
}

// ---- Tests ----
