//! End-to-End-Tests: echter mTLS-Server auf einem freien Port, Client-Treiber
//! als Gegenseite.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use deskproxy_audio::{AudioBackend, AudioLaufzeit, AudioResult, AudioSession};
use deskproxy_client::ProxyClient;
use deskproxy_crypto::{EntwicklungsPki, TlsMaterial};
use deskproxy_protocol::{Connection, FStatRequest, RequestKind};
use deskproxy_server::config::ProxyConfig;
use deskproxy_server::handlers::{Handler, HandlerResult};
use deskproxy_server::ProxyServer;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::pki_types::ServerName;

// ---------------------------------------------------------------------------
// Testumgebung
// ---------------------------------------------------------------------------

struct Umgebung {
    client: ProxyClient,
    adresse: String,
    client_material: TlsMaterial,
    home: tempfile::TempDir,
    audio_geschlossen: Arc<AtomicBool>,
}

/// Audio-Backend, das Mikrofon-Daten als Wiedergabe zurueckliefert
struct EchoAudio {
    geschlossen: Arc<AtomicBool>,
}

struct EchoLaufzeit {
    geschlossen: Arc<AtomicBool>,
}

#[async_trait]
impl AudioLaufzeit for EchoLaufzeit {
    async fn warten(&mut self) -> AudioResult<()> {
        std::future::pending().await
    }

    async fn schliessen(&mut self) -> AudioResult<()> {
        self.geschlossen.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl AudioBackend for EchoAudio {
    async fn starten(&self) -> AudioResult<AudioSession> {
        let (wiedergabe, mikrofon) = tokio::io::duplex(64 * 1024);
        Ok(AudioSession {
            wiedergabe: Box::new(wiedergabe),
            aufnahme: Box::new(mikrofon),
            laufzeit: Box::new(EchoLaufzeit {
                geschlossen: Arc::clone(&self.geschlossen),
            }),
        })
    }
}

/// Handler, der jede Stat-Anfrage mit einem festen Fehler beantwortet
struct NichtGefunden;

#[async_trait]
impl Handler for NichtGefunden {
    async fn behandeln(&self, conn: &mut Connection) -> HandlerResult<()> {
        FStatRequest::recv(conn).await?;
        conn.write_error(&"not found").await?;
        Ok(())
    }
}

/// Echo-Server als Ersatz fuer den Display-Server
async fn display_echo() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let adresse = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut lesen, mut schreiben) = stream.into_split();
                let _ = tokio::io::copy(&mut lesen, &mut schreiben).await;
            });
        }
    });
    adresse
}

#[cfg(unix)]
fn besitzer(pfad: &Path) -> u32 {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(pfad).unwrap().uid()
}

#[cfg(not(unix))]
fn besitzer(_pfad: &Path) -> u32 {
    0
}

async fn starten(anpassen: impl FnOnce(&mut ProxyServer)) -> Umgebung {
    let pki = EntwicklungsPki::erzeugen("deskproxy-test-ca").unwrap();
    let server_material = pki.server_material(&["localhost"]).unwrap();
    let client_material = pki.client_material("deskproxy-app").unwrap();

    let home = tempfile::tempdir().unwrap();
    let mut config = ProxyConfig::default();
    config.desktop.home_verzeichnis = home.path().to_path_buf();
    config.desktop.display_adresse = format!("tcp://{}", display_echo().await);
    config.desktop.audio_geraete = false;
    config.desktop.benutzer_id = besitzer(home.path());

    let audio_geschlossen = Arc::new(AtomicBool::new(false));
    let backend = Arc::new(EchoAudio {
        geschlossen: Arc::clone(&audio_geschlossen),
    });
    let mut server = ProxyServer::mit_audio_backend(&config, backend).unwrap();
    anpassen(&mut server);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let adresse = listener.local_addr().unwrap().to_string();
    let acceptor = server_material.acceptor().unwrap();
    tokio::spawn(server.serve(listener, acceptor));

    let client = ProxyClient::neu(adresse.clone(), client_material.client_config().unwrap())
        .unwrap()
        .mit_server_name("localhost")
        .unwrap();

    Umgebung {
        client,
        adresse,
        client_material,
        home,
        audio_geschlossen,
    }
}

fn testdaten(laenge: usize) -> Vec<u8> {
    (0..laenge).map(|i| (i * 31 % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Dateien
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stat_liefert_verzeichnis_als_json() {
    let env = starten(|_| {}).await;
    std::fs::create_dir(env.home.path().join("docs")).unwrap();
    std::fs::write(env.home.path().join("docs/notiz.txt"), b"hallo").unwrap();

    let mut conn = env.client.stat_file("docs").await.unwrap();
    let mut json = String::new();
    conn.read_to_string(&mut json).await.unwrap();

    let wert: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        wert,
        serde_json::json!({
            "stat": {
                "name": "docs",
                "isDirectory": true,
                "size": 0,
                "contents": [{"name": "notiz.txt", "isDirectory": false, "size": 5}]
            }
        })
    );
}

#[tokio::test]
async fn fehler_des_handlers_erreicht_den_client() {
    let env = starten(|server| {
        server.handler_registrieren(RequestKind::FStat, Arc::new(NichtGefunden));
    })
    .await;

    let fehler = env.client.stat_file("egal").await.unwrap_err();
    assert_eq!(fehler.server_meldung(), Some("not found"));
    assert_eq!(fehler.to_string(), "not found");
}

#[tokio::test]
async fn upload_kommt_unveraendert_an() {
    let env = starten(|_| {}).await;
    let daten = testdaten(1024);

    env.client
        .put_file("a.bin", daten.len() as i64, std::io::Cursor::new(daten.clone()))
        .await
        .unwrap();

    let gespeichert = std::fs::read(env.home.path().join("Uploads/a.bin")).unwrap();
    assert_eq!(gespeichert.len(), 1024);
    assert_eq!(Sha256::digest(&gespeichert), Sha256::digest(&daten));
}

#[tokio::test]
async fn grosser_upload_blockiert_nicht() {
    let env = starten(|_| {}).await;
    let daten = testdaten(4 * 1024 * 1024);

    env.client
        .put_file("gross.bin", daten.len() as i64, std::io::Cursor::new(daten.clone()))
        .await
        .unwrap();

    let gespeichert = std::fs::read(env.home.path().join("Uploads/gross.bin")).unwrap();
    assert_eq!(Sha256::digest(&gespeichert), Sha256::digest(&daten));
}

#[tokio::test]
async fn abgelehnter_grosser_upload_liefert_die_servermeldung() {
    let env = starten(|_| {}).await;
    let daten = testdaten(8 * 1024 * 1024);

    let fehler = env
        .client
        .put_file("ordner/", daten.len() as i64, std::io::Cursor::new(daten))
        .await
        .unwrap_err();
    assert_eq!(fehler.server_meldung(), Some("Ungueltiger Dateiname: \"ordner/\""));
    assert!(!env.home.path().join("Uploads").exists());
}

#[tokio::test]
async fn zu_kurzer_upload_wird_verworfen() {
    let env = starten(|_| {}).await;

    let fehler = env
        .client
        .put_file("kurz.bin", 1024, std::io::Cursor::new(testdaten(100)))
        .await
        .unwrap_err();
    assert!(fehler.server_meldung().is_some(), "{fehler}");
    assert!(!env.home.path().join("Uploads/kurz.bin").exists());

    // Der Server nimmt danach weiter Uploads an
    env.client
        .put_file("danach.bin", 3, std::io::Cursor::new(b"abc".to_vec()))
        .await
        .unwrap();
    assert_eq!(std::fs::read(env.home.path().join("Uploads/danach.bin")).unwrap(), b"abc");
}

#[tokio::test]
async fn download_einer_datei() {
    let env = starten(|_| {}).await;
    std::fs::write(env.home.path().join("bericht.pdf"), b"%PDF-1.7 inhalt").unwrap();

    let mut antwort = env.client.get_file("bericht.pdf").await.unwrap();
    assert_eq!(antwort.name, "bericht.pdf");
    assert_eq!(antwort.content_type, "application/pdf");
    assert_eq!(antwort.size, 15);

    let mut inhalt = Vec::new();
    antwort.body.read_to_end(&mut inhalt).await.unwrap();
    assert_eq!(inhalt, b"%PDF-1.7 inhalt");
}

#[tokio::test]
async fn gleichzeitige_downloads_bleiben_getrennt() {
    let env = starten(|_| {}).await;
    let eins = testdaten(200_000);
    let zwei: Vec<u8> = testdaten(150_000).into_iter().rev().collect();
    std::fs::write(env.home.path().join("eins.bin"), &eins).unwrap();
    std::fs::write(env.home.path().join("zwei.bin"), &zwei).unwrap();

    let laden = |pfad: &'static str| {
        let client = env.client.clone();
        async move {
            let mut antwort = client.get_file(pfad).await.unwrap();
            let mut inhalt = Vec::new();
            antwort.body.read_to_end(&mut inhalt).await.unwrap();
            (antwort.name, inhalt)
        }
    };

    let (a, b) = tokio::join!(laden("eins.bin"), laden("zwei.bin"));
    assert_eq!(a, ("eins.bin".to_string(), eins));
    assert_eq!(b, ("zwei.bin".to_string(), zwei));
}

#[tokio::test]
async fn verzeichnis_wird_als_archiv_geliefert() {
    let env = starten(|_| {}).await;
    std::fs::create_dir(env.home.path().join("projekt")).unwrap();
    std::fs::write(env.home.path().join("projekt/main.rs"), b"fn main() {}").unwrap();

    let mut antwort = env.client.get_file("projekt").await.unwrap();
    assert_eq!(antwort.name, "projekt.tar.gz");
    assert_eq!(antwort.content_type, "application/x-gzip");

    let mut archiv = Vec::new();
    antwort.body.read_to_end(&mut archiv).await.unwrap();
    assert_eq!(archiv.len() as i64, antwort.size);

    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(archiv.as_slice()));
    let namen: Vec<String> = tar
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(namen.contains(&"projekt/main.rs".to_string()));
}

#[tokio::test]
async fn pfade_ausserhalb_des_home_werden_abgelehnt() {
    let env = starten(|_| {}).await;
    let fehler = env.client.get_file("../../etc/passwd").await.unwrap_err();
    assert_eq!(
        fehler.server_meldung(),
        Some("../../etc/passwd liegt ausserhalb des Home-Verzeichnisses")
    );
}

// ---------------------------------------------------------------------------
// Stroeme
// ---------------------------------------------------------------------------

#[tokio::test]
async fn display_strom_ist_bytegenau() {
    let env = starten(|_| {}).await;
    let mut conn = env.client.display_proxy().await.unwrap();
    assert_eq!(conn.kind(), RequestKind::Display);

    // Alle Bytewerte inklusive Zeilenumbruch und Status-Codes
    let daten: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    conn.write_all(&daten).await.unwrap();
    conn.flush().await.unwrap();

    let mut zurueck = vec![0u8; daten.len()];
    conn.read_exact(&mut zurueck).await.unwrap();
    assert_eq!(zurueck, daten);
}

#[tokio::test]
async fn audio_strom_und_abbau() {
    let env = starten(|_| {}).await;
    let mut conn = env.client.audio_proxy().await.unwrap();

    conn.write_all(b"\x1a\x45\xdf\xa3opus").await.unwrap();
    conn.flush().await.unwrap();
    let mut zurueck = [0u8; 8];
    conn.read_exact(&mut zurueck).await.unwrap();
    assert_eq!(&zurueck, b"\x1a\x45\xdf\xa3opus");

    // Schliessen der Client-Richtung beendet die Sitzung
    conn.schliessen().await.unwrap();
    let mut rest = Vec::new();
    let _ = conn.read_to_end(&mut rest).await;
    for _ in 0..50 {
        if env.audio_geschlossen.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(env.audio_geschlossen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn entfernter_handler_verwirft_die_verbindung() {
    let env = starten(|server| {
        server.handler_entfernen(RequestKind::Display);
    })
    .await;

    assert!(env.client.display_proxy().await.is_err());
    // Andere Typen bleiben verfuegbar
    assert!(env.client.stat_file("").await.is_ok());
}

// ---------------------------------------------------------------------------
// Handshake und TLS
// ---------------------------------------------------------------------------

#[tokio::test]
async fn vorzeitiges_schliessen_legt_den_server_nicht_lahm() {
    let env = starten(|_| {}).await;
    let connector = env.client_material.connector().unwrap();
    let name = ServerName::try_from("localhost").unwrap();

    // TLS steht, Handshake-Byte fehlt
    let tcp = TcpStream::connect(&env.adresse).await.unwrap();
    let tls = connector.connect(name.clone(), tcp).await.unwrap();
    drop(tls);

    // Unbekannter Anfragetyp
    let tcp = TcpStream::connect(&env.adresse).await.unwrap();
    let mut tls = connector.connect(name, tcp).await.unwrap();
    tls.write_all(&[9]).await.unwrap();
    tls.flush().await.unwrap();
    let mut puffer = [0u8; 1];
    assert!(matches!(tls.read(&mut puffer).await, Ok(0) | Err(_)));

    // Server bedient weiterhin Anfragen
    std::fs::write(env.home.path().join("da.txt"), b"ja").unwrap();
    let mut antwort = env.client.get_file("da.txt").await.unwrap();
    let mut inhalt = String::new();
    antwort.body.read_to_string(&mut inhalt).await.unwrap();
    assert_eq!(inhalt, "ja");
}

#[tokio::test]
async fn fremde_ca_wird_abgelehnt() {
    let env = starten(|_| {}).await;
    let fremde_pki = EntwicklungsPki::erzeugen("fremde-ca").unwrap();
    let mut fremdes_material = fremde_pki.client_material("eindringling").unwrap();
    // Server-Zertifikat wird weiterhin akzeptiert, das Client-Zertifikat nicht
    fremdes_material.ca_pem = env.client_material.ca_pem.clone();

    let client = ProxyClient::neu(env.adresse.clone(), fremdes_material.client_config().unwrap())
        .unwrap()
        .mit_server_name("localhost")
        .unwrap();
    assert!(client.stat_file("").await.is_err());
}
