//! mTLS-Konfiguration fuer Proxy-Server und -Client
//!
//! Beide Seiten authentifizieren sich gegenseitig ueber Zertifikate einer
//! gemeinsamen CA. Der Server lehnt Clients ohne gueltiges Zertifikat bereits
//! im TLS-Handshake ab.
//!
//! Das Material liegt als PEM in einem Verzeichnis:
//!
//! ```text
//! ca.crt   – CA-Zertifikat(e)
//! tls.crt  – eigenes Zertifikat (Kette)
//! tls.key  – privater Schluessel
//! ```

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pemfile::{certs, private_key};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::{CryptoError, CryptoResult};

pub const CA_DATEI: &str = "ca.crt";
pub const ZERTIFIKAT_DATEI: &str = "tls.crt";
pub const SCHLUESSEL_DATEI: &str = "tls.key";

/// PEM-kodiertes TLS-Material einer Seite
#[derive(Clone)]
pub struct TlsMaterial {
    /// CA, gegen die die Gegenseite geprueft wird
    pub ca_pem: String,
    /// Eigenes Zertifikat
    pub zertifikat_pem: String,
    /// Eigener privater Schluessel
    pub schluessel_pem: String,
}

impl TlsMaterial {
    /// Laedt das Material aus drei einzelnen Dateien
    pub fn aus_dateien(ca: &Path, zertifikat: &Path, schluessel: &Path) -> CryptoResult<Self> {
        Ok(Self {
            ca_pem: datei_lesen(ca)?,
            zertifikat_pem: datei_lesen(zertifikat)?,
            schluessel_pem: datei_lesen(schluessel)?,
        })
    }

    /// Laedt `ca.crt`, `tls.crt` und `tls.key` aus einem Verzeichnis
    pub fn aus_verzeichnis(verzeichnis: &Path) -> CryptoResult<Self> {
        Self::aus_dateien(
            &verzeichnis.join(CA_DATEI),
            &verzeichnis.join(ZERTIFIKAT_DATEI),
            &verzeichnis.join(SCHLUESSEL_DATEI),
        )
    }

    /// Schreibt das Material im Verzeichnis-Layout von [`Self::aus_verzeichnis`]
    pub fn in_verzeichnis_schreiben(&self, verzeichnis: &Path) -> CryptoResult<()> {
        std::fs::create_dir_all(verzeichnis)?;
        std::fs::write(verzeichnis.join(CA_DATEI), &self.ca_pem)?;
        std::fs::write(verzeichnis.join(ZERTIFIKAT_DATEI), &self.zertifikat_pem)?;
        std::fs::write(verzeichnis.join(SCHLUESSEL_DATEI), &self.schluessel_pem)?;
        Ok(())
    }

    /// Server-Konfiguration: Client-Zertifikate sind Pflicht
    pub fn server_config(&self) -> CryptoResult<Arc<ServerConfig>> {
        let provider = krypto_provider();
        let roots = Arc::new(root_store(&self.ca_pem)?);

        let verifier = WebPkiClientVerifier::builder_with_provider(roots, Arc::clone(&provider))
            .build()
            .map_err(|e| CryptoError::Tls(format!("Client-Verifier: {e}")))?;

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| CryptoError::Tls(e.to_string()))?
            .with_client_cert_verifier(verifier)
            .with_single_cert(
                parse_certificates(&self.zertifikat_pem)?,
                parse_private_key(&self.schluessel_pem)?,
            )
            .map_err(|e| CryptoError::Tls(e.to_string()))?;

        Ok(Arc::new(config))
    }

    /// Client-Konfiguration: vertraut nur der konfigurierten CA
    pub fn client_config(&self) -> CryptoResult<Arc<ClientConfig>> {
        let config = ClientConfig::builder_with_provider(krypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| CryptoError::Tls(e.to_string()))?
            .with_root_certificates(root_store(&self.ca_pem)?)
            .with_client_auth_cert(
                parse_certificates(&self.zertifikat_pem)?,
                parse_private_key(&self.schluessel_pem)?,
            )
            .map_err(|e| CryptoError::Tls(e.to_string()))?;

        Ok(Arc::new(config))
    }

    pub fn acceptor(&self) -> CryptoResult<TlsAcceptor> {
        Ok(TlsAcceptor::from(self.server_config()?))
    }

    pub fn connector(&self) -> CryptoResult<TlsConnector> {
        Ok(TlsConnector::from(self.client_config()?))
    }

    /// SHA-256 Fingerprint des eigenen (ersten) Zertifikats
    pub fn fingerprint(&self) -> CryptoResult<String> {
        let kette = parse_certificates(&self.zertifikat_pem)?;
        let erstes = kette
            .first()
            .ok_or_else(|| CryptoError::Tls("Kein Zertifikat gefunden".to_string()))?;
        Ok(compute_certificate_fingerprint(erstes))
    }
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Schluessel nie ausgeben
        f.debug_struct("TlsMaterial")
            .field("fingerprint", &self.fingerprint().ok())
            .finish_non_exhaustive()
    }
}

/// Berechnet den SHA-256 Fingerprint eines DER-kodierten Zertifikats
pub fn compute_certificate_fingerprint(der_bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(der_bytes);
    hash.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn krypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn datei_lesen(pfad: &Path) -> CryptoResult<String> {
    std::fs::read_to_string(pfad).map_err(|quelle| CryptoError::Datei {
        pfad: pfad.to_path_buf(),
        quelle,
    })
}

fn root_store(ca_pem: &str) -> CryptoResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for zertifikat in parse_certificates(ca_pem)? {
        roots
            .add(zertifikat)
            .map_err(|e| CryptoError::Tls(format!("CA-Zertifikat ungueltig: {e}")))?;
    }
    if roots.is_empty() {
        return Err(CryptoError::Tls("Kein CA-Zertifikat gefunden".to_string()));
    }
    Ok(roots)
}

fn parse_certificates(pem: &str) -> CryptoResult<Vec<CertificateDer<'static>>> {
    let mut cursor = std::io::Cursor::new(pem.as_bytes());
    certs(&mut cursor)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CryptoError::Tls(format!("Zertifikat-Parsing fehlgeschlagen: {}", e)))
}

fn parse_private_key(pem: &str) -> CryptoResult<PrivateKeyDer<'static>> {
    let mut cursor = std::io::Cursor::new(pem.as_bytes());
    private_key(&mut cursor)
        .map_err(|e| CryptoError::Tls(format!("Schluessel-Parsing fehlgeschlagen: {}", e)))?
        .ok_or_else(|| CryptoError::Tls("Kein privater Schluessel gefunden".to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
