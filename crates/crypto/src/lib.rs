//! # deskproxy-crypto
//!
//! Transportabsicherung fuer deskproxy.
//!
//! ## Module
//! - `tls` - mTLS-Material laden, rustls-Konfigurationen fuer Server und Client
//! - `pki` - Entwicklungs-CA und signierte Zertifikate (rcgen)
//! - `error` - Fehlertypen

pub mod error;
pub mod pki;
pub mod tls;

pub use error::{CryptoError, CryptoResult};
pub use pki::EntwicklungsPki;
pub use tls::{compute_certificate_fingerprint, TlsMaterial};
