//! deskproxy-client – Client-Treiber fuer den Desktop-Proxy
//!
//! ```rust,no_run
//! # async fn beispiel(tls: std::sync::Arc<tokio_rustls::rustls::ClientConfig>) -> Result<(), deskproxy_client::ClientError> {
//! use tokio::io::AsyncReadExt;
//!
//! let client = deskproxy_client::ProxyClient::neu("desktop.local:8443", tls)?;
//! let mut antwort = client.get_file("Dokumente/bericht.pdf").await?;
//! let mut inhalt = Vec::new();
//! antwort.body.read_to_end(&mut inhalt).await.map_err(deskproxy_protocol::ProtocolError::from)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::ProxyClient;
pub use error::{ClientError, ClientResult};
