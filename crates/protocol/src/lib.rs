//! deskproxy-protocol – Wire-Protokoll zwischen Proxy-Client und Desktop-Proxy
//!
//! Jede Verbindung beginnt mit einem Handshake-Byte ([`RequestKind`]). Danach
//! folgen je nach Typ strukturierte Nachrichten aus dem [`WireMessage`]-Katalog
//! oder ein roher bidirektionaler Datenstrom (Display, Audio).

pub mod body;
pub mod connection;
pub mod error;
pub mod message;
pub mod request;
pub mod wire;

pub use body::Body;
pub use connection::{ByteCounters, ConnReader, ConnWriter, Connection, ProxyStream};
pub use error::{ist_broken_pipe, ProtocolError, ProtocolResult};
pub use message::{
    FGetRequest, FGetResponse, FPutRequest, FStatRequest, MessageTag, OhneInhalt, WireMessage,
};
pub use request::{RequestKind, RequestStatus};
