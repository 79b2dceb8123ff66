//! deskproxy-audio – Desktop-Audio fuer den Proxy
//!
//! - Virtuelle PulseAudio-Geraete (Null-Sink, Pipe-Source) via `pactl`
//! - GStreamer-Pipelines als Kindprozesse (Opus/WebM zum Client, Rohdaten ins Mikrofon)
//! - `AudioBackend`-Trait als Naht zum Proxy-Server

pub mod device;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use device::{AudioEinstellungen, DeviceManager};
pub use engine::{AudioBackend, AudioLaufzeit, AudioSession, GstAudioBackend};
pub use error::{AudioError, AudioResult};
pub use pipeline::GstPipeline;
