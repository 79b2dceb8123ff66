//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Konfigurationsdatei):
//! - `DP_LOG_LEVEL`: Log-Level oder Filter-Direktive, Standard: info
//! - `DP_LOG_FORMAT`: Format (text/json), Standard: text

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "DP_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "DP_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// `level` und `format` stammen aus der Konfiguration und werden von
/// `DP_LOG_LEVEL` / `DP_LOG_FORMAT` ueberschrieben.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = log_format_waehlen(std::env::var(LOG_FORMAT_ENV).ok(), format);

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Umgebung vor Konfiguration; unbekannte Formate fallen auf `text` zurueck
fn log_format_waehlen(aus_env: Option<String>, aus_config: &str) -> String {
    let gewaehlt = aus_env.unwrap_or_else(|| aus_config.to_string());
    if log_format_gueltig(&gewaehlt) {
        gewaehlt
    } else {
        "text".to_string()
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_werte() {
        assert!(log_level_gueltig("debug"));
        assert!(log_level_gueltig("error"));
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
    }

    #[test]
    fn umgebung_hat_vorrang() {
        assert_eq!(log_format_waehlen(Some("json".into()), "text"), "json");
        assert_eq!(log_format_waehlen(None, "json"), "json");
    }

    #[test]
    fn unbekanntes_format_wird_text() {
        assert_eq!(log_format_waehlen(Some("xml".into()), "json"), "text");
        assert_eq!(log_format_waehlen(None, ""), "text");
    }
}
