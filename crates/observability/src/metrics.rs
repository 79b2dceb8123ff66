//! Prometheus-kompatible Metriken fuer deskproxy
//!
//! Registrierte Metriken:
//! - `deskproxy_verbindungen_total` – Counter: Angenommene Verbindungen (art)
//! - `deskproxy_aktive_verbindungen` – Gauge: Laufende Verbindungen (art)
//! - `deskproxy_bytes_gesendet_total` – Counter: Gesendete Bytes (art)
//! - `deskproxy_bytes_empfangen_total` – Counter: Empfangene Bytes (art)
//! - `deskproxy_handshake_fehler_total` – Counter: Fehlgeschlagene TLS- oder Protokoll-Handshakes

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle deskproxy-Prometheus-Metriken
#[derive(Clone)]
pub struct ProxyMetrics {
    pub registry: Arc<Registry>,

    pub verbindungen_total: IntCounterVec,
    pub aktive_verbindungen: IntGaugeVec,
    pub bytes_gesendet_total: IntCounterVec,
    pub bytes_empfangen_total: IntCounterVec,
    pub handshake_fehler_total: IntCounter,
}

impl ProxyMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let verbindungen_total = IntCounterVec::new(
            Opts::new(
                "deskproxy_verbindungen_total",
                "Gesamtanzahl angenommener Verbindungen",
            ),
            &["art"],
        )?;
        registry.register(Box::new(verbindungen_total.clone()))?;

        let aktive_verbindungen = IntGaugeVec::new(
            Opts::new(
                "deskproxy_aktive_verbindungen",
                "Anzahl aktuell laufender Verbindungen",
            ),
            &["art"],
        )?;
        registry.register(Box::new(aktive_verbindungen.clone()))?;

        let bytes_gesendet_total = IntCounterVec::new(
            Opts::new(
                "deskproxy_bytes_gesendet_total",
                "An Clients gesendete Bytes",
            ),
            &["art"],
        )?;
        registry.register(Box::new(bytes_gesendet_total.clone()))?;

        let bytes_empfangen_total = IntCounterVec::new(
            Opts::new(
                "deskproxy_bytes_empfangen_total",
                "Von Clients empfangene Bytes",
            ),
            &["art"],
        )?;
        registry.register(Box::new(bytes_empfangen_total.clone()))?;

        let handshake_fehler_total = IntCounter::with_opts(Opts::new(
            "deskproxy_handshake_fehler_total",
            "Fehlgeschlagene TLS- oder Protokoll-Handshakes",
        ))?;
        registry.register(Box::new(handshake_fehler_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbindungen_total,
            aktive_verbindungen,
            bytes_gesendet_total,
            bytes_empfangen_total,
            handshake_fehler_total,
        })
    }

    /// Eine Verbindung der Art `art` wurde an einen Handler uebergeben
    pub fn verbindung_geoeffnet(&self, art: &str) {
        self.verbindungen_total.with_label_values(&[art]).inc();
        self.aktive_verbindungen.with_label_values(&[art]).inc();
    }

    /// Die Verbindung ist beendet; uebertragene Bytes werden verbucht
    pub fn verbindung_geschlossen(&self, art: &str, gesendet: u64, empfangen: u64) {
        self.aktive_verbindungen.with_label_values(&[art]).dec();
        self.bytes_gesendet_total.with_label_values(&[art]).inc_by(gesendet);
        self.bytes_empfangen_total.with_label_values(&[art]).inc_by(empfangen);
    }

    /// Summe aller laufenden Verbindungen ueber alle Arten
    pub fn aktive_verbindungen_gesamt(&self) -> i64 {
        self.aktive_verbindungen
            .collect()
            .iter()
            .flat_map(|familie| familie.get_metric())
            .map(|metrik| metrik.get_gauge().get_value() as i64)
            .sum()
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: ProxyMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<ProxyMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
