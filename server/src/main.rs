//! deskproxy – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Proxy.

use anyhow::{Context, Result};
use deskproxy_crypto::TlsMaterial;
use deskproxy_observability::{
    logging_initialisieren, observability_server_starten, HealthState, ProxyMetrics,
};
use deskproxy_server::{config::ProxyConfig, ProxyServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("DESKPROXY_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = ProxyConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "deskproxy wird initialisiert"
    );

    let material = TlsMaterial::aus_dateien(
        &config.tls.ca_zertifikat,
        &config.tls.zertifikat,
        &config.tls.schluessel,
    )
    .context("mTLS-Material konnte nicht geladen werden")?;
    tracing::info!(fingerprint = %material.fingerprint()?, "Server-Zertifikat geladen");
    let tls = material.server_config()?;

    let metriken = ProxyMetrics::neu()?;
    let health = HealthState::neu(metriken.clone());

    if config.observability.aktiviert {
        let adresse = config
            .observability_bind_adresse()
            .parse()
            .context("Ungueltige Observability-Adresse")?;
        let (metriken, health) = (metriken.clone(), health.clone());
        tokio::spawn(async move {
            if let Err(e) = observability_server_starten(adresse, metriken, health).await {
                tracing::error!(fehler = %e, "Observability-Server beendet");
            }
        });
    }

    let server = ProxyServer::mit_standard_handlern(&config)?.mit_metriken(metriken);
    let bind_adresse = config.bind_adresse();

    tokio::select! {
        ergebnis = server.listen(&bind_adresse, tls) => {
            ergebnis.with_context(|| format!("Proxy konnte nicht an {bind_adresse} binden"))?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            health.bereit_setzen(false);
            tracing::info!("Shutdown-Signal empfangen, deskproxy wird beendet");
        }
    }

    Ok(())
}
