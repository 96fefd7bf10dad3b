use std::sync::Arc;

use anyhow::Context;
use extsecrets::{
    config::AppConfig,
    observability::{init_logging, log_config_info},
    secrets::{ManagerEvent, ProviderRegistry, SecretsManager, StaticFeatureGate},
    services::SettingsEncryption,
    storage::{create_pool, run_migrations, MemorySettingsStore, PgSettingsStore, SettingsStore},
    APP_NAME, VERSION,
};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

fn install_rustls_provider() -> anyhow::Result<()> {
    use rustls::crypto::{ring, CryptoProvider};

    if CryptoProvider::get_default().is_none() {
        ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("Failed to install ring crypto provider"))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_rustls_provider()?;

    // Load .env file if it exists; must happen before any config is read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    init_logging(&config.observability).context("Failed to initialize logging")?;

    info!(app_name = APP_NAME, version = VERSION, "Starting external secrets manager");
    log_config_info(&config);

    let store: Arc<dyn SettingsStore> = match &config.database {
        Some(db_config) => {
            let pool = create_pool(db_config).await?;
            run_migrations(&pool).await?;
            Arc::new(PgSettingsStore::new(pool))
        }
        None => {
            warn!("EXTSECRETS_DATABASE_URL not set, provider settings will not survive a restart");
            Arc::new(MemorySettingsStore::new())
        }
    };

    let encryption = SettingsEncryption::new(&config.encryption)?;
    let manager = SecretsManager::builder(store, encryption)
        .with_registry(ProviderRegistry::builtin())
        .with_config(config.manager.clone())
        .with_feature_gate(Arc::new(StaticFeatureGate::new(config.feature_enabled)))
        .build();

    let mut events = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ManagerEvent::ProviderSettingsChanged { provider }) => {
                    info!(provider = %provider, "Provider settings changed");
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed provider change events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Err(e) = manager.init().await {
        error!(error = %e, "Failed to initialize external secrets manager");
        return Err(e.into());
    }

    info!(providers = ?manager.provider_names(), "External secrets manager running");

    signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    manager.shutdown().await;

    Ok(())
}
