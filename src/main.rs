use std::sync::Arc;

use actix_web::web::ServiceConfig;
use anyhow::Context;
use shuttle_actix_web::ShuttleActixWeb;
use shuttle_runtime::SecretStore;
use tracing::info;

use felicity::store::PgStore;
use felicity::{ai, configure, AppConfig, AppState};

#[shuttle_runtime::main]
async fn main(
    #[shuttle_runtime::Secrets] secrets: SecretStore,
) -> ShuttleActixWeb<impl FnOnce(&mut ServiceConfig) + Send + Clone + 'static> {
    let config = AppConfig::new(&secrets)?;

    let store = PgStore::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    store
        .migrate()
        .await
        .context("Failed to run database migrations")?;
    let store = Arc::new(store);

    let model = ai::from_config(&config.ai)?;
    info!(
        provider = ?config.ai.provider,
        model = %config.ai.model,
        production = config.is_production(),
        "Starting Felicity"
    );

    let state = Arc::new(AppState::new(
        config,
        store.clone(),
        store.clone(),
        store,
        model,
    ));

    Ok(configure(state).into())
}
