use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mdr_core::config::{registration_state_from_env_value, resolve_registry_file};
use mdr_core::constants::{DEFAULT_LOCKED_STATE, DEFAULT_PUBLIC_STATE};
use mdr_core::{CoreConfig, RegistryService, TracingSink, YamlFileStore};

/// Main entry point for the metadata registry server
///
/// Loads the registry snapshot and serves the REST API (with Swagger UI at `/swagger-ui`).
///
/// # Environment Variables
/// - `MDR_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `MDR_REGISTRY_FILE`: registry snapshot file (default: "registry.yaml")
/// - `MDR_DEFAULT_LOCKED_STATE`: locked threshold for new authorities (default: "candidate")
/// - `MDR_DEFAULT_PUBLIC_STATE`: public threshold for new authorities (default: "recorded")
///
/// # Errors
/// Returns an error if:
/// - the logging configuration cannot be initialised,
/// - a configured registration state is not recognised,
/// - the registry snapshot cannot be read or parsed, or
/// - the server address cannot be bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mdr=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("MDR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let registry_file =
        resolve_registry_file(std::env::var_os("MDR_REGISTRY_FILE").map(Into::into));

    let cfg = Arc::new(CoreConfig::new(
        registry_file,
        registration_state_from_env_value(
            std::env::var("MDR_DEFAULT_LOCKED_STATE").ok(),
            DEFAULT_LOCKED_STATE,
        )?,
        registration_state_from_env_value(
            std::env::var("MDR_DEFAULT_PUBLIC_STATE").ok(),
            DEFAULT_PUBLIC_STATE,
        )?,
    )?);

    let store = Arc::new(YamlFileStore::new(cfg.registry_file()));
    let service = RegistryService::open(cfg.clone(), store, Arc::new(TracingSink))?;

    tracing::info!(
        registry = %cfg.registry_file().display(),
        "++ Starting MDR REST on {}",
        rest_addr
    );

    let app = api_rest::router(service);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
