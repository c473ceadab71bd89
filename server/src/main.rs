//! Serveur web de classification d'échographies.
//!
//! Lit sa configuration dans l'environnement (voir [`config::Config`]),
//! charge le checkpoint safetensors une seule fois au démarrage — échec
//! fatal: on ne sert jamais avec un modèle partiellement chargé — puis
//! expose le formulaire d'upload et l'endpoint de prédiction.
//!
//! ```bash
//! # Démarrage local (génère d'abord un checkpoint de démonstration)
//! cargo run --bin init_weights
//! cargo run --bin capsnet-server
//!
//! # Configuration personnalisée
//! CAPSNET_PORT=9090 \
//! CAPSNET_WEIGHTS=/srv/models/capsnet.safetensors \
//! CAPSNET_LOG_LEVEL=debug \
//!   cargo run --bin capsnet-server --release
//! ```

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use capsnet_model::{weights, NetworkConfig};

mod config;
mod error;
mod html;
mod routes;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        poids = %config.weights_path.display(),
        port = config.port,
        "démarrage du serveur"
    );

    let mut network_config = NetworkConfig::default();
    network_config.routing_iterations = config.routing_iterations;

    let model = weights::load_model(&config.weights_path, network_config).map_err(|e| {
        anyhow::anyhow!(
            "chargement du modèle impossible ({}): {e}",
            config.weights_path.display()
        )
    })?;

    info!(
        classes = ?model.config.class_names,
        capsules_primaires = model.config.num_primary_capsules(),
        iterations_routage = model.config.routing_iterations,
        "modèle chargé"
    );

    std::fs::create_dir_all(&config.static_dir)?;

    let addr = config.server_addr();
    let state = AppState::new(config, model);
    let router = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("à l'écoute sur http://{addr}");

    axum::serve(listener, router).await?;

    Ok(())
}
