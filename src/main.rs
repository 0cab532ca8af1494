use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use etat_civil::api::{self, AppState};
use etat_civil::infrastructure::database::{Database, DemandeStore, InMemoryStore, UserStore};
use etat_civil::utils::config::{Config, StorageBackend};
use etat_civil::{AppError, AppResult, NAME, VERSION};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Le logging dépend de la configuration : une erreur ici ne peut être que renvoyée.
    let config = Config::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    // Initialisation du logging
    setup_tracing(&config.log_level, &config.log_format);
    info!("Démarrage de {} v{}", NAME, VERSION);
    info!(mode = %config.run_mode, "Configuration chargée");

    if !config.public_url_explicit {
        if config.is_production() {
            warn!(
                public_url = %config.public_url,
                "PUBLIC_URL non défini : les URL de vérification des actes reprennent FRONTEND_URL"
            );
        } else {
            info!(public_url = %config.public_url, "URL publique de vérification");
        }
    }

    let (demandes, users) = open_stores(&config).await.map_err(fatal)?;

    let state = web::Data::new(AppState::new(config.clone(), demandes, users));
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        state.users.ensure_admin(email, password).await.map_err(fatal)?;
        info!(%email, "Compte administrateur prêt");
    }

    let frontend_url = config.frontend_url.clone();
    let bind_address = format!("{}:{}", config.server_host, config.server_port);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(api::config)
    })
    .bind(&bind_address)?
    .workers(config.workers.max(1))
    .shutdown_timeout(10);

    info!("API disponible sur http://{}", bind_address);
    server.run().await
}

/// Ouvre le stockage choisi par `STORAGE_BACKEND`.
async fn open_stores(config: &Config) -> AppResult<(Arc<dyn DemandeStore>, Arc<dyn UserStore>)> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                AppError::ConfigurationError("DATABASE_URL manquant".to_string())
            })?;
            let db = Database::new(url, config.database_max_connections).await?;
            db.migrate()
                .await
                .map_err(|e| AppError::InternalError(format!("Migrations impossibles: {}", e)))?;
            info!("Migrations appliquées");

            Ok((Arc::new(db.demandes()), Arc::new(db.users())))
        }
        StorageBackend::Memory => {
            if config.is_production() {
                warn!("Stockage en mémoire en production : les données seront perdues au redémarrage");
            }
            let store = Arc::new(InMemoryStore::new());
            Ok((store.clone(), store))
        }
    }
}

fn fatal(e: AppError) -> std::io::Error {
    error!(error = %e, "Démarrage impossible");
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

/// Configure le tracing pour le logging structuré
fn setup_tracing(log_level: &str, log_format: &str) {
    let log_level = log_level.parse().unwrap_or(tracing::Level::INFO);

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(if log_format == "json" {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        } else {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_line_number(true)
                    .with_file(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        });

    subscriber.init();
}
