pub mod routes;

use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse, Responder};
use std::sync::Arc;

use crate::core::{DemandeService, NotificationService, UserService};
use crate::infrastructure::database::{DemandeStore, UserStore};
use crate::infrastructure::error::AppError;
use crate::utils::config::Config;
use crate::utils::ocr::{IdentityCardScanner, TextRecognizer};

/// État partagé entre les workers actix.
pub struct AppState {
    pub config: Config,
    pub demandes: Arc<DemandeService>,
    pub users: Arc<UserService>,
    pub scanner: Arc<IdentityCardScanner>,
}

impl AppState {
    pub fn new(config: Config, demandes: Arc<dyn DemandeStore>, users: Arc<dyn UserStore>) -> Self {
        let notifications = Arc::new(NotificationService::from_config(&config, users.clone()));
        Self::with_notifications(config, demandes, users, notifications)
    }

    pub fn with_notifications(
        config: Config,
        demandes: Arc<dyn DemandeStore>,
        users: Arc<dyn UserStore>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        let demande_service = DemandeService::new(
            demandes,
            notifications,
            config.public_url.clone(),
            config.jwt_secret.clone(),
        );
        let user_service = UserService::new(
            users,
            config.jwt_secret.clone(),
            config.jwt_access_token_expiry_hours,
        );

        let scanner = IdentityCardScanner::from_url(config.ocr_service_url.as_deref());

        Self {
            config,
            demandes: Arc::new(demande_service),
            users: Arc::new(user_service),
            scanner: Arc::new(scanner),
        }
    }

    /// Remplace le moteur de reconnaissance de texte.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.scanner = Arc::new(IdentityCardScanner::new(recognizer));
        self
    }
}

/// Corps JSON illisible : 400 avec le format d'erreur commun.
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Corps de requête invalide: {}", err)).into()
}

/// Configure toutes les routes de l'API
pub fn config(cfg: &mut web::ServiceConfig) {
    use routes::middleware::AuthMiddleware;

    cfg.app_data(web::JsonConfig::default().limit(8 * 1024 * 1024).error_handler(json_error_handler))
        // Routes publiques
        .service(web::resource("/health").route(web::get().to(health_check)))
        .service(routes::auth::register)
        .service(routes::auth::login)
        .service(routes::verification::verify)
        .service(routes::formulaires::get_schema)
        .service(routes::formulaires::validate_step)
        .service(routes::formulaires::nni)
        // Routes protégées par authentification
        .service(
            web::scope("/demandes")
                .wrap(AuthMiddleware)
                .service(routes::demandes::create)
                .service(routes::demandes::list_mine)
                .service(routes::demandes::statistics)
                .service(routes::demandes::list_all)
                .service(routes::demandes::acte)
                .service(routes::demandes::update_status)
                .service(routes::demandes::update_donnees)
                .service(routes::demandes::get_one)
                .service(routes::demandes::delete),
        )
        .service(
            web::scope("/users")
                .wrap(AuthMiddleware)
                .service(routes::users::me)
                .service(routes::users::update_me)
                .service(routes::users::list)
                .service(routes::users::update_role)
                .service(routes::users::delete),
        )
        .service(
            web::scope("/exports")
                .wrap(AuthMiddleware)
                .service(routes::exports::demandes)
                .service(routes::exports::utilisateurs),
        );
}

/// Endpoint de santé pour monitoring
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": state.config.run_mode,
    }))
}
