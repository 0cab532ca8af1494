// utils/config.rs
use crate::infrastructure::error::{AppError, AppResult};
use dotenv::dotenv;
use std::env;
use std::str::FromStr;

/// Backend de persistance des demandes et des utilisateurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Environnement et serveur
    pub run_mode: String,
    pub server_host: String,
    pub server_port: u16,
    pub workers: usize,
    pub log_level: String,
    pub log_format: String,

    // Base de données
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Sécurité
    pub jwt_secret: String,
    pub jwt_access_token_expiry_hours: i64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,

    // URLs
    /// Base des URL de vérification imprimées sur les actes.
    pub public_url: String,
    /// `false` si `PUBLIC_URL` est absent et que `frontend_url` sert de base.
    pub public_url_explicit: bool,
    pub frontend_url: String,

    // Email
    pub email_provider: String,
    pub email_from: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub enable_email_notifications: bool,

    // Reconnaissance de la carte d'identité
    pub ocr_service_url: Option<String>,

    // Client
    pub poll_interval_seconds: u64,
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
    expected: &str,
) -> AppResult<T> {
    lookup(key)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse()
        .map_err(|_| AppError::ConfigurationError(format!("{} must be {}", key, expected)))
}

impl Config {
    /// Charger la configuration depuis les variables d'environnement
    pub fn from_env() -> AppResult<Self> {
        // Charger le fichier .env si présent
        let _ = dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construit la configuration à partir d'une source clé/valeur quelconque.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Variables requises
        let jwt_secret = non_empty("JWT_SECRET").ok_or_else(|| {
            AppError::ConfigurationError(
                "Variable d'environnement requise manquante: JWT_SECRET".to_string(),
            )
        })?;

        let storage_backend = match non_empty("STORAGE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(AppError::ConfigurationError(format!(
                    "STORAGE_BACKEND inconnu: {} (attendu: postgres | memory)",
                    other
                )))
            }
        };

        let database_url = non_empty("DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(AppError::ConfigurationError(
                "Variable d'environnement requise manquante: DATABASE_URL".to_string(),
            ));
        }

        let server_host = non_empty("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port: u16 = parse_or(&lookup, "SERVER_PORT", "8080", "a number")?;

        // La page de vérification est servie par l'interface web.
        let frontend_url = non_empty("FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();
        let explicit_public_url = non_empty("PUBLIC_URL");
        let public_url_explicit = explicit_public_url.is_some();
        let public_url = explicit_public_url
            .unwrap_or_else(|| frontend_url.clone())
            .trim_end_matches('/')
            .to_string();

        let config = Config {
            run_mode: non_empty("RUN_MODE").unwrap_or_else(|| "development".to_string()),
            server_host,
            server_port,
            workers: parse_or(&lookup, "WORKERS", "4", "a number")?,
            log_level: non_empty("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: non_empty("LOG_FORMAT").unwrap_or_else(|| "json".to_string()),

            storage_backend,
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", "10", "a number")?,

            jwt_secret,
            jwt_access_token_expiry_hours: parse_or(
                &lookup,
                "JWT_ACCESS_TOKEN_EXPIRY_HOURS",
                "12",
                "a number",
            )?,
            admin_email: non_empty("ADMIN_EMAIL"),
            admin_password: non_empty("ADMIN_PASSWORD"),

            public_url,
            public_url_explicit,
            frontend_url,

            email_provider: non_empty("EMAIL_PROVIDER").unwrap_or_else(|| "log".to_string()),
            email_from: non_empty("EMAIL_FROM")
                .unwrap_or_else(|| "etat-civil@localhost".to_string()),
            smtp_host: non_empty("SMTP_HOST"),
            smtp_port: parse_or(&lookup, "SMTP_PORT", "587", "a number")?,
            smtp_username: non_empty("SMTP_USERNAME"),
            smtp_password: non_empty("SMTP_PASSWORD"),
            enable_email_notifications: parse_or(
                &lookup,
                "ENABLE_EMAIL_NOTIFICATIONS",
                "true",
                "a boolean",
            )?,

            ocr_service_url: non_empty("OCR_SERVICE_URL"),

            poll_interval_seconds: parse_or(&lookup, "POLL_INTERVAL_SECONDS", "30", "a number")?,
        };

        Ok(config)
    }

    /// Vérifier si on est en production
    pub fn is_production(&self) -> bool {
        self.run_mode == "production"
    }

    /// Vérifier si on est en développement
    pub fn is_development(&self) -> bool {
        self.run_mode == "development"
    }

    /// Configuration minimale pour les tests (backend mémoire).
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::from_lookup(|key| match key {
            "JWT_SECRET" => Some("secret-de-test-suffisamment-long".to_string()),
            "STORAGE_BACKEND" => Some("memory".to_string()),
            "PUBLIC_URL" => Some("https://etat-civil.test".to_string()),
            _ => None,
        })
        .expect("configuration de test valide")
    }
}
