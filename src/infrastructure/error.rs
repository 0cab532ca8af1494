use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use validator::ValidationErrors;

use crate::domain::demande::TransitionError;
use crate::domain::wizard::{StepError, WizardError};
use crate::utils::ocr::OcrError;

/// Type de résultat standard pour l'application
pub type AppResult<T> = Result<T, AppError>;

/// Erreurs principales de l'application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Erreur d'authentification (401 Unauthorized)
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Permissions insuffisantes (403 Forbidden)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Ressource non trouvée (404 Not Found)
    #[error("{0} not found")]
    NotFound(String),

    /// Conflit de ressources (409 Conflict)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Données invalides (422 Unprocessable Entity)
    #[error("Validation failed: {0}")]
    ValidationError(ValidationErrors),

    /// Champs obligatoires manquants ou invalides (422 Unprocessable Entity)
    #[error("Incomplete: {message}")]
    Incomplete { message: String, fields: Vec<String> },

    /// Requête mal formée (400 Bad Request)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Service tiers indisponible (503 Service Unavailable)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Erreur interne du serveur (500 Internal Server Error)
    #[error("Internal server error: {0}")]
    InternalError(String),

    /// Erreur de base de données (500 Internal Server Error)
    #[error("Database error: {0}")]
    DatabaseError(#[source] SqlxError),

    /// Erreur de sérialisation/désérialisation (500 Internal Server Error)
    #[error("Serialization error: {0}")]
    SerializationError(#[source] serde_json::Error),

    /// Erreur de configuration (500 Internal Server Error)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AppError {
    /// Convertit l'erreur en code HTTP approprié
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ValidationError(_) | AppError::Incomplete { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::SerializationError(_)
            | AppError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convertit l'erreur en message utilisateur-friendly
    /// (à utiliser pour les réponses clients, pas pour le logging)
    pub fn user_friendly_message(&self) -> String {
        match self {
            AppError::Unauthorized(_) => {
                "Authentification échouée. Veuillez vérifier vos identifiants.".to_string()
            }
            AppError::Forbidden(_) => {
                "Vous n'avez pas les permissions nécessaires pour cette action.".to_string()
            }
            AppError::NotFound(resource) => format!("{} non trouvé(e)", resource),
            AppError::Conflict(message) => message.clone(),
            AppError::ValidationError(errors) => {
                let mut messages = Vec::new();
                for field_errors in errors.field_errors().values() {
                    for error in field_errors.iter() {
                        if let Some(msg) = error.message.as_ref() {
                            messages.push(msg.to_string());
                        }
                    }
                }
                if messages.is_empty() {
                    "Données invalides. Veuillez vérifier le format des champs.".to_string()
                } else {
                    messages.join("; ")
                }
            }
            AppError::Incomplete { message, .. } => message.clone(),
            AppError::BadRequest(message) => message.clone(),
            AppError::ServiceUnavailable(_) => {
                "Reconnaissance automatique indisponible. Veuillez saisir le NNI manuellement."
                    .to_string()
            }
            AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::SerializationError(_)
            | AppError::ConfigurationError(_) => {
                "Une erreur interne est survenue. Veuillez réessayer plus tard.".to_string()
            }
        }
    }

    fn details(&self) -> Option<Vec<String>> {
        match self {
            AppError::Incomplete { fields, .. } if !fields.is_empty() => Some(fields.clone()),
            AppError::ValidationError(errors) => {
                let mut fields: Vec<String> =
                    errors.field_errors().keys().map(|k| k.to_string()).collect();
                fields.sort();
                Some(fields)
            }
            _ => None,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "Erreur interne");
        }

        let error_response = ErrorResponse {
            error: self.user_friendly_message(),
            code: self.status_code().as_u16(),
            details: self.details(),
        };

        HttpResponse::build(self.status_code()).json(error_response)
    }
}

/// Structure de réponse d'erreur standardisée
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

// Implémentations From pour les conversions automatiques

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match &error {
            SqlxError::RowNotFound => AppError::NotFound("Ressource".to_string()),
            SqlxError::Database(db_error) => {
                if db_error.code().map(|code| code == "23505").unwrap_or(false) {
                    AppError::Conflict("Cette ressource existe déjà".to_string())
                } else {
                    AppError::DatabaseError(error)
                }
            }
            _ => AppError::DatabaseError(error),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::SerializationError(error)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::ValidationError(errors)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthorized(format!("Jeton invalide: {}", error))
    }
}

impl From<OcrError> for AppError {
    fn from(error: OcrError) -> Self {
        match error {
            OcrError::InvalidImage(message) => {
                AppError::BadRequest(format!("Image illisible: {}", message))
            }
            OcrError::Recognition(message) => AppError::ServiceUnavailable(message),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::AlreadyProcessed(statut) => AppError::Conflict(format!(
                "La demande a déjà été traitée (statut: {})",
                statut.as_str()
            )),
            TransitionError::Incomplete(fields) => AppError::Incomplete {
                message: "La demande est incomplète et ne peut pas être acceptée".to_string(),
                fields: fields.into_iter().map(|f| f.key.to_string()).collect(),
            },
            TransitionError::EmptyReason => AppError::BadRequest(
                "Le motif de rejet est obligatoire".to_string(),
            ),
            TransitionError::TypeChange => AppError::BadRequest(
                "Le type d'une demande ne peut pas être modifié".to_string(),
            ),
            TransitionError::InvalidData(message) => AppError::BadRequest(message),
        }
    }
}

impl From<StepError> for AppError {
    fn from(error: StepError) -> Self {
        let message = error.to_string();
        let fields = error
            .missing
            .iter()
            .chain(error.invalid.iter())
            .map(|f| f.key.to_string())
            .collect();
        AppError::Incomplete { message, fields }
    }
}

impl From<WizardError> for AppError {
    fn from(error: WizardError) -> Self {
        match error {
            WizardError::Step(step) => step.into(),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

// Helper functions pour créer des erreurs courantes
pub fn not_found<T: Into<String>>(resource: T) -> AppError {
    AppError::NotFound(resource.into())
}

pub fn forbidden<T: Into<String>>(message: T) -> AppError {
    AppError::Forbidden(message.into())
}
