// core/notification_service.rs
use std::sync::Arc;

use crate::domain::demande::{Demande, StatutCode};
use crate::infrastructure::database::UserStore;
use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::config::Config;

/// Envoie au demandeur un email quand sa demande est acceptée ou rejetée.
///
/// Un échec d'envoi est journalisé et n'interrompt jamais la décision.
pub struct NotificationService {
    email_provider: Arc<dyn EmailProvider>,
    users: Arc<dyn UserStore>,
    frontend_url: String,
    enabled: bool,
}

impl NotificationService {
    pub fn new(
        email_provider: Arc<dyn EmailProvider>,
        users: Arc<dyn UserStore>,
        frontend_url: String,
        enabled: bool,
    ) -> Self {
        Self {
            email_provider,
            users,
            frontend_url,
            enabled,
        }
    }

    pub fn from_config(config: &Config, users: Arc<dyn UserStore>) -> Self {
        Self::new(
            email_provider_from_config(config),
            users,
            config.frontend_url.clone(),
            config.enable_email_notifications,
        )
    }

    /// Notifie la décision prise sur une demande (sans effet pour une saisie au guichet).
    pub async fn notify_decision(&self, demande: &Demande) {
        if !self.enabled {
            return;
        }
        let Some(user_id) = demande.user_id else {
            return;
        };

        if let Err(e) = self.send_decision(user_id, demande).await {
            tracing::warn!(
                demande_id = %demande.id,
                user_id = %user_id,
                error = %e,
                "Notification de décision non envoyée"
            );
        }
    }

    async fn send_decision(&self, user_id: uuid::Uuid, demande: &Demande) -> AppResult<()> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Utilisateur".to_string()))?;

        let kind = demande.kind().libelle().to_lowercase();
        let subject = match demande.statut.code() {
            StatutCode::Acceptee => format!("Votre demande d'{} a été acceptée", kind),
            StatutCode::Rejetee => format!("Votre demande d'{} a été rejetée", kind),
            StatutCode::EnAttente => return Ok(()),
        };

        let decision = match demande.statut.motif() {
            Some(motif) => format!("Motif du rejet : {}", motif),
            None => format!(
                "Votre acte est disponible au téléchargement :\n{}/demandes/{}",
                self.frontend_url, demande.id
            ),
        };

        let body = format!(
            r#"Bonjour {},

{}.

Demande : {}
Concernant : {}

{}

Cordialement,
Le service de l'état civil"#,
            user.full_name(),
            subject,
            demande.id,
            demande.donnees.subject_name(),
            decision
        );

        self.email_provider.send(&user.email, &subject, &body).await
    }
}

// Traits pour les fournisseurs de notification
#[async_trait::async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

// Implémentation pour les logs (développement)
pub struct LogEmailProvider;

#[async_trait::async_trait]
impl EmailProvider for LogEmailProvider {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        tracing::info!(to, subject, body, "[EMAIL]");
        Ok(())
    }
}

/// Envoi SMTP (STARTTLS) via lettre.
#[cfg(feature = "email")]
pub struct SmtpEmailProvider {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    from: String,
}

#[cfg(feature = "email")]
impl SmtpEmailProvider {
    pub fn new(
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        from: String,
    ) -> Self {
        Self { host, port, username, password, from }
    }
}

#[cfg(feature = "email")]
#[async_trait::async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{Message, SmtpTransport, Transport};

        let email = Message::builder()
            .from(self.from.parse().map_err(|e| AppError::InternalError(format!("From invalide: {}", e)))?)
            .to(to.parse().map_err(|e| AppError::BadRequest(format!("Destinataire invalide: {}", e)))?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| AppError::InternalError(format!("Construction du message: {}", e)))?;

        let mut builder = SmtpTransport::starttls_relay(&self.host)
            .map_err(|e| AppError::InternalError(format!("Relais SMTP: {}", e)))?
            .port(self.port);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        let mailer = builder.build();

        // Le transport lettre est bloquant
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(format!("Tâche SMTP: {}", e)))?
            .map_err(|e| AppError::InternalError(format!("Envoi SMTP: {}", e)))?;

        Ok(())
    }
}

/// Choisit le fournisseur d'email selon `EMAIL_PROVIDER`.
pub fn email_provider_from_config(config: &Config) -> Arc<dyn EmailProvider> {
    match (config.email_provider.as_str(), &config.smtp_host) {
        #[cfg(feature = "email")]
        ("smtp", Some(host)) => Arc::new(SmtpEmailProvider::new(
            host.clone(),
            config.smtp_port,
            config.smtp_username.clone(),
            config.smtp_password.clone(),
            config.email_from.clone(),
        )),
        ("smtp", _) => {
            tracing::warn!("EMAIL_PROVIDER=smtp indisponible (SMTP_HOST ou feature `email` manquant), emails journalisés");
            Arc::new(LogEmailProvider)
        }
        _ => Arc::new(LogEmailProvider),
    }
}
