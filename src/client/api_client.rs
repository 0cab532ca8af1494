//! Client REST du registre, utilisé par la console de revue et le formulaire.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::core::demande_service::{NewDemande, StatusUpdate};
use crate::core::user_service::AuthResponse;
use crate::domain::demande::{DemandeView, StatutCode, TransitionError};
use crate::domain::wizard::{FormWizard, WizardError};

const FALLBACK_MESSAGE: &str = "Une erreur est survenue, veuillez réessayer";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Refusé localement, aucune requête envoyée.
    #[error("{0}")]
    Validation(String),

    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    #[error("Erreur réseau: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<WizardError> for ClientError {
    fn from(error: WizardError) -> Self {
        ClientError::Validation(error.to_string())
    }
}

impl From<TransitionError> for ClientError {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::Incomplete(fields) => ClientError::Validation(format!(
                "Champs obligatoires manquants : {}",
                fields.iter().map(|f| f.label).collect::<Vec<_>>().join(", ")
            )),
            other => ClientError::Validation(other.to_string()),
        }
    }
}

/// Message d'erreur d'une réponse : champ `error`, sinon `message`, sinon un texte générique.
pub fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message"].iter().find_map(|key| {
                value
                    .get(*key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

#[derive(Clone)]
pub struct RegistreClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl RegistreClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn checked(&self, request: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body);
        tracing::debug!(status = status.as_u16(), %message, "Réponse d'erreur de l'API");
        Err(ClientError::Api { status: status.as_u16(), message })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        Ok(self.checked(request).await?.json::<T>().await?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let request = self
            .http
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }));
        self.send_json(request).await
    }

    pub async fn create_demande(&self, demande: &NewDemande) -> Result<DemandeView, ClientError> {
        self.send_json(self.http.post(self.url("/demandes")).json(demande)).await
    }

    pub async fn mes_demandes(&self) -> Result<Vec<DemandeView>, ClientError> {
        self.send_json(self.http.get(self.url("/demandes/mes-demandes"))).await
    }

    pub async fn list_demandes(&self, statut: Option<StatutCode>) -> Result<Vec<DemandeView>, ClientError> {
        let mut request = self.http.get(self.url("/demandes"));
        if let Some(statut) = statut {
            request = request.query(&[("statut", statut.as_str())]);
        }
        self.send_json(request).await
    }

    pub async fn get_demande(&self, id: Uuid) -> Result<DemandeView, ClientError> {
        self.send_json(self.http.get(self.url(&format!("/demandes/{}", id)))).await
    }

    pub async fn update_statut(&self, id: Uuid, update: &StatusUpdate) -> Result<DemandeView, ClientError> {
        let request = self
            .http
            .patch(self.url(&format!("/demandes/{}/statut", id)))
            .json(update);
        self.send_json(request).await
    }

    pub async fn update_donnees(&self, id: Uuid, donnees: &Value) -> Result<DemandeView, ClientError> {
        let request = self
            .http
            .patch(self.url(&format!("/demandes/{}/donnees", id)))
            .json(&json!({ "donnees": donnees }));
        self.send_json(request).await
    }

    pub async fn delete_demande(&self, id: Uuid) -> Result<(), ClientError> {
        self.checked(self.http.delete(self.url(&format!("/demandes/{}", id))))
            .await?;
        Ok(())
    }

    /// HTML de l'acte d'une demande acceptée.
    pub async fn acte_html(&self, id: Uuid) -> Result<String, ClientError> {
        let response = self
            .checked(self.http.get(self.url(&format!("/demandes/{}/acte", id))))
            .await?;
        Ok(response.text().await?)
    }
}

impl FormWizard {
    /// Valide toutes les étapes localement puis envoie la demande.
    /// Aucun nouvel essai en cas d'échec : le message de l'API est remonté tel quel.
    pub async fn submit(&self, client: &RegistreClient, guichet: bool) -> Result<DemandeView, ClientError> {
        let donnees = self.payload()?;
        let request = NewDemande {
            kind: self.kind(),
            donnees: donnees.to_value(),
            guichet,
        };

        match client.create_demande(&request).await {
            Ok(created) => Ok(created),
            Err(e) => {
                tracing::warn!(type_demande = %self.kind(), error = %e, "Échec de l'envoi de la demande");
                Err(e)
            }
        }
    }
}

pub(crate) fn is_conflict(error: &ClientError) -> bool {
    matches!(error, ClientError::Api { status, .. } if *status == StatusCode::CONFLICT.as_u16())
}
