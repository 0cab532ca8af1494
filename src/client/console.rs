//! Console de revue des agents.
//!
//! Les gardes de l'automate de statut sont évaluées localement avant tout
//! appel réseau : une demande terminale n'expose aucune action, un rejet
//! sans motif et l'acceptation d'une demande incomplète sont refusés sans
//! requête. Le serveur applique les mêmes règles (409 / 422).

use serde_json::Value;

use super::api_client::{is_conflict, ClientError, RegistreClient};
use crate::core::demande_service::StatusUpdate;
use crate::domain::demande::{
    is_request_incomplete, Demande, DemandeData, DemandeView, RejectionReason, StatutCode,
    TransitionError,
};

/// Actions proposées pour une demande.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Actions {
    pub approve: bool,
    pub reject: bool,
    pub edit: bool,
    pub download_acte: bool,
}

impl Actions {
    pub fn for_view(view: &DemandeView) -> Self {
        let pending = view.is_pending();
        Self {
            approve: pending && !is_request_incomplete(view.kind, &view.donnees),
            reject: pending,
            edit: pending,
            download_acte: view.statut == StatutCode::Acceptee,
        }
    }
}

pub struct ReviewConsole {
    client: RegistreClient,
}

impl ReviewConsole {
    pub fn new(client: RegistreClient) -> Self {
        Self { client }
    }

    fn to_demande(view: &DemandeView) -> Result<Demande, ClientError> {
        Ok(Demande::try_from(view.clone())?)
    }

    fn reported(error: ClientError, view: &DemandeView) -> ClientError {
        if is_conflict(&error) {
            tracing::info!(demande_id = %view.id, "Demande déjà traitée par un autre agent");
        }
        error
    }

    /// `en_attente → acceptee`, seulement si la demande est complète.
    pub async fn approve(&self, view: &DemandeView) -> Result<DemandeView, ClientError> {
        let mut demande = Self::to_demande(view)?;
        demande.approve(None)?;

        let update = StatusUpdate { statut: StatutCode::Acceptee, motif_rejet: None };
        self.client
            .update_statut(view.id, &update)
            .await
            .map_err(|e| Self::reported(e, view))
    }

    /// `en_attente → rejetee` ; un motif vide est refusé avant l'envoi.
    pub async fn reject(&self, view: &DemandeView, motif: &str) -> Result<DemandeView, ClientError> {
        let motif = RejectionReason::new(motif)?;
        let mut demande = Self::to_demande(view)?;
        demande.reject(motif.as_str(), None)?;

        let update = StatusUpdate {
            statut: StatutCode::Rejetee,
            motif_rejet: Some(motif.into()),
        };
        self.client
            .update_statut(view.id, &update)
            .await
            .map_err(|e| Self::reported(e, view))
    }

    /// Remplace les données d'une demande en attente, sans changer son type.
    pub async fn edit(&self, view: &DemandeView, donnees: Value) -> Result<DemandeView, ClientError> {
        let mut demande = Self::to_demande(view)?;
        let donnees = DemandeData::from_parts(view.kind, donnees)
            .map_err(|e| TransitionError::InvalidData(e.to_string()))?;
        demande.edit(donnees)?;

        self.client
            .update_donnees(view.id, &demande.donnees.to_value())
            .await
            .map_err(|e| Self::reported(e, view))
    }

    /// HTML de l'acte, disponible une fois la demande acceptée.
    pub async fn download_acte(&self, view: &DemandeView) -> Result<String, ClientError> {
        if view.statut != StatutCode::Acceptee {
            return Err(ClientError::Validation(
                "L'acte n'est disponible que pour une demande acceptée".to_string(),
            ));
        }
        self.client.acte_html(view.id).await
    }
}
