// core/demande_service.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::notification_service::NotificationService;
use crate::domain::acte::Acte;
use crate::domain::demande::{Demande, DemandeData, DemandeType, StatutCode};
use crate::domain::user::Actor;
use crate::domain::wizard;
use crate::infrastructure::database::{DemandeFilter, DemandeStore, Pagination};
use crate::infrastructure::error::{forbidden, not_found, AppError, AppResult};
use crate::utils::security::verification_code;

/// Création d'une demande.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDemande {
    #[serde(rename = "type")]
    pub kind: DemandeType,
    #[serde(default)]
    pub donnees: Value,
    /// Saisie au guichet par un agent : la demande n'a pas de citoyen propriétaire.
    #[serde(default)]
    pub guichet: bool,
}

/// Changement de statut demandé par un agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub statut: StatutCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motif_rejet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistiques {
    pub total: i64,
    pub par_statut: BTreeMap<&'static str, i64>,
    pub par_type: BTreeMap<&'static str, i64>,
}

/// Réponse publique de vérification d'un acte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: DemandeType,
    pub libelle: String,
    pub statut: StatutCode,
    pub sujet: String,
    #[serde(with = "crate::utils::dates::flexible")]
    pub date_traitement: DateTime<Utc>,
    pub code_verification: String,
}

/// Cycle de vie des demandes : création, revue, édition, délivrance de l'acte.
pub struct DemandeService {
    store: Arc<dyn DemandeStore>,
    notifications: Arc<NotificationService>,
    public_url: String,
    jwt_secret: String,
}

impl DemandeService {
    pub fn new(
        store: Arc<dyn DemandeStore>,
        notifications: Arc<NotificationService>,
        public_url: String,
        jwt_secret: String,
    ) -> Self {
        Self {
            store,
            notifications,
            public_url,
            jwt_secret,
        }
    }

    /// Valide toutes les étapes du formulaire puis construit les données normalisées.
    fn build_donnees(kind: DemandeType, donnees: Value) -> AppResult<DemandeData> {
        let values = match donnees {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(AppError::BadRequest("`donnees` doit être un objet".to_string())),
        };
        wizard::validate_all(kind, &values)?;
        let normalized = wizard::normalize_values(kind, &values);
        DemandeData::from_parts(kind, Value::Object(normalized))
            .map_err(|e| AppError::BadRequest(format!("Données de demande invalides: {}", e)))
    }

    async fn load(&self, id: Uuid) -> AppResult<Demande> {
        self.store
            .get_demande(id)
            .await?
            .ok_or_else(|| not_found("Demande"))
    }

    fn ensure_staff(actor: &Actor) -> AppResult<()> {
        if actor.is_staff() {
            Ok(())
        } else {
            Err(forbidden("Réservé aux agents"))
        }
    }

    fn ensure_can_read(actor: &Actor, demande: &Demande) -> AppResult<()> {
        if actor.is_staff() || demande.user_id == Some(actor.id) {
            Ok(())
        } else {
            Err(forbidden("Cette demande ne vous appartient pas"))
        }
    }

    pub async fn submit(&self, actor: &Actor, request: NewDemande) -> AppResult<Demande> {
        if request.guichet && !actor.is_staff() {
            return Err(forbidden("Seuls les agents peuvent saisir une demande au guichet"));
        }

        let donnees = Self::build_donnees(request.kind, request.donnees)?;
        let demande = if request.guichet {
            Demande::new(donnees, None, Some(actor.id))
        } else {
            Demande::new(donnees, Some(actor.id), None)
        };
        self.store.insert_demande(&demande).await?;

        tracing::info!(
            demande_id = %demande.id,
            type_demande = %demande.kind(),
            guichet = request.guichet,
            "Demande créée"
        );
        Ok(demande)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> AppResult<Demande> {
        let demande = self.load(id).await?;
        Self::ensure_can_read(actor, &demande)?;
        Ok(demande)
    }

    pub async fn list_mine(&self, actor: &Actor, page: Pagination) -> AppResult<Vec<Demande>> {
        self.store
            .list_demandes(&page.apply(DemandeFilter::for_user(actor.id)))
            .await
    }

    pub async fn list_all(&self, actor: &Actor, filter: &DemandeFilter) -> AppResult<Vec<Demande>> {
        Self::ensure_staff(actor)?;
        self.store.list_demandes(filter).await
    }

    pub async fn approve(&self, actor: &Actor, id: Uuid) -> AppResult<Demande> {
        Self::ensure_staff(actor)?;
        let mut demande = self.load(id).await?;
        demande.approve(Some(actor.id))?;
        self.commit_transition(&demande).await?;
        Ok(demande)
    }

    pub async fn reject(&self, actor: &Actor, id: Uuid, motif: &str) -> AppResult<Demande> {
        Self::ensure_staff(actor)?;
        let mut demande = self.load(id).await?;
        demande.reject(motif, Some(actor.id))?;
        self.commit_transition(&demande).await?;
        Ok(demande)
    }

    /// `PATCH /demandes/{id}/statut` : seules les transitions sortantes de `en_attente` existent.
    pub async fn update_status(&self, actor: &Actor, id: Uuid, update: StatusUpdate) -> AppResult<Demande> {
        match update.statut {
            StatutCode::Acceptee => self.approve(actor, id).await,
            StatutCode::Rejetee => {
                self.reject(actor, id, update.motif_rejet.as_deref().unwrap_or_default())
                    .await
            }
            StatutCode::EnAttente => Err(AppError::BadRequest(
                "Une demande ne peut pas être remise en attente".to_string(),
            )),
        }
    }

    async fn commit_transition(&self, demande: &Demande) -> AppResult<()> {
        self.store.save_transition(demande).await?;
        tracing::info!(
            demande_id = %demande.id,
            statut = %demande.statut.code(),
            agent_id = ?demande.statut.traitement().and_then(|t| t.agent_id),
            "Statut de la demande mis à jour"
        );
        self.notifications.notify_decision(demande).await;
        Ok(())
    }

    /// Remplace les données d'une demande en attente (propriétaire ou personnel).
    /// Les champs peuvent rester incomplets (l'agent complète avant d'accepter),
    /// mais chaque champ renseigné doit avoir un format valide.
    pub async fn edit(&self, actor: &Actor, id: Uuid, donnees: Value) -> AppResult<Demande> {
        let mut demande = self.load(id).await?;
        Self::ensure_can_read(actor, &demande)?;

        let values = match donnees {
            Value::Object(map) => map,
            _ => return Err(AppError::BadRequest("`donnees` doit être un objet".to_string())),
        };
        let kind = demande.kind();
        wizard::validate_formats(kind, &values)?;
        let normalized = wizard::normalize_values(kind, &values);
        let donnees = DemandeData::from_parts(kind, Value::Object(normalized))
            .map_err(|e| AppError::BadRequest(format!("Données de demande invalides: {}", e)))?;

        demande.edit(donnees)?;
        self.store.update_donnees(&demande).await?;
        tracing::info!(demande_id = %demande.id, user_id = %actor.id, "Données de la demande modifiées");
        Ok(demande)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        if actor.is_admin() {
            if !self.store.delete_demande(id, false).await? {
                return Err(not_found("Demande"));
            }
        } else {
            let demande = self.load(id).await?;
            if demande.user_id != Some(actor.id) {
                return Err(forbidden("Seul le demandeur ou un administrateur peut supprimer"));
            }
            if !self.store.delete_demande(id, true).await? {
                return Err(AppError::Conflict(
                    "Seule une demande en attente peut être supprimée".to_string(),
                ));
            }
        }

        tracing::info!(demande_id = %id, user_id = %actor.id, "Demande supprimée");
        Ok(())
    }

    pub async fn statistics(&self, actor: &Actor) -> AppResult<Statistiques> {
        Self::ensure_staff(actor)?;

        let mut par_statut: BTreeMap<&'static str, i64> =
            StatutCode::ALL.iter().map(|s| (s.as_str(), 0)).collect();
        let mut par_type: BTreeMap<&'static str, i64> =
            DemandeType::ALL.iter().map(|k| (k.as_str(), 0)).collect();
        let mut total = 0;

        for count in self.store.count_demandes().await? {
            *par_statut.entry(count.statut.as_str()).or_default() += count.total;
            *par_type.entry(count.kind.as_str()).or_default() += count.total;
            total += count.total;
        }

        Ok(Statistiques { total, par_statut, par_type })
    }

    /// Acte d'une demande acceptée, pour le demandeur ou le personnel.
    pub async fn acte(&self, actor: &Actor, id: Uuid) -> AppResult<Acte> {
        let demande = self.get(actor, id).await?;
        if demande.statut.code() != StatutCode::Acceptee {
            return Err(AppError::Conflict(
                "L'acte n'est disponible que pour une demande acceptée".to_string(),
            ));
        }
        let code = verification_code(demande.id, &self.jwt_secret);
        Ok(Acte::from_demande(&demande, &self.public_url, code)?)
    }

    /// Vérification publique d'un acte : seules les demandes acceptées existent ici.
    pub async fn verify(&self, id: Uuid) -> AppResult<Verification> {
        let demande = self
            .store
            .get_demande(id)
            .await?
            .filter(|d| d.statut.code() == StatutCode::Acceptee)
            .ok_or_else(|| not_found("Acte"))?;
        let traitement = demande.statut.traitement().ok_or_else(|| not_found("Acte"))?;

        Ok(Verification {
            id: demande.id,
            kind: demande.kind(),
            libelle: demande.kind().libelle().to_string(),
            statut: demande.statut.code(),
            sujet: demande.donnees.subject_name(),
            date_traitement: traitement.date,
            code_verification: verification_code(demande.id, &self.jwt_secret),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notification_service::tests::RecordingEmailProvider;
    use crate::domain::demande::tests::complete_birth;
    use crate::domain::user::{NewUser, Role, User};
    use crate::infrastructure::database::{InMemoryStore, UserStore};
    use serde_json::json;

    struct Fixture {
        service: DemandeService,
        store: Arc<InMemoryStore>,
        emails: Arc<RecordingEmailProvider>,
        citizen: Actor,
        agent: Actor,
        admin: Actor,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let user = User::new(
            &NewUser {
                nom: "Ba".into(),
                prenom: "Oumar".into(),
                email: "oumar@example.mr".into(),
                telephone: None,
                password: "motdepasse".into(),
            },
            "hash".into(),
            Role::User,
        );
        store.insert_user(&user).await.unwrap();

        let emails = Arc::new(RecordingEmailProvider::default());
        let notifications = Arc::new(NotificationService::new(
            emails.clone(),
            store.clone(),
            "https://registre.mr".into(),
            true,
        ));
        let service = DemandeService::new(
            store.clone(),
            notifications,
            "https://etat-civil.test".into(),
            "secret".into(),
        );

        Fixture {
            service,
            store,
            emails,
            citizen: Actor { id: user.id, role: Role::User },
            agent: Actor { id: Uuid::new_v4(), role: Role::Agent },
            admin: Actor { id: Uuid::new_v4(), role: Role::Admin },
        }
    }

    fn birth_request() -> NewDemande {
        NewDemande {
            kind: DemandeType::Naissance,
            donnees: complete_birth().to_value(),
            guichet: false,
        }
    }

    #[tokio::test]
    async fn test_submit_normalizes_and_sets_owner() {
        let f = fixture().await;
        let mut request = birth_request();
        request.donnees["nomEnfant"] = json!("BA");
        request.donnees["professionPere"] = json!("eleve");

        let demande = f.service.submit(&f.citizen, request).await.unwrap();
        assert_eq!(demande.user_id, Some(f.citizen.id));
        assert_eq!(demande.donnees.field("nomEnfant"), "Ba");
        assert_eq!(demande.donnees.field("professionPere"), "Élève");
        assert!(demande.is_pending());
    }

    #[tokio::test]
    async fn test_submit_revalidates_steps() {
        let f = fixture().await;
        let mut request = birth_request();
        request.donnees["nomEnfant"] = json!("   ");

        match f.service.submit(&f.citizen, request).await {
            Err(AppError::Incomplete { fields, .. }) => assert_eq!(fields, vec!["nomEnfant"]),
            other => panic!("résultat inattendu: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_guichet_reserved_to_staff() {
        let f = fixture().await;
        let mut request = birth_request();
        request.guichet = true;

        let refused = f.service.submit(&f.citizen, request.clone()).await;
        assert!(matches!(refused, Err(AppError::Forbidden(_))));

        let demande = f.service.submit(&f.agent, request).await.unwrap();
        assert_eq!(demande.user_id, None);
        assert_eq!(demande.agent_id, Some(f.agent.id));
    }

    #[tokio::test]
    async fn test_approve_then_second_decision_conflicts() {
        let f = fixture().await;
        let demande = f.service.submit(&f.citizen, birth_request()).await.unwrap();

        let approved = f.service.approve(&f.agent, demande.id).await.unwrap();
        assert_eq!(approved.statut.code(), StatutCode::Acceptee);

        let again = f.service.reject(&f.agent, demande.id, "Doublon").await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let stored = f.store.get_demande(demande.id).await.unwrap().unwrap();
        assert_eq!(stored.statut.code(), StatutCode::Acceptee);
        assert_eq!(f.emails.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_citizen_cannot_review() {
        let f = fixture().await;
        let demande = f.service.submit(&f.citizen, birth_request()).await.unwrap();
        let result = f.service.approve(&f.citizen, demande.id).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_incomplete_edit_blocks_approval() {
        let f = fixture().await;
        let demande = f.service.submit(&f.citizen, birth_request()).await.unwrap();

        let mut donnees = demande.donnees.to_value();
        donnees["nomEnfant"] = json!("");
        f.service.edit(&f.agent, demande.id, donnees).await.unwrap();

        let result = f.service.approve(&f.agent, demande.id).await;
        assert!(matches!(result, Err(AppError::Incomplete { .. })));
    }

    #[tokio::test]
    async fn test_edit_rejects_malformed_values() {
        let f = fixture().await;
        let demande = f.service.submit(&f.citizen, birth_request()).await.unwrap();

        let mut donnees = demande.donnees.to_value();
        donnees["sexe"] = json!("X");
        donnees["dateNaissance"] = json!("demain");
        match f.service.edit(&f.agent, demande.id, donnees).await {
            Err(AppError::Incomplete { fields, .. }) => {
                assert_eq!(fields, vec!["sexe", "dateNaissance"])
            }
            other => panic!("résultat inattendu: {:?}", other),
        }

        let mut donnees = demande.donnees.to_value();
        donnees["nniDeclarant"] = json!("abc");
        match f.service.edit(&f.citizen, demande.id, donnees).await {
            Err(AppError::Incomplete { fields, .. }) => assert_eq!(fields, vec!["nniDeclarant"]),
            other => panic!("résultat inattendu: {:?}", other),
        }

        let stored = f.store.get_demande(demande.id).await.unwrap().unwrap();
        assert_eq!(stored.donnees.field("sexe"), "M");
        assert_eq!(stored.donnees.field("dateNaissance"), "2024-01-15");
        assert_eq!(stored.donnees.field("nniDeclarant"), "");
    }

    #[tokio::test]
    async fn test_update_status_rules() {
        let f = fixture().await;
        let demande = f.service.submit(&f.citizen, birth_request()).await.unwrap();

        let back = StatusUpdate { statut: StatutCode::EnAttente, motif_rejet: None };
        assert!(matches!(
            f.service.update_status(&f.agent, demande.id, back).await,
            Err(AppError::BadRequest(_))
        ));

        let no_reason = StatusUpdate { statut: StatutCode::Rejetee, motif_rejet: Some(" ".into()) };
        assert!(matches!(
            f.service.update_status(&f.agent, demande.id, no_reason).await,
            Err(AppError::BadRequest(_))
        ));

        let rejet = StatusUpdate {
            statut: StatutCode::Rejetee,
            motif_rejet: Some("Pièce illisible".into()),
        };
        let rejected = f.service.update_status(&f.agent, demande.id, rejet).await.unwrap();
        assert_eq!(rejected.statut.motif(), Some("Pièce illisible"));
    }

    #[tokio::test]
    async fn test_owner_deletes_only_pending() {
        let f = fixture().await;
        let pending = f.service.submit(&f.citizen, birth_request()).await.unwrap();
        let decided = f.service.submit(&f.citizen, birth_request()).await.unwrap();
        f.service.approve(&f.agent, decided.id).await.unwrap();

        f.service.delete(&f.citizen, pending.id).await.unwrap();
        assert!(matches!(
            f.service.delete(&f.citizen, decided.id).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            f.service.delete(&f.agent, decided.id).await,
            Err(AppError::Forbidden(_))
        ));
        f.service.delete(&f.admin, decided.id).await.unwrap();
        assert!(matches!(
            f.service.delete(&f.admin, decided.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_other_citizen_cannot_read() {
        let f = fixture().await;
        let demande = f.service.submit(&f.citizen, birth_request()).await.unwrap();
        let stranger = Actor { id: Uuid::new_v4(), role: Role::User };
        assert!(matches!(
            f.service.get(&stranger, demande.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(f.service.list_mine(&stranger, Pagination::default()).await.unwrap().is_empty());
        assert_eq!(f.service.list_mine(&f.citizen, Pagination::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_acte_and_public_verification() {
        let f = fixture().await;
        let demande = f.service.submit(&f.citizen, birth_request()).await.unwrap();

        assert!(matches!(
            f.service.acte(&f.citizen, demande.id).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(f.service.verify(demande.id).await, Err(AppError::NotFound(_))));

        f.service.approve(&f.agent, demande.id).await.unwrap();
        let acte = f.service.acte(&f.citizen, demande.id).await.unwrap();
        assert_eq!(
            acte.verification_url,
            format!("https://etat-civil.test/verification/{}", demande.id)
        );

        let verification = f.service.verify(demande.id).await.unwrap();
        assert_eq!(verification.sujet, "Oumar Ba");
        assert_eq!(verification.code_verification, acte.code_verification);
    }

    #[tokio::test]
    async fn test_statistics() {
        let f = fixture().await;
        let first = f.service.submit(&f.citizen, birth_request()).await.unwrap();
        f.service.submit(&f.citizen, birth_request()).await.unwrap();
        f.service.reject(&f.agent, first.id, "Doublon").await.unwrap();

        let stats = f.service.statistics(&f.agent).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.par_statut["rejetee"], 1);
        assert_eq!(stats.par_statut["en_attente"], 1);
        assert_eq!(stats.par_statut["acceptee"], 0);
        assert_eq!(stats.par_type["naissance"], 2);
        assert!(f.service.statistics(&f.citizen).await.is_err());
    }
}
