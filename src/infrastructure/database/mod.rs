pub mod demandes;
pub mod memory;
pub mod users;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Error as SqlxError, Pool, Postgres};
use tracing::info;
use uuid::Uuid;

use crate::domain::demande::{Demande, DemandeType, StatutCode};
use crate::domain::user::User;
use crate::infrastructure::error::AppResult;

pub use demandes::DemandesRepository;
pub use memory::InMemoryStore;
pub use users::UserRepository;

/// Gestion de la connexion à la base de données
#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    /// Crée une nouvelle connexion à la base de données
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, SqlxError> {
        info!("Connexion à la base de données PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Connexion établie avec succès");

        Ok(Self { pool })
    }

    /// Applique les migrations du dossier `migrations/`
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn demandes(&self) -> DemandesRepository {
        DemandesRepository::new(self.pool.clone())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }
}

/// Paramètres `limit` / `offset` d'une liste de demandes.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub const MAX_LIMIT: i64 = 1000;

    /// Applique la page au filtre ; sans `limit`, la limite du filtre est conservée.
    pub fn apply(&self, filter: DemandeFilter) -> DemandeFilter {
        DemandeFilter {
            limit: self.limit.unwrap_or(filter.limit).clamp(1, Self::MAX_LIMIT),
            offset: self.offset.unwrap_or(0).max(0),
            ..filter
        }
    }
}

/// Critères de recherche des demandes.
#[derive(Debug, Clone)]
pub struct DemandeFilter {
    pub statut: Option<StatutCode>,
    pub kind: Option<DemandeType>,
    pub user_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for DemandeFilter {
    fn default() -> Self {
        Self { statut: None, kind: None, user_id: None, limit: 100, offset: 0 }
    }
}

impl DemandeFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self { user_id: Some(user_id), limit: Pagination::MAX_LIMIT, ..Default::default() }
    }

    pub fn matches(&self, demande: &Demande) -> bool {
        self.statut.map_or(true, |s| demande.statut.code() == s)
            && self.kind.map_or(true, |k| demande.kind() == k)
            && self.user_id.map_or(true, |u| demande.user_id == Some(u))
    }
}

/// Nombre de demandes pour un couple (statut, type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCount {
    pub statut: StatutCode,
    pub kind: DemandeType,
    pub total: i64,
}

/// Persistance des demandes.
///
/// Les écritures sur une demande (`update_donnees`, `save_transition`) ne
/// s'appliquent que si la demande est encore `en_attente` en base : sinon
/// `AppError::Conflict`, ou `AppError::NotFound` si elle n'existe pas.
#[async_trait]
pub trait DemandeStore: Send + Sync {
    async fn insert_demande(&self, demande: &Demande) -> AppResult<()>;
    async fn get_demande(&self, id: Uuid) -> AppResult<Option<Demande>>;
    /// Demandes triées de la plus récente à la plus ancienne.
    async fn list_demandes(&self, filter: &DemandeFilter) -> AppResult<Vec<Demande>>;
    async fn update_donnees(&self, demande: &Demande) -> AppResult<()>;
    async fn save_transition(&self, demande: &Demande) -> AppResult<()>;
    /// Supprime la demande ; avec `only_pending`, uniquement si elle est en attente.
    async fn delete_demande(&self, id: Uuid, only_pending: bool) -> AppResult<bool>;
    async fn count_demandes(&self) -> AppResult<Vec<StatusCount>>;
}

/// Persistance des utilisateurs. L'email est unique (`AppError::Conflict`).
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> AppResult<()>;
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn list_users(&self) -> AppResult<Vec<User>>;
    async fn update_user(&self, user: &User) -> AppResult<()>;
    async fn delete_user(&self, id: Uuid) -> AppResult<bool>;
}
