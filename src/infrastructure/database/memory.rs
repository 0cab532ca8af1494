//! Stockage en mémoire (mode développement et tests).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DemandeFilter, DemandeStore, StatusCount, UserStore};
use crate::domain::demande::Demande;
use crate::domain::user::User;
use crate::infrastructure::error::{AppError, AppResult};

#[derive(Default)]
pub struct InMemoryStore {
    demandes: RwLock<HashMap<Uuid, Demande>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ensure_pending(stored: &Demande) -> AppResult<()> {
    if stored.is_pending() {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "La demande a déjà été traitée (statut: {})",
            stored.statut.code()
        )))
    }
}

#[async_trait]
impl DemandeStore for InMemoryStore {
    async fn insert_demande(&self, demande: &Demande) -> AppResult<()> {
        let mut demandes = self.demandes.write().await;
        if demandes.contains_key(&demande.id) {
            return Err(AppError::Conflict("Cette ressource existe déjà".to_string()));
        }
        demandes.insert(demande.id, demande.clone());
        Ok(())
    }

    async fn get_demande(&self, id: Uuid) -> AppResult<Option<Demande>> {
        Ok(self.demandes.read().await.get(&id).cloned())
    }

    async fn list_demandes(&self, filter: &DemandeFilter) -> AppResult<Vec<Demande>> {
        let demandes = self.demandes.read().await;
        let mut found: Vec<Demande> = demandes.values().filter(|d| filter.matches(d)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(found
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn update_donnees(&self, demande: &Demande) -> AppResult<()> {
        let mut demandes = self.demandes.write().await;
        let stored = demandes
            .get_mut(&demande.id)
            .ok_or_else(|| AppError::NotFound("Demande".to_string()))?;
        ensure_pending(stored)?;
        if stored.kind() != demande.kind() {
            return Err(AppError::Conflict("Le type de la demande a changé".to_string()));
        }
        stored.donnees = demande.donnees.clone();
        stored.updated_at = demande.updated_at;
        Ok(())
    }

    async fn save_transition(&self, demande: &Demande) -> AppResult<()> {
        let mut demandes = self.demandes.write().await;
        let stored = demandes
            .get_mut(&demande.id)
            .ok_or_else(|| AppError::NotFound("Demande".to_string()))?;
        ensure_pending(stored)?;
        stored.statut = demande.statut.clone();
        stored.updated_at = demande.updated_at;
        Ok(())
    }

    async fn delete_demande(&self, id: Uuid, only_pending: bool) -> AppResult<bool> {
        let mut demandes = self.demandes.write().await;
        match demandes.get(&id) {
            Some(stored) if !only_pending || stored.is_pending() => {
                demandes.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_demandes(&self) -> AppResult<Vec<StatusCount>> {
        let mut counts: HashMap<_, i64> = HashMap::new();
        for demande in self.demandes.read().await.values() {
            *counts.entry((demande.statut.code(), demande.kind())).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((statut, kind), total)| StatusCount { statut, kind, total })
            .collect())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: &User) -> AppResult<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("Email déjà utilisé".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.trim().to_lowercase();
        Ok(self.users.read().await.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn update_user(&self, user: &User) -> AppResult<()> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(stored) => {
                *stored = User { password_hash: stored.password_hash.clone(), ..user.clone() };
                Ok(())
            }
            None => Err(AppError::NotFound("Utilisateur".to_string())),
        }
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}
