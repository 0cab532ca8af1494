// core/user_service.rs
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::domain::user::{Actor, LoginForm, NewUser, ProfileUpdate, Role, User};
use crate::infrastructure::database::UserStore;
use crate::infrastructure::error::{forbidden, not_found, AppError, AppResult};
use crate::utils::security::{generate_access_token, hash_password, verify_password};

/// Réponse d'authentification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub token_type: String,
    /// Durée de validité en secondes
    pub expires_in: i64,
    pub user: User,
}

pub struct UserService {
    users: Arc<dyn UserStore>,
    jwt_secret: String,
    expiry_hours: i64,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, jwt_secret: String, expiry_hours: i64) -> Self {
        Self {
            users,
            jwt_secret,
            expiry_hours,
        }
    }

    fn auth_response(&self, user: User) -> AppResult<AuthResponse> {
        let token = generate_access_token(user.id, user.role, &self.jwt_secret, self.expiry_hours)?;
        Ok(AuthResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.expiry_hours * 3600,
            user,
        })
    }

    /// Inscription d'un citoyen
    pub async fn register(&self, form: NewUser) -> AppResult<AuthResponse> {
        form.validate()?;

        let hash = hash_password(&form.password)?;
        let user = User::new(&form, hash, Role::User);
        self.users.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "Nouvel utilisateur inscrit");
        self.auth_response(user)
    }

    /// Authentification email/mot de passe
    pub async fn login(&self, form: LoginForm) -> AppResult<AuthResponse> {
        form.validate()?;

        let invalid = || AppError::Unauthorized("Identifiants invalides".to_string());
        let user = self
            .users
            .find_user_by_email(&form.email)
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&form.password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "Échec de connexion");
            return Err(invalid());
        }

        self.auth_response(user)
    }

    pub async fn me(&self, actor: &Actor) -> AppResult<User> {
        self.users
            .get_user(actor.id)
            .await?
            .ok_or_else(|| not_found("Utilisateur"))
    }

    pub async fn update_me(&self, actor: &Actor, update: ProfileUpdate) -> AppResult<User> {
        update.validate()?;

        let mut user = self.me(actor).await?;
        user.apply(&update);
        self.users.update_user(&user).await?;
        Ok(user)
    }

    pub async fn list(&self, actor: &Actor) -> AppResult<Vec<User>> {
        Self::ensure_admin_actor(actor)?;
        self.users.list_users().await
    }

    /// Annuaire pour les exports (agents et administrateurs).
    pub async fn directory(&self, actor: &Actor) -> AppResult<Vec<User>> {
        if !actor.is_staff() {
            return Err(forbidden("Réservé aux agents"));
        }
        self.users.list_users().await
    }

    pub async fn update_role(&self, actor: &Actor, id: Uuid, role: Role) -> AppResult<User> {
        Self::ensure_admin_actor(actor)?;
        if actor.id == id {
            return Err(AppError::BadRequest(
                "Un administrateur ne peut pas modifier son propre rôle".to_string(),
            ));
        }

        let mut user = self
            .users
            .get_user(id)
            .await?
            .ok_or_else(|| not_found("Utilisateur"))?;
        user.role = role;
        user.updated_at = Some(chrono::Utc::now());
        self.users.update_user(&user).await?;

        tracing::info!(user_id = %id, role = %role, admin_id = %actor.id, "Rôle modifié");
        Ok(user)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        Self::ensure_admin_actor(actor)?;
        if actor.id == id {
            return Err(AppError::BadRequest(
                "Un administrateur ne peut pas supprimer son propre compte".to_string(),
            ));
        }
        if !self.users.delete_user(id).await? {
            return Err(not_found("Utilisateur"));
        }

        tracing::info!(user_id = %id, admin_id = %actor.id, "Utilisateur supprimé");
        Ok(())
    }

    fn ensure_admin_actor(actor: &Actor) -> AppResult<()> {
        if actor.is_admin() {
            Ok(())
        } else {
            Err(forbidden("Réservé aux administrateurs"))
        }
    }

    /// Crée le compte administrateur initial s'il n'existe pas encore.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> AppResult<()> {
        if let Some(mut existing) = self.users.find_user_by_email(email).await? {
            if existing.role != Role::Admin {
                existing.role = Role::Admin;
                self.users.update_user(&existing).await?;
                tracing::info!(user_id = %existing.id, "Compte promu administrateur");
            }
            return Ok(());
        }

        let form = NewUser {
            nom: "Administrateur".to_string(),
            prenom: "Registre".to_string(),
            email: email.to_string(),
            telephone: None,
            password: password.to_string(),
        };
        form.validate()?;
        let user = User::new(&form, hash_password(password)?, Role::Admin);
        self.users.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "Compte administrateur créé");
        Ok(())
    }
}
