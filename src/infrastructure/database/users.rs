use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, FromRow, Pool, Postgres};
use uuid::Uuid;

use super::UserStore;
use crate::domain::user::User;
use crate::infrastructure::error::{AppError, AppResult};

/// Repository pour les opérations sur les utilisateurs
#[derive(Clone)]
pub struct UserRepository {
    pool: Pool<Postgres>,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    nom: String,
    prenom: String,
    email: String,
    telephone: Option<String>,
    role: String,
    photo: Option<String>,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            nom: row.nom,
            prenom: row.prenom,
            email: row.email,
            telephone: row.telephone,
            role: row.role.parse().map_err(AppError::InternalError)?,
            photo: row.photo,
            password_hash: row.password_hash,
            created_at: row.created_at,
            updated_at: Some(row.updated_at),
        })
    }
}

const SELECT_USER: &str = r#"
    SELECT id, nom, prenom, email, telephone, role, photo, password_hash, created_at, updated_at
    FROM users
"#;

impl UserRepository {
    /// Crée une nouvelle instance du repository
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    /// Crée un nouvel utilisateur ; un email déjà utilisé donne `AppError::Conflict`
    /// (violation d'unicité 23505).
    async fn insert_user(&self, user: &User) -> AppResult<()> {
        query(
            r#"
            INSERT INTO users (
                id, nom, prenom, email, telephone, role, photo,
                password_hash, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id)
        .bind(&user.nom)
        .bind(&user.prenom)
        .bind(&user.email)
        .bind(&user.telephone)
        .bind(user.role.as_str())
        .bind(&user.photo)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at.unwrap_or(user.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("Email déjà utilisé".to_string()),
            other => other,
        })?;

        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        query_as::<_, UserRow>(&format!("{} WHERE id = $1", SELECT_USER))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        query_as::<_, UserRow>(&format!("{} WHERE email = $1", SELECT_USER))
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        query_as::<_, UserRow>(&format!("{} ORDER BY created_at DESC", SELECT_USER))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn update_user(&self, user: &User) -> AppResult<()> {
        let result = query(
            r#"
            UPDATE users
            SET nom = $2, prenom = $3, telephone = $4, role = $5, photo = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.nom)
        .bind(&user.prenom)
        .bind(&user.telephone)
        .bind(user.role.as_str())
        .bind(&user.photo)
        .bind(user.updated_at.unwrap_or_else(Utc::now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Utilisateur".to_string()));
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        let result = query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
