//! Session de l'utilisateur connecté côté client.
//!
//! [`SessionStore`] est la seule source de vérité : `login`, `update_profile`
//! et `logout` modifient la session, la persistent puis notifient les
//! abonnés (`subscribe`). La session est persistée en JSON sous la clé `user`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::core::user_service::AuthResponse;
use crate::domain::user::User;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Aucune session ouverte")]
    NotLoggedIn,
    #[error("Le profil ne correspond pas à l'utilisateur connecté")]
    UserMismatch,
    #[error("Erreur d'accès au fichier de session: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session illisible: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl From<AuthResponse> for Session {
    fn from(response: AuthResponse) -> Self {
        Self { token: response.token, user: response.user }
    }
}

pub trait SessionPersistence: Send + Sync {
    fn load(&self) -> Result<Option<Session>, SessionError>;
    fn save(&self, session: &Session) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

/// Session stockée dans un fichier JSON.
pub struct FileSessionPersistence {
    path: PathBuf,
}

impl FileSessionPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionPersistence for FileSessionPersistence {
    fn load(&self) -> Result<Option<Session>, SessionError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(session)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

pub struct SessionStore {
    sender: watch::Sender<Option<Session>>,
    persistence: Option<Arc<dyn SessionPersistence>>,
}

impl SessionStore {
    /// Session non persistée.
    pub fn in_memory() -> Self {
        Self { sender: watch::channel(None).0, persistence: None }
    }

    /// Restaure la session persistée ; une session illisible est ignorée.
    pub fn restore(persistence: Arc<dyn SessionPersistence>) -> Self {
        let initial = persistence.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Session persistée ignorée");
            None
        });
        Self {
            sender: watch::channel(initial).0,
            persistence: Some(persistence),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.sender.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.sender.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.sender.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.sender.subscribe()
    }

    pub fn login(&self, session: Session) -> Result<(), SessionError> {
        if let Some(persistence) = &self.persistence {
            persistence.save(&session)?;
        }
        tracing::debug!(user_id = %session.user.id, "Session ouverte");
        self.sender.send_replace(Some(session));
        Ok(())
    }

    /// Remplace le profil de l'utilisateur connecté (même identifiant).
    pub fn update_profile(&self, user: User) -> Result<(), SessionError> {
        let mut session = self.current().ok_or(SessionError::NotLoggedIn)?;
        if session.user.id != user.id {
            return Err(SessionError::UserMismatch);
        }
        session.user = user;

        if let Some(persistence) = &self.persistence {
            persistence.save(&session)?;
        }
        self.sender.send_replace(Some(session));
        Ok(())
    }

    pub fn logout(&self) -> Result<(), SessionError> {
        if let Some(persistence) = &self.persistence {
            persistence.clear()?;
        }
        self.sender.send_replace(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::{NewUser, Role};

    fn session() -> Session {
        let user = User::new(
            &NewUser {
                nom: "Ba".into(),
                prenom: "Oumar".into(),
                email: "oumar@example.mr".into(),
                telephone: None,
                password: "motdepasse".into(),
            },
            String::new(),
            Role::User,
        );
        Session { token: "jeton".into(), user }
    }

    #[test]
    fn test_persisted_under_user_key() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("session.json");
        let store = SessionStore::restore(Arc::new(FileSessionPersistence::new(&file)));
        store.login(session()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(raw["user"]["email"], "oumar@example.mr");
        assert_eq!(raw["token"], "jeton");

        let restored = SessionStore::restore(Arc::new(FileSessionPersistence::new(&file)));
        assert_eq!(restored.user().unwrap().email, "oumar@example.mr");

        restored.logout().unwrap();
        assert!(!file.exists());
        assert_eq!(restored.current(), None);
    }

    #[test]
    fn test_corrupt_file_starts_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("session.json");
        std::fs::write(&file, "{ pas du json").unwrap();

        let store = SessionStore::restore(Arc::new(FileSessionPersistence::new(&file)));
        assert_eq!(store.current(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_profile_updates() {
        let store = SessionStore::in_memory();
        let mut updates = store.subscribe();
        assert!(matches!(
            store.update_profile(session().user),
            Err(SessionError::NotLoggedIn)
        ));

        let session = session();
        store.login(session.clone()).unwrap();
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().as_ref().unwrap().token, "jeton");

        let mut user = session.user.clone();
        user.telephone = Some("22 00 11 22".into());
        store.update_profile(user).unwrap();
        updates.changed().await.unwrap();
        assert_eq!(
            updates.borrow_and_update().as_ref().unwrap().user.telephone.as_deref(),
            Some("22 00 11 22")
        );

        let mut stranger = session.user;
        stranger.id = uuid::Uuid::new_v4();
        assert!(matches!(store.update_profile(stranger), Err(SessionError::UserMismatch)));

        store.logout().unwrap();
        updates.changed().await.unwrap();
        assert!(updates.borrow().is_none());
    }
}
