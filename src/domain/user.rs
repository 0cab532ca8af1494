use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Rôle d'un utilisateur. Les agents et administrateurs forment le personnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Agent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }

    pub fn libelle(&self) -> &'static str {
        match self {
            Role::User => "Citoyen",
            Role::Agent => "Agent",
            Role::Admin => "Administrateur",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Agent | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "agent" => Ok(Role::Agent),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Rôle inconnu: {}", other)),
        }
    }
}

/// Représente un utilisateur du système
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub nom: String,
    pub prenom: String,
    /// Email de l'utilisateur (unique)
    pub email: String,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Photo de profil : data URL base64 ou URL
    #[serde(default)]
    pub photo: Option<String>,
    /// Hash du mot de passe (jamais exposé dans les APIs)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(with = "crate::utils::dates::flexible")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "crate::utils::dates::flexible_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(form: &NewUser, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            nom: form.nom.trim().to_string(),
            prenom: form.prenom.trim().to_string(),
            email: form.email.trim().to_lowercase(),
            telephone: form.telephone.clone().filter(|t| !t.trim().is_empty()),
            role,
            photo: None,
            password_hash,
            created_at: now,
            updated_at: Some(now),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.prenom, self.nom)
    }

    /// Applique une mise à jour de profil ; les champs absents restent inchangés.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(nom) = &update.nom {
            self.nom = nom.trim().to_string();
        }
        if let Some(prenom) = &update.prenom {
            self.prenom = prenom.trim().to_string();
        }
        if let Some(telephone) = &update.telephone {
            self.telephone = Some(telephone.trim().to_string()).filter(|t| !t.is_empty());
        }
        if let Some(photo) = &update.photo {
            self.photo = Some(photo.clone()).filter(|p| !p.is_empty());
        }
        self.updated_at = Some(Utc::now());
    }
}

/// Données requises pour créer un nouvel utilisateur
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, message = "Le nom est obligatoire"))]
    pub nom: String,
    #[validate(length(min = 1, message = "Le prénom est obligatoire"))]
    pub prenom: String,
    #[validate(email(message = "Format d'email invalide"))]
    pub email: String,
    #[serde(default)]
    pub telephone: Option<String>,
    #[validate(length(min = 8, message = "Le mot de passe doit contenir au moins 8 caractères"))]
    pub password: String,
}

/// Données pour la connexion d'un utilisateur
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(email(message = "Format d'email invalide"))]
    pub email: String,
    #[validate(length(min = 1, message = "Le mot de passe est obligatoire"))]
    pub password: String,
}

/// Mise à jour du profil par l'utilisateur lui-même
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Le nom ne peut pas être vide"))]
    pub nom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Le prénom ne peut pas être vide"))]
    pub prenom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

/// Changement de rôle par un administrateur
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub role: Role,
}

/// Utilisateur authentifié à l'origine d'une requête.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
