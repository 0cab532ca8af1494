// utils/security.rs
use crate::domain::user::Role;
use crate::infrastructure::error::{AppError, AppResult};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Claims JWT pour les tokens d'accès
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,        // User ID
    pub role: Role,       // Rôle au moment de l'émission
    pub exp: usize,       // Expiration timestamp
    pub iat: usize,       // Issued at timestamp
}

/// Générer un token d'accès JWT
pub fn generate_access_token(
    user_id: Uuid,
    role: Role,
    secret: &str,
    expiry_hours: i64,
) -> AppResult<String> {
    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::hours(expiry_hours);

    let claims = AccessTokenClaims {
        sub: user_id,
        role,
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalError(format!("Génération du jeton impossible: {}", e)))
}

/// Vérifier un token d'accès
pub fn verify_access_token(token: &str, secret: &str) -> AppResult<AccessTokenClaims> {
    let token_data = decode::<AccessTokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Générer un hash de mot de passe avec Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
        Argon2,
    };

    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalError(format!("Erreur de hashage: {}", e)))
}

/// Vérifier un mot de passe contre un hash
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    use argon2::{
        password_hash::{PasswordHash, PasswordVerifier},
        Argon2,
    };

    let argon2 = Argon2::default();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::InternalError(format!("Hash invalide: {}", e)))?;

    Ok(argon2.verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

/// Code de vérification imprimé sur l'acte : 10 caractères hexadécimaux
/// majuscules dérivés de l'identifiant de la demande et du secret serveur.
pub fn verification_code(demande_id: Uuid, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(demande_id.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(5)
        .map(|byte| format!("{:02X}", byte))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = generate_access_token(user_id, Role::Agent, "secret", 1).unwrap();
        let claims = verify_access_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Agent);

        assert!(verify_access_token(&token, "autre-secret").is_err());
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("motdepasse123").unwrap();
        assert!(verify_password("motdepasse123", &hash).unwrap());
        assert!(!verify_password("mauvais", &hash).unwrap());
    }

    #[test]
    fn test_verification_code_is_stable() {
        let id = Uuid::new_v4();
        let code = verification_code(id, "secret");
        assert_eq!(code.len(), 10);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(code, verification_code(id, "secret"));
        assert_ne!(code, verification_code(id, "autre"));
    }
}
