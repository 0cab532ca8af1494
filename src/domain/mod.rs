//! # Domain Models Module
//!
//! Entités métier du registre : demandes et leur automate de statut,
//! schémas de formulaire, actes délivrés et utilisateurs.
//!
//! ## Conventions
//! - JSON en camelCase, codes (`type`, `statut`, `role`) en minuscules
//! - Les champs sensibles sont exclus de la sérialisation JSON
//! - Les identifiants utilisent `uuid::Uuid`
//! - Les timestamps utilisent `chrono::DateTime<chrono::Utc>`

pub mod acte;
pub mod demande;
pub mod user;
pub mod wizard;

pub use acte::Acte;
pub use demande::{Demande, DemandeData, DemandeType, DemandeView, Statut, StatutCode, TransitionError};
pub use user::{Actor, Role, User};
pub use wizard::{FormSchema, FormWizard};
