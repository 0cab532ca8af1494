// core/mod.rs
pub mod demande_service;
pub mod export;
pub mod notification_service;
pub mod user_service;

// Ré-exports pour faciliter l'import
pub use demande_service::{DemandeService, NewDemande, StatusUpdate};
pub use export::{demandes_sheet, users_sheet, ExportSheet};
pub use notification_service::{EmailProvider, LogEmailProvider, NotificationService};
pub use user_service::{AuthResponse, UserService};
