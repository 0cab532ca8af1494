pub mod database;
pub mod error;

pub use database::{Database, DemandeStore, InMemoryStore, UserStore};
pub use error::{AppError, AppResult};
