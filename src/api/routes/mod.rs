pub mod auth;
pub mod demandes;
pub mod exports;
pub mod formulaires;
pub mod middleware;
pub mod users;
pub mod verification;
