//! Côté client du registre : appels REST, console de revue des agents,
//! rafraîchissement périodique des listes et session persistée.

pub mod api_client;
pub mod console;
pub mod poller;
pub mod session;

pub use api_client::{extract_error_message, ClientError, RegistreClient};
pub use console::{Actions, ReviewConsole};
pub use poller::{DemandeSource, PollScope, PollSnapshot, PollerConfig, PollerHandle, RemoteSource, RequestPoller};
pub use session::{FileSessionPersistence, Session, SessionError, SessionPersistence, SessionStore};
