pub mod attempt;
pub mod credential;
pub mod refresh_token;
pub mod user;

pub use attempt::{AttemptKind, CredentialAttempt};
pub use credential::{Credential, Purpose};
pub use refresh_token::RefreshToken;
pub use user::User;
