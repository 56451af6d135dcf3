use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::credential::CredentialManager;
use crate::email::SystemMailer;
use crate::sms::SmsSender;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub credentials: CredentialManager,
    pub system_mailer: Option<Arc<SystemMailer>>,
    pub sms_sender: Option<Arc<dyn SmsSender>>,
}
