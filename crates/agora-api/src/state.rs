use std::sync::Arc;

use tracing::error;

use agora_db::Database;
use agora_gateway::Dispatcher;
use agora_media::{CompressionSettings, Storage};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub storage: Storage,
    pub config: ApiConfig,
}

/// Settings the handlers need at request time.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    pub token_days: i64,
    /// Lower-cased; registrations with these emails become staff.
    pub staff_emails: Vec<String>,
    /// Base of links shared to other platforms.
    pub frontend_url: String,
    pub compression: CompressionSettings,
}

impl AppStateInner {
    /// Runs database work off the async runtime.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?
    }

    pub fn is_staff_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.config.staff_emails.iter().any(|staff| *staff == email)
    }
}
