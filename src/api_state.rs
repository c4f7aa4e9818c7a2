use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Settings;
use crate::core::dataset_registry::DatasetRegistry;
use crate::database::Database;
use crate::security::auth::AuthService;
use crate::security::rate_limit::RateLimiterStore;

/// Application state threaded through all request handlers. Built once at
/// startup; test fixtures construct it with fakes where needed.
pub struct AppState {
    pub settings: Settings,
    pub db_pool: PgPool,
    pub rate_limiter: Arc<RateLimiterStore>,
    pub registry: Arc<DatasetRegistry>,
    pub auth: AuthService,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self, sqlx::Error> {
        let db = Database::new(&settings).await?;
        let db_pool = db.pool().clone();
        let rate_limiter =
            Arc::new(RateLimiterStore::from_redis_url(settings.redis_url.as_deref()).await);
        let auth = AuthService::new(&settings.secret_key);

        Ok(Self {
            settings,
            db_pool,
            rate_limiter,
            registry: Arc::new(DatasetRegistry::new()),
            auth,
        })
    }
}
