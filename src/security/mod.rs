pub mod admission;
pub mod api_keys;
pub mod auth;
pub mod error;
pub mod headers;
pub mod limits;
pub mod rate_limit;
pub mod request_log;

pub use admission::ApiKeyAdmission;
pub use api_keys::{ApiKeyService, QuotaSnapshot};
pub use auth::{require_admin, verify_admin_credentials, AuthService, Claims};
pub use error::ApiError;
pub use headers::SecurityHeaders;
pub use limits::PayloadLimit;
pub use rate_limit::{RateLimit, RateLimitConfig, RateLimiterStore};
pub use request_log::RequestLogging;
