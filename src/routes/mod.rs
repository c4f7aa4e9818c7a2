pub mod admin_api_keys;
pub mod auth;
pub mod metadata;
pub mod reports;
pub mod validations;
pub mod verify;
