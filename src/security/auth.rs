use actix_web::HttpRequest;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::security::error::ApiError;

/// JWT claims for the admin panel session.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn admin(username: String, expire_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: username,
            role: "admin".to_string(),
            exp: (now + Duration::minutes(expire_minutes)).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Issues and validates admin JWTs. Data endpoints use API keys instead;
/// this guards only the administrative surface.
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    pub fn generate_token(&self, claims: &Claims) -> Result<String, ApiError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("failed to generate token: {e}")))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|_| ApiError::Unauthorized("Token inválido ou expirado".into()))?;
        Ok(data.claims)
    }

    pub fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
        req.headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.to_string())
    }
}

/// Bcrypt verification of the admin password against the configured hash.
/// Invalid or unconfigured hashes verify as false, never as an error.
pub fn verify_admin_credentials(
    username: &str,
    password: &str,
    expected_username: &str,
    expected_password_hash: &str,
) -> bool {
    if username != expected_username {
        return false;
    }
    bcrypt::verify(password, expected_password_hash).unwrap_or(false)
}

/// Guard for admin routes: extracts the bearer token and requires the
/// admin role.
pub fn require_admin(req: &HttpRequest, auth: &AuthService) -> Result<Claims, ApiError> {
    let token = AuthService::extract_token_from_request(req)
        .ok_or_else(|| ApiError::Unauthorized("Token de autenticação ausente".into()))?;
    let claims = auth.validate_token(&token)?;
    if !claims.is_admin() {
        return Err(ApiError::Forbidden("Acesso negado - apenas administradores".into()));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_preserves_admin_role() {
        let auth = AuthService::new("test-secret");
        let claims = Claims::admin("admin".into(), 60);
        let token = auth.generate_token(&claims).unwrap();
        let decoded = auth.validate_token(&token).unwrap();
        assert_eq!(decoded.sub, "admin");
        assert!(decoded.is_admin());
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let issuer = AuthService::new("secret-a");
        let verifier = AuthService::new("secret-b");
        let token = issuer.generate_token(&Claims::admin("admin".into(), 60)).unwrap();
        assert!(verifier.validate_token(&token).is_err());
    }

    #[test]
    fn admin_credentials_verify_against_bcrypt_hash() {
        let hash = bcrypt::hash("s3nha-forte", 4).unwrap();
        assert!(verify_admin_credentials("admin", "s3nha-forte", "admin", &hash));
        assert!(!verify_admin_credentials("admin", "errada", "admin", &hash));
        assert!(!verify_admin_credentials("root", "s3nha-forte", "admin", &hash));
        // Unconfigured placeholder hash can never authenticate.
        assert!(!verify_admin_credentials("admin", "x", "admin", "CONFIGURE_VIA_ENV_VAR"));
    }
}
