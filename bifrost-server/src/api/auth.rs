//! Bearer-token guards for HTTP-exposed functions
//!
//! [`JwtAuth`] mints and checks HS256 tokens. [`bearer_guard`] turns it into
//! an access guard that can be attached to any registered function.

use bifrost::{CallContext, FnError};
use chrono::{Duration, Utc};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Token failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidHeader,

    #[error("Empty token")]
    EmptyToken,

    #[error("Failed to generate token: {0}")]
    Encode(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

impl From<AuthError> for FnError {
    fn from(e: AuthError) -> Self {
        FnError::with_status(401, e.to_string())
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (caller identifier)
    pub sub: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
}

/// HS256 token issuer and verifier
pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Mint a token for `subject`, valid for `expires_in_hours` (default 24)
    pub fn generate_token(
        &self,
        subject: &str,
        expires_in_hours: Option<i64>,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now + Duration::hours(expires_in_hours.unwrap_or(24));

        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Encode(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Extract token from an `Authorization: Bearer <token>` header value
    pub fn extract_bearer_token(auth_header: &str) -> Result<&str, AuthError> {
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidHeader)?
            .trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(token)
    }

    /// Check the bearer token carried by a call
    pub fn authorize(&self, ctx: &CallContext) -> Result<Claims, AuthError> {
        let header = ctx
            .header("authorization")
            .ok_or(AuthError::MissingHeader)?;
        self.validate_token(Self::extract_bearer_token(header)?)
    }
}

/// Guard that admits calls carrying a valid bearer token
pub fn bearer_guard(
    auth: Arc<JwtAuth>,
) -> impl Fn(CallContext) -> Ready<Result<(), FnError>> + Send + Sync + 'static {
    move |ctx| ready(auth.authorize(&ctx).map(|_| ()).map_err(FnError::from))
}

/// Guard that admits every call
pub async fn allow_any(_ctx: CallContext) -> Result<(), FnError> {
    Ok(())
}

/// Guard that refuses every call with `status`
pub fn deny_with(
    status: u16,
    message: &'static str,
) -> impl Fn(CallContext) -> Ready<Result<(), FnError>> + Send + Sync + 'static {
    move |_| ready(Err(FnError::with_status(status, message)))
}
