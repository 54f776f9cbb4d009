//! Bearer-token authorization.
//!
//! Tokens are HS256 JWTs issued elsewhere. This module checks the signature,
//! issuer, audience and lifetime, then reads the `role` and `client_id`
//! claims into a [`Principal`]. Role requirements are exact: a token that only
//! carries `Admin` does not pass a `User` check.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Case-insensitive parse of a role claim value.
    pub fn from_claim(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller, attached to request extensions by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub client_id: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("no signing key configured")]
    NotConfigured,
    #[error("token is outside its validity period")]
    Expired,
    #[error("token audience is not accepted")]
    WrongAudience,
    #[error("token issuer is not accepted")]
    WrongIssuer,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token carries no recognized role")]
    MissingRole,
    #[error("malformed token: {0}")]
    Malformed(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => Self::Expired,
            ErrorKind::InvalidAudience => Self::WrongAudience,
            ErrorKind::InvalidIssuer => Self::WrongIssuer,
            ErrorKind::InvalidSignature => Self::BadSignature,
            _ => Self::Malformed(error.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoleClaim {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    role: Option<RoleClaim>,
    /// Some issuers write roles under the long claim-type URI.
    #[serde(default, rename = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role")]
    long_role: Option<RoleClaim>,
}

impl Claims {
    fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = [&self.role, &self.long_role]
            .into_iter()
            .flatten()
            .flat_map(|claim| match claim {
                RoleClaim::One(value) => vec![value.as_str()],
                RoleClaim::Many(values) => values.iter().map(String::as_str).collect(),
            })
            .filter_map(Role::from_claim)
            .collect();
        roles.sort_by_key(|role| role.as_str());
        roles.dedup();
        roles
    }
}

/// Validates HS256 bearer tokens against the configured key, issuer and
/// audience.
#[derive(Clone)]
pub struct JwtAuthenticator {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtAuthenticator {
    /// Without a signing key every token is rejected.
    pub fn new(config: &AuthConfig) -> Self {
        let key = (!config.signing_key.is_empty())
            .then(|| DecodingKey::from_secret(config.signing_key.as_bytes()));

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_nbf = true;
        validation.leeway = config.clock_skew().as_secs();

        Self { key, validation }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.validation.leeway)
    }

    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let key = self.key.as_ref().ok_or(AuthError::NotConfigured)?;
        let claims = jsonwebtoken::decode::<Claims>(token, key, &self.validation)?.claims;

        let roles = claims.roles();
        if roles.is_empty() {
            return Err(AuthError::MissingRole);
        }
        Ok(Principal {
            subject: claims.sub,
            client_id: claims.client_id,
            roles,
        })
    }

    /// Principal for the bearer token in `headers`.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
        self.verify(token)
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn authorize(state: &AppState, request: &mut Request, required: Role) -> Result<(), ApiError> {
    let principal = state
        .authenticator()
        .authenticate(request.headers())
        .map_err(|error| {
            warn!(path = %request.uri().path(), error = %error, "bearer token rejected");
            ApiError::Unauthorized
        })?;

    if !principal.has_role(required) {
        warn!(
            client_id = %principal.client_id,
            roles = ?principal.roles,
            required = %required,
            path = %request.uri().path(),
            "insufficient role"
        );
        return Err(ApiError::Forbidden { required });
    }

    debug!(client_id = %principal.client_id, subject = %principal.subject, "request authorized");
    request.extensions_mut().insert(principal);
    Ok(())
}

pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, &mut request, Role::User)?;
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, &mut request, Role::Admin)?;
    Ok(next.run(request).await)
}
