//! Bearer-token verification. The spec explicitly scopes "token
//! verification (OIDC JWKS)" as an external collaborator, so this is a
//! pluggable `TokenVerifier` trait — mirroring how `nlsql_flows::ChartService`
//! models chart rendering — rather than a concrete JWKS client.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// The verified identity and scopes a request carries.
#[derive(Clone, Debug)]
pub struct Claims {
    pub user: String,
    pub scopes: Vec<String>,
}

impl Claims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("missing or malformed bearer token")]
    MissingToken,
    #[error("token failed verification: {0}")]
    InvalidToken(String),
    #[error("token lacks required scope `{0}`")]
    MissingScope(&'static str),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::MissingScope(_) => StatusCode::FORBIDDEN,
        };
        (status, self.to_string()).into_response()
    }
}

/// Verifies a raw bearer token against one of the two configured issuers
/// (user and guest JWKS, per spec) and returns the claims it carries.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// Stand-in verifier used when no JWKS issuer is configured (local dev,
/// tests): treats the bearer token's value as the user id directly and
/// grants no admin scopes. Never selected when `OIDC_DOMAIN` is set.
pub struct StaticTokenVerifier;

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        Ok(Claims {
            user: token.to_string(),
            scopes: vec![],
        })
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    header.strip_prefix("Bearer ").ok_or(AuthError::MissingToken)
}

/// Extractor wrapping a verified `Claims`. Handlers that need the caller's
/// identity take `AuthenticatedUser` as an argument; axum runs `verify`
/// before the handler body.
pub struct AuthenticatedUser(pub Claims);

#[async_trait]
impl FromRequestParts<crate::state::AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::state::AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.token_verifier.verify(token).await?;
        Ok(AuthenticatedUser(claims))
    }
}

/// Requires `scope()` in addition to a verified identity; used by the admin
/// routes (`admin:sessions`, `admin:requests`). One marker type per scope
/// rather than a const-generic parameter, since `&'static str` const
/// generics aren't available on stable Rust.
pub trait Scope {
    const NAME: &'static str;
}

pub struct AdminSessions;
impl Scope for AdminSessions {
    const NAME: &'static str = "admin:sessions";
}

pub struct AdminRequests;
impl Scope for AdminRequests {
    const NAME: &'static str = "admin:requests";
}

pub struct RequireScope<S>(pub Claims, std::marker::PhantomData<S>);

#[async_trait]
impl<S: Scope + Send + Sync> FromRequestParts<crate::state::AppState> for RequireScope<S> {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::state::AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(claims) = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !claims.has_scope(S::NAME) {
            return Err(AuthError::MissingScope(S::NAME));
        }
        Ok(RequireScope(claims, std::marker::PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_verifier_rejects_empty_token() {
        let verifier = StaticTokenVerifier;
        assert!(matches!(verifier.verify("").await, Err(AuthError::MissingToken)));
    }

    #[tokio::test]
    async fn static_verifier_treats_token_as_user_id() {
        let verifier = StaticTokenVerifier;
        let claims = verifier.verify("alice").await.unwrap();
        assert_eq!(claims.user, "alice");
        assert!(!claims.has_scope("admin:sessions"));
    }
}
