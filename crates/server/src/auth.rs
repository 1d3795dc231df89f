//! HTTP Basic authentication.

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use base64::{Engine, engine::general_purpose::STANDARD};
use http::{HeaderMap, header::AUTHORIZATION, request::Parts};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::{error::ApiError, state::AppState};

/// Username and password sent with the `Basic` scheme.
#[derive(Debug, Clone)]
pub(crate) struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    /// Parses the `Authorization` header. Anything other than well formed
    /// `Basic` credentials counts as absent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, encoded) = value.trim().split_once(' ')?;

        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        Some(Self {
            username: username.to_string(),
            password: SecretString::from(password.to_string()),
        })
    }

    /// Compares the password against a stored one in constant time.
    pub fn matches(&self, stored_password: &str) -> bool {
        self.password.expose_secret().as_bytes().ct_eq(stored_password.as_bytes()).into()
    }
}

impl<S> OptionalFromRequestParts<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(Credentials::from_headers(&parts.headers))
    }
}

/// The name of a caller whose credentials match a registered user.
#[derive(Debug, Clone)]
pub(crate) struct AuthenticatedUser(pub String);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credentials = Credentials::from_headers(&parts.headers).ok_or(ApiError::Unauthorized)?;

        match state.store.get_user(&credentials.username).await? {
            Some(user) if credentials.matches(&user.password) => Ok(AuthenticatedUser(user.username)),
            _ => {
                log::debug!("Rejected credentials for user '{}'", credentials.username);
                Err(ApiError::Unauthorized)
            }
        }
    }
}
