//! Cookie-carried session identity
//!
//! A caller without a valid `murmur_session` cookie gets a fresh id, and the
//! response sets the cookie so later requests reuse the same history.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, header, request::Parts},
    response::Response,
};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "murmur_session";

/// Session identity of the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    is_new: bool,
}

impl Session {
    /// Start a brand-new session
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            is_new: true,
        }
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the id was issued by this request
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    /// Read the session id from a `Cookie` header value
    #[must_use]
    pub fn from_cookie_header(value: &str) -> Option<Self> {
        value
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, id)| id.trim())
            .filter(|id| is_valid_id(id))
            .map(|id| Self {
                id: id.to_string(),
                is_new: false,
            })
    }

    /// Set the session cookie on `response` when the session is new
    #[must_use]
    pub fn attach(&self, mut response: Response) -> Response {
        if self.is_new {
            let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", self.id);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

/// Ids are used in file names, so only short alphanumeric ids are accepted
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let existing = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(Self::from_cookie_header);

        Ok(existing.unwrap_or_else(Self::fresh))
    }
}
