//! Request gate: an ordered list of capability checks.
//!
//! Checks run in order and the first rejection wins. The shared-secret check
//! is installed when a secret is configured; embedders append their own.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, Request};
use axum::http::header;
use secrecy::SecretString;

use crate::config::secrets::token_matches;

/// Query parameters searched for the token, in order.
const TOKEN_PARAMS: [&str; 4] = ["secret", "api_key", "key", "access_token"];

/// A predicate deciding whether a request may proceed.
pub trait AuthCheck: Send + Sync {
    fn check(&self, request: &Request) -> bool;
}

impl<F> AuthCheck for F
where
    F: Fn(&Request) -> bool + Send + Sync,
{
    fn check(&self, request: &Request) -> bool {
        self(request)
    }
}

/// Accepts requests carrying the configured secret.
pub struct SharedSecret {
    secret: SecretString,
}

impl SharedSecret {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }
}

impl AuthCheck for SharedSecret {
    fn check(&self, request: &Request) -> bool {
        request_token(request).is_some_and(|token| token_matches(&self.secret, &token))
    }
}

/// The token a client presented: the first non-empty query parameter of
/// [`TOKEN_PARAMS`], else the `Authorization` header (with or without a
/// `Bearer ` prefix).
pub fn request_token(request: &Request) -> Option<String> {
    if let Ok(Query(params)) = Query::<HashMap<String, String>>::try_from_uri(request.uri()) {
        let from_query = TOKEN_PARAMS
            .iter()
            .filter_map(|name| params.get(*name))
            .find(|value| !value.is_empty());
        if let Some(token) = from_query {
            return Some(token.clone());
        }
    }

    let header = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header);
    (!token.is_empty()).then(|| token.to_string())
}

/// Ordered checks; an empty chain admits everything.
#[derive(Clone, Default)]
pub struct AuthChain {
    checks: Vec<Arc<dyn AuthCheck>>,
}

impl AuthChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain with the shared-secret check when a secret is configured.
    pub fn from_secret(secret: Option<SecretString>) -> Self {
        let chain = Self::new();
        match secret {
            Some(secret) => chain.with(SharedSecret::new(secret)),
            None => chain,
        }
    }

    /// Append a check after the existing ones.
    pub fn with(mut self, check: impl AuthCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// True when every check passes; stops at the first rejection.
    pub fn allows(&self, request: &Request) -> bool {
        self.checks.iter().all(|check| check.check(request))
    }
}
