use std::collections::HashMap;
use std::sync::Arc;

use ap_core::auth::Caller;
use ap_core::config::AuthConfig;
use ap_core::{ApError, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

/// Resolves a bearer token to the identities it stands for.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Caller>;
}

/// Fixed token table from the `auth.tokens` section of the service config.
/// The first identity listed for a token is the caller's primary identity.
pub struct TokenTable {
    callers: HashMap<String, Caller>,
}

impl TokenTable {
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let mut callers = HashMap::with_capacity(config.tokens.len());
        for (token, identities) in &config.tokens {
            let (primary, linked) = identities.split_first().ok_or_else(|| {
                ApError::InvalidRequest("auth token has no identities".into())
            })?;
            callers.insert(token.clone(), Caller::new(primary.clone(), linked.to_vec())?);
        }
        Ok(Self { callers })
    }
}

impl IdentityProvider for TokenTable {
    fn resolve(&self, token: &str) -> Option<Caller> {
        self.callers.get(token).cloned()
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Axum middleware that authenticates the bearer token and stores the
/// resulting [`Caller`] in the request extensions.
///
/// A missing or unknown token is answered with a JSON 401.
pub async fn auth_middleware(
    State(identities): State<Arc<dyn IdentityProvider>>,
    mut req: Request,
    next: Next,
) -> Response {
    let caller = bearer_token(&req).and_then(|token| identities.resolve(token));
    match caller {
        Some(caller) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        None => {
            tracing::debug!(path = %req.uri().path(), "rejecting unauthenticated request");
            Response::builder()
                .status(401)
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"error":"unauthorized"}"#))
                .expect("infallible: all header values are valid ASCII")
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
