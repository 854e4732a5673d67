//! Caller identity for the HTTP layer: API keys, config from env, dev bypass.
//!
//! When `DISABLE_AUTH=true` or `API_KEYS` is unset, the caller names itself with an
//! `X-User-Id: <id>` header. Otherwise, validate `Authorization: Bearer <key>` or
//! `X-API-Key: <key>` and look up the key in `API_KEYS` (format: `key1:user_id1,key2:user_id2`).
//! Either way the resolved [`AuthUser`] is injected for handlers; roles are checked
//! by the engine against the user directory, not here.

use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::UserId;

/// Header carrying the caller's id when auth is disabled.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Authenticated caller. Injected by [`require_identity`].
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: UserId,
}

/// Auth configuration: disable flag and key → user map.
#[derive(Clone)]
pub struct AuthConfig {
    pub disable: bool,
    keys: Arc<HashMap<String, UserId>>,
}

fn parse_keys(s: &str) -> HashMap<String, UserId> {
    s.split(',')
        .filter_map(|part| {
            let mut split = part.trim().splitn(2, ':');
            let key = split.next()?.trim().to_string();
            let user: u64 = split.next()?.trim().parse().ok()?;
            if key.is_empty() {
                return None;
            }
            Some((key, UserId(user)))
        })
        .collect()
}

impl AuthConfig {
    /// Auth disabled: identity comes from the `X-User-Id` header.
    pub fn disabled() -> Self {
        Self {
            disable: true,
            keys: Arc::new(HashMap::new()),
        }
    }

    /// Build from `key:user_id` pairs (e.g. "k1:1,k2:2").
    pub fn from_keys(keys: &str) -> Self {
        let map = parse_keys(keys);
        Self {
            disable: map.is_empty(),
            keys: Arc::new(map),
        }
    }

    /// Load from env: `DISABLE_AUTH=true` or unset `API_KEYS` => auth disabled.
    pub fn from_env() -> Self {
        let disable = std::env::var("DISABLE_AUTH")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let keys = std::env::var("API_KEYS").map(|s| parse_keys(&s)).unwrap_or_default();
        Self {
            disable: disable || keys.is_empty(),
            keys: Arc::new(keys),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<UserId> {
        self.keys.get(key).copied()
    }
}

/// Returns the API key from `Authorization: Bearer <key>` or `X-API-Key: <key>`.
fn get_api_key_from_request(req: &Request) -> Option<String> {
    if let Some(v) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(s) = v.to_str() {
            let s = s.trim();
            if s.len() >= 7 && s.get(..7).map(|p| p.eq_ignore_ascii_case("bearer ")).unwrap_or(false) {
                return Some(s.get(7..).unwrap_or("").trim().to_string());
            }
        }
    }
    if let Some(v) = req.headers().get("X-API-Key") {
        if let Ok(s) = v.to_str() {
            return Some(s.trim().to_string());
        }
    }
    None
}

fn get_user_id_header(req: &Request) -> Option<UserId> {
    req.headers()
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(UserId)
}

/// Identity middleware: resolves the caller and injects [`AuthUser`]; 401 if it cannot.
pub async fn require_identity(mut req: Request<Body>, next: Next, config: AuthConfig) -> Response {
    if config.disable {
        let Some(user_id) = get_user_id_header(&req) else {
            return (StatusCode::UNAUTHORIZED, "missing or invalid X-User-Id").into_response();
        };
        req.extensions_mut().insert(AuthUser { user_id });
        return next.run(req).await;
    }

    let key = match get_api_key_from_request(&req) {
        Some(k) if !k.is_empty() => k,
        _ => {
            return (StatusCode::UNAUTHORIZED, "missing or invalid Authorization or X-API-Key")
                .into_response();
        }
    };

    match config.lookup(&key) {
        Some(user_id) => {
            req.extensions_mut().insert(AuthUser { user_id });
            next.run(req).await
        }
        None => (StatusCode::UNAUTHORIZED, "invalid API key").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_keys_parses_pairs_and_skips_garbage() {
        let c = AuthConfig::from_keys("k1:1, k2:22 ,bad,k3:x,:4");
        assert!(!c.disable);
        assert_eq!(c.lookup("k1"), Some(UserId(1)));
        assert_eq!(c.lookup("k2"), Some(UserId(22)));
        assert_eq!(c.lookup("k3"), None);
        assert_eq!(c.lookup("bad"), None);
    }

    #[test]
    fn empty_keys_disable_auth() {
        assert!(AuthConfig::from_keys("").disable);
        assert!(AuthConfig::disabled().disable);
    }
}
