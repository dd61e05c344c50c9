//! API Key Authentication
//!
//! Keys arrive either as `X-API-Key: <key>` or `Authorization: ApiKey <key>`.
//! Every configured key is compared in constant time.

use subtle::ConstantTimeEq;
use tracing::debug;

const AUTHORIZATION_SCHEME: &str = "ApiKey ";

/// Result of authenticating one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub authenticated: bool,

    /// The key the caller presented, when it matched
    pub principal: Option<String>,
}

impl AuthOutcome {
    fn granted(principal: Option<String>) -> Self {
        Self {
            authenticated: true,
            principal,
        }
    }

    fn denied() -> Self {
        Self {
            authenticated: false,
            principal: None,
        }
    }
}

/// Checks presented credentials against the configured key set
#[derive(Clone)]
pub struct Authenticator {
    api_keys: Vec<String>,
    enabled: bool,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("api_keys", &self.api_keys.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Authenticator {
    /// Require one of `api_keys`. With an empty key set nobody is admitted.
    pub fn new<I, S>(api_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            api_keys: api_keys
                .into_iter()
                .map(Into::into)
                .filter(|k: &String| !k.is_empty())
                .collect(),
            enabled: true,
        }
    }

    /// Admit every caller without credentials
    pub fn open() -> Self {
        Self {
            api_keys: Vec::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn key_count(&self) -> usize {
        self.api_keys.len()
    }

    /// Extract a key from either supported header
    pub fn presented_key<'a>(
        x_api_key: Option<&'a str>,
        authorization: Option<&'a str>,
    ) -> Option<&'a str> {
        if let Some(key) = x_api_key.map(str::trim).filter(|k| !k.is_empty()) {
            return Some(key);
        }
        authorization
            .and_then(|value| value.strip_prefix(AUTHORIZATION_SCHEME))
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Whether `candidate` equals one of the configured keys
    pub fn verify(&self, candidate: &str) -> bool {
        let candidate = candidate.as_bytes();
        // No short-circuit: every key is compared
        self.api_keys
            .iter()
            .fold(false, |found, key| {
                found | bool::from(key.as_bytes().ct_eq(candidate))
            })
    }

    /// Authenticate a request from its raw header values
    pub fn authenticate(&self, x_api_key: Option<&str>, authorization: Option<&str>) -> AuthOutcome {
        if !self.enabled {
            return AuthOutcome::granted(None);
        }

        match Self::presented_key(x_api_key, authorization) {
            Some(key) if self.verify(key) => AuthOutcome::granted(Some(key.to_string())),
            Some(_) => {
                debug!("rejected unknown API key");
                AuthOutcome::denied()
            }
            None => AuthOutcome::denied(),
        }
    }
}
