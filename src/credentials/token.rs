use crate::services::VendedToken;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Short-lived credential held by the token manager. Replaced wholesale on
/// every vend, never edited in place.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenInfo {
    token: String,
    scope: String,
    expires_at: Instant,
    balance_after: i64,
}

impl TokenInfo {
    pub fn new(
        token: impl Into<String>,
        scope: impl Into<String>,
        expires_at: Instant,
        balance_after: i64,
    ) -> Self {
        Self {
            token: token.into(),
            scope: scope.into(),
            expires_at,
            balance_after,
        }
    }

    /// Stamps an absolute expiry onto a vending response, falling back to
    /// `default_ttl` when the vendor did not report a lifetime.
    pub(crate) fn from_vended(vended: VendedToken, issued_at: Instant, default_ttl: Duration) -> Self {
        let ttl = vended.expires_in.unwrap_or(default_ttl);
        Self {
            token: vended.token,
            scope: vended.scope,
            expires_at: issued_at + ttl,
            balance_after: vended.balance_after,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn balance_after(&self) -> i64 {
        self.balance_after
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("token", &"<redacted>")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("balance_after", &self.balance_after)
            .finish()
    }
}
