use super::token::TokenInfo;
use crate::error::ServiceError;
use crate::resilience::{families, RetryEngine, RetryPolicy};
use crate::runtime::telemetry::Telemetry;
use crate::services::{CreditClient, Identity, TokenVendor};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Ledger {
    token: Option<TokenInfo>,
    balance: Option<i64>,
}

/// Owns the short-lived credential and the last known credit balance for one
/// identity. Shared by every run of that identity.
///
/// The balance only moves down, except when replaced by an authoritative
/// balance check. Token and balance are swapped under one lock so readers
/// never see a vended token paired with a stale balance.
pub struct TokenManager {
    engine: Arc<RetryEngine>,
    credits: Arc<dyn CreditClient>,
    vendor: Arc<dyn TokenVendor>,
    policy: RetryPolicy,
    token_ttl: Duration,
    ledger: Mutex<Ledger>,
    vend_gate: tokio::sync::Mutex<()>,
    telemetry: Option<Arc<Telemetry>>,
}

impl TokenManager {
    pub fn new(
        engine: Arc<RetryEngine>,
        credits: Arc<dyn CreditClient>,
        vendor: Arc<dyn TokenVendor>,
        policy: RetryPolicy,
        token_ttl: Duration,
    ) -> Self {
        Self {
            engine,
            credits,
            vendor,
            policy,
            token_ttl,
            ledger: Mutex::new(Ledger::default()),
            vend_gate: tokio::sync::Mutex::new(()),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Fetches the authoritative balance and stores it.
    pub async fn check_balance(&self, identity: &Identity) -> Result<i64, ServiceError> {
        let credits = &self.credits;
        let balance = self
            .engine
            .execute(families::CREDIT_BALANCE, &self.policy, |_| {
                credits.balance(identity)
            })
            .await?;

        self.ledger().balance = Some(balance);
        tracing::debug!(user_id = identity.user_id(), balance, "credit balance refreshed");
        Ok(balance)
    }

    /// Spends one credit for a fresh token. Refuses locally, without a remote
    /// call, when the known balance is zero or unknown.
    pub async fn vend_token(&self, identity: &Identity) -> Result<TokenInfo, ServiceError> {
        let balance = self.ledger().balance.unwrap_or(0);
        if balance <= 0 {
            tracing::info!(
                user_id = identity.user_id(),
                balance,
                "refusing token vend without credits"
            );
            return Err(ServiceError::insufficient_credits(format!(
                "credit balance is {balance}"
            )));
        }

        // one id for every attempt so the vendor can deduplicate retries
        let request_id = Uuid::new_v4().to_string();
        let vendor = &self.vendor;
        let outcome = self
            .engine
            .execute(families::TOKEN_VEND, &self.policy, |_| {
                vendor.vend(identity, &request_id)
            })
            .await;

        let vended = match outcome {
            Ok(vended) => vended,
            Err(err) => {
                self.absorb_failure(&err);
                return Err(err);
            }
        };

        let info = TokenInfo::from_vended(vended, Instant::now(), self.token_ttl);
        {
            let mut ledger = self.ledger();
            let current = ledger.balance.unwrap_or(info.balance_after());
            ledger.balance = Some(current.min(info.balance_after()));
            ledger.token = Some(info.clone());
        }

        if let Some(telemetry) = &self.telemetry {
            telemetry.record_token_vend();
        }
        tracing::info!(
            user_id = identity.user_id(),
            scope = info.scope(),
            balance_after = info.balance_after(),
            expires_in_ms = info.remaining().as_millis() as u64,
            "vended short-lived token"
        );
        Ok(info)
    }

    pub fn is_valid(&self) -> bool {
        self.current_token().is_some()
    }

    /// Returns the stored token while it is valid, otherwise vends a new one.
    /// Concurrent callers in the same invalid window share a single vend.
    pub async fn get_valid_token(&self, identity: &Identity) -> Result<TokenInfo, ServiceError> {
        if let Some(token) = self.current_token() {
            return Ok(token);
        }

        let _gate = self.vend_gate.lock().await;
        if let Some(token) = self.current_token() {
            return Ok(token);
        }
        self.vend_token(identity).await
    }

    pub fn clear_token(&self) {
        if self.ledger().token.take().is_some() {
            tracing::info!("cleared short-lived token");
        }
    }

    /// Applies a downstream failure to the ledger: authentication failures
    /// drop the token, an authoritative credit refusal zeroes the balance.
    pub fn absorb_failure(&self, err: &ServiceError) {
        match err {
            ServiceError::Authentication { .. } => self.clear_token(),
            ServiceError::InsufficientCredits { .. } => {
                let mut ledger = self.ledger();
                ledger.balance = Some(0);
                ledger.token = None;
            }
            _ => {}
        }
    }

    /// Last known balance, if any check or vend has happened yet.
    pub fn balance(&self) -> Option<i64> {
        self.ledger().balance
    }

    pub fn current_token(&self) -> Option<TokenInfo> {
        let ledger = self.ledger();
        ledger
            .token
            .as_ref()
            .filter(|token| token.is_valid_at(Instant::now()))
            .cloned()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ledger = self.ledger();
        f.debug_struct("TokenManager")
            .field("balance", &ledger.balance)
            .field("token", &ledger.token)
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}
