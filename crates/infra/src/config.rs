//! Ledger configuration: retry policy, attempt timeout, negative-stock policy.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// What the coordinator does when an operation would drive stock below zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum NegativeStockPolicy {
    /// Floor the balance at zero, log the discrepancy and record the absorbed
    /// amount on the entity for reconciliation.
    #[default]
    Clamp,
    /// Fail the operation with `InsufficientStock`.
    Reject,
}

impl FromStr for NegativeStockPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clamp" => Ok(Self::Clamp),
            "reject" => Ok(Self::Reject),
            other => anyhow::bail!("unknown negative stock policy '{other}' (expected clamp|reject)"),
        }
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Total attempts per operation, including the first.
    pub max_attempts: u32,
    /// Deadline for a single transaction attempt.
    pub attempt_timeout: Duration,
    /// Base backoff between attempts; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
    pub negative_stock: NegativeStockPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(2),
            retry_backoff: Duration::from_millis(10),
            negative_stock: NegativeStockPolicy::Clamp,
        }
    }
}

impl LedgerConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_negative_stock(mut self, policy: NegativeStockPolicy) -> Self {
        self.negative_stock = policy;
        self
    }

    /// Load from `STOCKLEDGER_*` environment variables, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("STOCKLEDGER_MAX_ATTEMPTS") {
            let attempts: u32 = v
                .parse()
                .with_context(|| format!("STOCKLEDGER_MAX_ATTEMPTS={v}"))?;
            config = config.with_max_attempts(attempts);
        }
        if let Some(v) = lookup("STOCKLEDGER_ATTEMPT_TIMEOUT_MS") {
            let ms: u64 = v
                .parse()
                .with_context(|| format!("STOCKLEDGER_ATTEMPT_TIMEOUT_MS={v}"))?;
            config = config.with_attempt_timeout(Duration::from_millis(ms));
        }
        if let Some(v) = lookup("STOCKLEDGER_RETRY_BACKOFF_MS") {
            let ms: u64 = v
                .parse()
                .with_context(|| format!("STOCKLEDGER_RETRY_BACKOFF_MS={v}"))?;
            config = config.with_retry_backoff(Duration::from_millis(ms));
        }
        if let Some(v) = lookup("STOCKLEDGER_NEGATIVE_STOCK") {
            config = config.with_negative_stock(v.parse()?);
        }

        if config.negative_stock == NegativeStockPolicy::Clamp {
            tracing::debug!("negative stock policy: clamp (discrepancies are logged)");
        }

        Ok(config)
    }
}
