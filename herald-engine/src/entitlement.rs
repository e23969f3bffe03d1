//! Entitlement gate.

use async_trait::async_trait;
use herald_core::EngineError;

/// Account used when a campaign names none.
pub const DEFAULT_ACCOUNT: &str = "default";

/// Decides whether an account may run campaigns.
///
/// An `Err` means the gate could not be reached. The engine refuses to start
/// a campaign on `Err` but keeps a running campaign going.
#[async_trait]
pub trait EntitlementGate: Send + Sync {
    async fn is_entitled(&self, account: &str) -> Result<bool, EngineError>;
}

/// Gate that entitles everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl EntitlementGate for AllowAll {
    async fn is_entitled(&self, _account: &str) -> Result<bool, EngineError> {
        Ok(true)
    }
}

/// Check at campaign start. Anything but a clear yes refuses the start.
pub(crate) async fn check_at_start(
    gate: &dyn EntitlementGate,
    account: &str,
) -> Result<(), EngineError> {
    match gate.is_entitled(account).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(EngineError::NotEntitled {
            account: account.to_string(),
        }),
        Err(e) => Err(EngineError::EntitlementUnavailable {
            reason: e.to_string(),
        }),
    }
}

/// Result of a re-check while the campaign runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recheck {
    Entitled,
    Revoked,
    /// Gate unreachable; the campaign carries on.
    Unknown(String),
}

pub(crate) async fn recheck(gate: &dyn EntitlementGate, account: &str) -> Recheck {
    match gate.is_entitled(account).await {
        Ok(true) => Recheck::Entitled,
        Ok(false) => Recheck::Revoked,
        Err(e) => Recheck::Unknown(e.to_string()),
    }
}
