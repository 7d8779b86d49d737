//! User-presence authentication boundary.
//!
//! The platform's biometric/passcode subsystem is an external collaborator.
//! Single-prompt secure-element scopes evaluate it once and hand the granted
//! context to the store on later reads.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::access::AccessControl;
use crate::error::ScopeError;

/// Opaque token proving a successful evaluation.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AuthContext(Vec<u8>);

impl AuthContext {
    /// Wraps a platform context token.
    #[must_use]
    pub const fn new(token: Vec<u8>) -> Self {
        Self(token)
    }

    /// Returns the raw token bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthContext(<redacted>)")
    }
}

/// Result of a user-presence evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The user authenticated.
    Granted(AuthContext),
    /// The user dismissed the prompt.
    Cancelled,
    /// The user picked the fallback action instead of authenticating.
    FallbackChosen,
    /// Evaluation failed.
    Failed(String),
}

impl AuthOutcome {
    /// Maps the outcome onto the scope error taxonomy.
    ///
    /// # Errors
    ///
    /// `Cancelled` and `FallbackChosen` become [`ScopeError::UserCancelled`];
    /// `Failed` becomes [`ScopeError::AuthFailed`].
    pub fn into_context(self) -> Result<AuthContext, ScopeError> {
        match self {
            Self::Granted(context) => Ok(context),
            Self::Cancelled | Self::FallbackChosen => Err(ScopeError::UserCancelled),
            Self::Failed(reason) => {
                log::warn!("user presence evaluation failed: {reason}");
                Err(ScopeError::AuthFailed)
            }
        }
    }
}

/// Platform user-presence evaluator.
///
/// Implementations block until the user responds. Outcomes are surfaced to
/// the caller as-is; a cancelled prompt is never retried.
pub trait Authenticator: Send + Sync {
    /// Asks the user to satisfy `control`, showing `prompt`.
    fn evaluate(&self, control: AccessControl, prompt: &str) -> AuthOutcome;
}
