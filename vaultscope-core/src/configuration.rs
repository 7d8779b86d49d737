//! Scope configuration variants.

use serde::{Deserialize, Serialize};

use crate::access::{AccessControl, AccessPolicy, CloudAccessPolicy};

/// How a scope's records are protected and shared.
///
/// Every derived property is a total function of the variant so callers never
/// re-derive them at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(tag = "kind", content = "policy", rename_all = "snake_case")]
pub enum Configuration {
    /// Local records under an accessibility level.
    Plain(AccessPolicy),
    /// Records synchronized through the platform's cloud keychain.
    Cloud(CloudAccessPolicy),
    /// Secure-element records; every read asks for user presence.
    SecureElement(AccessControl),
    /// Secure-element records; one successful prompt unlocks reads until
    /// the handle is told to prompt again.
    SinglePromptSecureElement(AccessControl),
}

impl Configuration {
    /// Returns the accessibility level records are written with.
    ///
    /// Secure-element variants always resolve to
    /// [`AccessPolicy::WhenPasscodeSetThisDeviceOnly`].
    #[must_use]
    pub fn access_policy(self) -> AccessPolicy {
        match self {
            Self::Plain(policy) => policy,
            Self::Cloud(policy) => policy.into(),
            Self::SecureElement(_) | Self::SinglePromptSecureElement(_) => {
                AccessPolicy::WhenPasscodeSetThisDeviceOnly
            }
        }
    }

    /// Returns the access-control choice, if any.
    #[must_use]
    pub const fn access_control(self) -> Option<AccessControl> {
        match self {
            Self::Plain(_) | Self::Cloud(_) => None,
            Self::SecureElement(control) | Self::SinglePromptSecureElement(control) => {
                Some(control)
            }
        }
    }

    /// Returns the configuration-kind token that opens a fingerprint.
    #[must_use]
    pub const fn kind_token(self) -> &'static str {
        match self {
            Self::Plain(_) => "Plain",
            Self::Cloud(_) => "Cloud",
            Self::SecureElement(_) => "SecureElement",
            Self::SinglePromptSecureElement(_) => "SinglePromptSecureElement",
        }
    }

    /// Returns the token appended after the policy token, if any.
    #[must_use]
    pub fn fingerprint_suffix(self) -> Option<String> {
        self.access_control().map(AccessControl::token)
    }

    /// Returns `true` for configurations whose records synchronize.
    #[must_use]
    pub const fn is_synchronizable(self) -> bool {
        matches!(self, Self::Cloud(_))
    }

    /// Returns `true` for configurations whose reads need user presence.
    #[must_use]
    pub const fn requires_user_presence(self) -> bool {
        self.access_control().is_some()
    }
}
