//! Accessibility levels and access-control choices.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// When a stored record may be read.
///
/// Each level maps to exactly one store attribute value and one fingerprint
/// token. Neither mapping ever changes for an existing variant: both are
/// persisted by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    /// Readable while the device is unlocked.
    #[strum(serialize = "AccessibleWhenUnlocked")]
    WhenUnlocked,
    /// Readable after the first unlock following a restart.
    #[strum(serialize = "AccessibleAfterFirstUnlock")]
    AfterFirstUnlock,
    /// Readable while unlocked, only if a passcode is set; never leaves the device.
    #[strum(serialize = "AccessibleWhenPasscodeSetThisDeviceOnly")]
    WhenPasscodeSetThisDeviceOnly,
    /// Readable while unlocked; never leaves the device.
    #[strum(serialize = "AccessibleWhenUnlockedThisDeviceOnly")]
    WhenUnlockedThisDeviceOnly,
    /// Readable after first unlock; never leaves the device.
    #[strum(serialize = "AccessibleAfterFirstUnlockThisDeviceOnly")]
    AfterFirstUnlockThisDeviceOnly,
}

impl AccessPolicy {
    /// Every level, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::WhenUnlocked,
        Self::AfterFirstUnlock,
        Self::WhenPasscodeSetThisDeviceOnly,
        Self::WhenUnlockedThisDeviceOnly,
        Self::AfterFirstUnlockThisDeviceOnly,
    ];

    /// Returns the value of the store's accessibility attribute.
    #[must_use]
    pub const fn store_value(self) -> &'static str {
        match self {
            Self::WhenUnlocked => "ak",
            Self::AfterFirstUnlock => "ck",
            Self::WhenPasscodeSetThisDeviceOnly => "akpu",
            Self::WhenUnlockedThisDeviceOnly => "aku",
            Self::AfterFirstUnlockThisDeviceOnly => "cku",
        }
    }

    /// Returns the token embedded in fingerprints.
    #[must_use]
    pub fn token(self) -> String {
        self.to_string()
    }

}

/// Accessibility levels allowed for cloud-synchronized scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum CloudAccessPolicy {
    /// See [`AccessPolicy::WhenUnlocked`].
    WhenUnlocked,
    /// See [`AccessPolicy::AfterFirstUnlock`].
    AfterFirstUnlock,
}

impl From<CloudAccessPolicy> for AccessPolicy {
    fn from(policy: CloudAccessPolicy) -> Self {
        match policy {
            CloudAccessPolicy::WhenUnlocked => Self::WhenUnlocked,
            CloudAccessPolicy::AfterFirstUnlock => Self::AfterFirstUnlock,
        }
    }
}

/// User-presence requirement of a secure-element scope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum AccessControl {
    /// Biometrics or device passcode.
    UserPresence,
    /// Any enrolled biometric.
    BiometricAny,
    /// Only the biometrics enrolled when the record was written.
    BiometricCurrentSet,
    /// Device passcode only.
    DevicePasscode,
}

impl AccessControl {
    /// Every choice, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::UserPresence,
        Self::BiometricAny,
        Self::BiometricCurrentSet,
        Self::DevicePasscode,
    ];

    /// Returns the value of the store's access-control attribute.
    #[must_use]
    pub const fn store_flags(self) -> &'static str {
        match self {
            Self::UserPresence => "userPresence",
            Self::BiometricAny => "biometryAny",
            Self::BiometricCurrentSet => "biometryCurrentSet",
            Self::DevicePasscode => "devicePasscode",
        }
    }

    /// Returns the token appended to fingerprints.
    #[must_use]
    pub fn token(self) -> String {
        self.to_string()
    }
}
