//! Raw platform status codes.

use std::fmt;

/// Status code returned by a platform store primitive.
///
/// Values follow the platform's `OSStatus` numbering so a native bridge can
/// pass codes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    /// The call succeeded.
    pub const SUCCESS: Self = Self(0);
    /// No item matched the query.
    pub const ITEM_NOT_FOUND: Self = Self(-25300);
    /// An item with the same primary attributes already exists.
    pub const DUPLICATE_ITEM: Self = Self(-25299);
    /// The user cancelled an authentication prompt.
    pub const USER_CANCELED: Self = Self(-128);
    /// Authentication failed.
    pub const AUTH_FAILED: Self = Self(-25293);
    /// The calling binary lacks the entitlement for the requested access group.
    pub const MISSING_ENTITLEMENT: Self = Self(-34018);
    /// User interaction would be required but was not allowed.
    pub const INTERACTION_NOT_ALLOWED: Self = Self(-25308);
    /// One or more parameters were invalid.
    pub const PARAM: Self = Self(-50);

    /// Returns `true` for [`Status::SUCCESS`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Self(code)
    }
}
