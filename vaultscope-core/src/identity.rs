//! Scope identities and their fingerprints.
//!
//! A fingerprint is the canonical string identity of a scope. It is written
//! to the store's service attribute, so it is both the registry key and the
//! store namespace of the scope's records. Two identities that differ in any
//! field must never share a fingerprint.
//!
//! # Format
//!
//! ```text
//! VS_<kind>_<tier>[_<prefix>]_<identifier>[_<secondary>]_<policy>[_<control>]
//! ```
//!
//! - `<kind>` is [`Configuration::kind_token`].
//! - `<tier>` is `std` or `grp`; `<prefix>` is present only for `grp`.
//! - `<policy>` is the [`AccessPolicy`](crate::AccessPolicy) token.
//! - `<control>` is present only for secure-element kinds.
//!
//! Free-form segments escape `\` as `\\` and `_` as `\_`. Fixed tokens never
//! contain either character, so splitting on unescaped `_` recovers the
//! segments, and the kind and tier determine which optional segments exist.
//! The mapping is therefore injective.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use vaultscope_store::Query;

use crate::configuration::Configuration;
use crate::error::IdentityError;

const FINGERPRINT_PREFIX: &str = "VS";
const SEPARATOR: char = '_';

/// Non-empty identifier segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Creates an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::EmptyIdentifier`] for an empty string.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentityError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdentityError::EmptyIdentifier);
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = IdentityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(identifier: Identifier) -> Self {
        identifier.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sharing tier of a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum Tier {
    /// Private to the calling application.
    Standard,
    /// Shared through an access group `"{prefix}.{identifier}"`.
    SharedGroup {
        /// Group prefix (the signing team identifier on Apple platforms).
        prefix: Identifier,
    },
}

impl Tier {
    const fn token(&self) -> &'static str {
        match self {
            Self::Standard => "std",
            Self::SharedGroup { .. } => "grp",
        }
    }
}

/// Identity of a scope.
///
/// Equality and hashing go through [`ScopeIdentity::fingerprint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeIdentity {
    tier: Tier,
    identifier: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secondary: Option<Identifier>,
    configuration: Configuration,
}

impl ScopeIdentity {
    /// Creates an identity from its parts.
    #[must_use]
    pub const fn new(
        tier: Tier,
        identifier: Identifier,
        secondary: Option<Identifier>,
        configuration: Configuration,
    ) -> Self {
        Self {
            tier,
            identifier,
            secondary,
            configuration,
        }
    }

    /// Creates a standard-tier identity.
    #[must_use]
    pub const fn standard(identifier: Identifier, configuration: Configuration) -> Self {
        Self::new(Tier::Standard, identifier, None, configuration)
    }

    /// Creates a shared-group identity.
    #[must_use]
    pub const fn shared_group(
        prefix: Identifier,
        group: Identifier,
        configuration: Configuration,
    ) -> Self {
        Self::new(Tier::SharedGroup { prefix }, group, None, configuration)
    }

    /// Creates a shared-group identity partitioned per caller.
    #[must_use]
    pub const fn shared_group_partitioned(
        prefix: Identifier,
        group: Identifier,
        partition: Identifier,
        configuration: Configuration,
    ) -> Self {
        Self::new(
            Tier::SharedGroup { prefix },
            group,
            Some(partition),
            configuration,
        )
    }

    /// Returns the sharing tier.
    #[must_use]
    pub const fn tier(&self) -> &Tier {
        &self.tier
    }

    /// Returns the primary identifier.
    #[must_use]
    pub const fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Returns the secondary identifier, if any.
    #[must_use]
    pub const fn secondary(&self) -> Option<&Identifier> {
        self.secondary.as_ref()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn configuration(&self) -> Configuration {
        self.configuration
    }

    /// Returns the store access group for shared tiers.
    #[must_use]
    pub fn access_group(&self) -> Option<String> {
        match &self.tier {
            Tier::Standard => None,
            Tier::SharedGroup { prefix } => Some(format!("{prefix}.{}", self.identifier)),
        }
    }

    /// Derives the canonical fingerprint. See the module docs for the format.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut segments = vec![
            FINGERPRINT_PREFIX.to_string(),
            self.configuration.kind_token().to_string(),
            self.tier.token().to_string(),
        ];
        if let Tier::SharedGroup { prefix } = &self.tier {
            segments.push(escape(prefix.as_str()));
        }
        segments.push(escape(self.identifier.as_str()));
        if let Some(secondary) = &self.secondary {
            segments.push(escape(secondary.as_str()));
        }
        segments.push(self.configuration.access_policy().token());
        if let Some(suffix) = self.configuration.fingerprint_suffix() {
            segments.push(suffix);
        }
        segments.join(&SEPARATOR.to_string())
    }

    /// Derives the base query every operation on this scope starts from.
    #[must_use]
    pub fn base_query(&self) -> Query {
        let configuration = self.configuration;
        Query {
            service: Some(self.fingerprint()),
            access_group: self.access_group(),
            accessible: Some(configuration.access_policy().store_value().to_string()),
            access_control: configuration
                .access_control()
                .map(|control| control.store_flags().to_string()),
            synchronizable: configuration.is_synchronizable().then_some(true),
            ..Query::generic_password()
        }
    }
}

impl PartialEq for ScopeIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for ScopeIdentity {}

impl Hash for ScopeIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}

impl fmt::Display for ScopeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

fn escape(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for ch in segment.chars() {
        if ch == '\\' || ch == SEPARATOR {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
