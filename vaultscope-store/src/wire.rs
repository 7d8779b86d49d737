//! Untyped attribute dictionaries as the platform store sees them.

use std::collections::BTreeMap;
use std::fmt;

/// Attribute key in a wire dictionary.
///
/// Known keys carry the platform's short attribute names. Keys the typed
/// [`Query`](crate::Query) does not model travel as [`AttrKey::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttrKey {
    /// Item class.
    Class,
    /// Service attribute; scopes store their fingerprint here.
    Service,
    /// Account attribute; scopes store the record key here.
    Account,
    /// Access group.
    AccessGroup,
    /// Accessibility level.
    Accessible,
    /// Access-control flags.
    AccessControl,
    /// Cloud synchronization flag.
    Synchronizable,
    /// Match limit (`one` or `all`).
    MatchLimit,
    /// Request matched attributes in the result.
    ReturnAttributes,
    /// Request the secret payload in the result.
    ReturnData,
    /// Request an item reference in the result.
    ReturnRef,
    /// Request a persistent reference in the result.
    ReturnPersistentRef,
    /// Match by persistent reference.
    PersistentRef,
    /// Secret payload.
    ValueData,
    /// Prompt shown when the store needs user presence.
    OperationPrompt,
    /// Pre-evaluated authentication context.
    AuthContext,
    /// Any attribute not modelled above.
    Other(String),
}

impl AttrKey {
    /// Returns the platform attribute name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Class => "class",
            Self::Service => "svce",
            Self::Account => "acct",
            Self::AccessGroup => "agrp",
            Self::Accessible => "pdmn",
            Self::AccessControl => "accc",
            Self::Synchronizable => "sync",
            Self::MatchLimit => "m_Limit",
            Self::ReturnAttributes => "r_Attributes",
            Self::ReturnData => "r_Data",
            Self::ReturnRef => "r_Ref",
            Self::ReturnPersistentRef => "r_PersistentRef",
            Self::PersistentRef => "v_PersistentRef",
            Self::ValueData => "v_Data",
            Self::OperationPrompt => "u_OpPrompt",
            Self::AuthContext => "u_AuthCtx",
            Self::Other(name) => name,
        }
    }

    /// Parses a platform attribute name, falling back to [`AttrKey::Other`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "class" => Self::Class,
            "svce" => Self::Service,
            "acct" => Self::Account,
            "agrp" => Self::AccessGroup,
            "pdmn" => Self::Accessible,
            "accc" => Self::AccessControl,
            "sync" => Self::Synchronizable,
            "m_Limit" => Self::MatchLimit,
            "r_Attributes" => Self::ReturnAttributes,
            "r_Data" => Self::ReturnData,
            "r_Ref" => Self::ReturnRef,
            "r_PersistentRef" => Self::ReturnPersistentRef,
            "v_PersistentRef" => Self::PersistentRef,
            "v_Data" => Self::ValueData,
            "u_OpPrompt" => Self::OperationPrompt,
            "u_AuthCtx" => Self::AuthContext,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns `true` for keys that shape a request rather than describe an
    /// item. These are never persisted on an item.
    #[must_use]
    pub const fn is_request_only(&self) -> bool {
        matches!(
            self,
            Self::MatchLimit
                | Self::ReturnAttributes
                | Self::ReturnData
                | Self::ReturnRef
                | Self::ReturnPersistentRef
                | Self::PersistentRef
                | Self::ValueData
                | Self::OperationPrompt
                | Self::AuthContext
        )
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute value in a wire dictionary.
#[derive(Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Data(Vec<u8>),
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
}

impl AttrValue {
    /// Returns the string payload, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the byte payload, if this is a data value.
    #[must_use]
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the flag, if this is a boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

// Data values may hold secrets; only their length is printed.
impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => write!(f, "String({value:?})"),
            Self::Data(value) => write!(f, "Data(<{} bytes>)", value.len()),
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Integer(value) => write!(f, "Integer({value})"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Data(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Untyped attribute dictionary passed to a [`SecureStore`](crate::SecureStore).
pub type WireQuery = BTreeMap<AttrKey, AttrValue>;

/// Opaque token the store issues per item to re-fetch it later.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PersistentRef(pub Vec<u8>);

impl PersistentRef {
    /// Returns the raw token bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PersistentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersistentRef({})", hex::encode(&self.0))
    }
}

/// A single item returned by a query.
///
/// Which parts are populated depends on the `return` flags of the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    /// Matched attributes (empty unless attributes were requested).
    pub attributes: WireQuery,
    /// Secret payload (present only if data was requested).
    pub data: Option<Vec<u8>>,
    /// Persistent reference (present only if it was requested).
    pub persistent_ref: Option<PersistentRef>,
}

impl Item {
    /// Returns the raw account attribute, whatever its encoding.
    #[must_use]
    pub fn account(&self) -> Option<&AttrValue> {
        self.attributes.get(&AttrKey::Account)
    }

    /// Returns the service attribute when it is a string.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.attributes.get(&AttrKey::Service).and_then(AttrValue::as_str)
    }
}

/// Result of a successful `copy_matching` call.
///
/// The platform returns a bare item for `match one` queries and a list for
/// `match all` queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// Single-result shape.
    One(Item),
    /// Multi-result shape.
    Many(Vec<Item>),
}

impl QueryResult {
    /// Normalizes both shapes into a list.
    #[must_use]
    pub fn into_items(self) -> Vec<Item> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }

    /// Returns the first item of either shape.
    #[must_use]
    pub fn into_first(self) -> Option<Item> {
        self.into_items().into_iter().next()
    }
}
