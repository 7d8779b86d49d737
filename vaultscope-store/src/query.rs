//! Typed store requests.

use std::collections::BTreeMap;

use crate::error::{StoreError, StoreResult};
use crate::wire::{AttrKey, AttrValue, PersistentRef, WireQuery};

/// Item class of a store record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemClass {
    /// Generic password; the only class scopes read and write.
    GenericPassword,
    /// Internet password.
    InternetPassword,
    /// Cryptographic key.
    Key,
    /// Certificate.
    Certificate,
}

impl ItemClass {
    /// Returns the platform class value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenericPassword => "genp",
            Self::InternetPassword => "inet",
            Self::Key => "keys",
            Self::Certificate => "cert",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "genp" => Some(Self::GenericPassword),
            "inet" => Some(Self::InternetPassword),
            "keys" => Some(Self::Key),
            "cert" => Some(Self::Certificate),
            _ => None,
        }
    }
}

/// How many matches a query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchLimit {
    /// Return the first match only.
    One,
    /// Return every match.
    All,
}

impl MatchLimit {
    /// Returns the platform match-limit value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::One => "m_LimitOne",
            Self::All => "m_LimitAll",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "m_LimitOne" => Some(Self::One),
            "m_LimitAll" => Some(Self::All),
            _ => None,
        }
    }
}

/// Typed store request.
///
/// Every attribute the core reasons about has a named field. Attributes it
/// does not model are carried in [`Query::extra`] and passed through. The
/// untyped [`WireQuery`] is produced only by [`Query::to_wire`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Item class.
    pub class: Option<ItemClass>,
    /// Service attribute.
    pub service: Option<String>,
    /// Account attribute.
    pub account: Option<String>,
    /// Access group.
    pub access_group: Option<String>,
    /// Accessibility attribute value.
    pub accessible: Option<String>,
    /// Access-control flags.
    pub access_control: Option<String>,
    /// Cloud synchronization flag.
    pub synchronizable: Option<bool>,
    /// Match limit.
    pub match_limit: Option<MatchLimit>,
    /// Request matched attributes.
    pub return_attributes: bool,
    /// Request the secret payload.
    pub return_data: bool,
    /// Request an item reference.
    pub return_ref: bool,
    /// Request a persistent reference.
    pub return_persistent_ref: bool,
    /// Match by persistent reference.
    pub persistent_ref: Option<PersistentRef>,
    /// Prompt shown if the store needs user presence.
    pub operation_prompt: Option<String>,
    /// Pre-evaluated authentication context.
    pub auth_context: Option<Vec<u8>>,
    /// Attributes without a typed field.
    pub extra: BTreeMap<AttrKey, AttrValue>,
}

impl Query {
    /// Creates an empty generic-password query.
    #[must_use]
    pub fn generic_password() -> Self {
        Self {
            class: Some(ItemClass::GenericPassword),
            ..Self::default()
        }
    }

    /// Returns a copy constrained to `account`.
    #[must_use]
    pub fn with_account(&self, account: &str) -> Self {
        Self {
            account: Some(account.to_string()),
            ..self.clone()
        }
    }

    /// Returns a copy asking for the secret payload of one item.
    #[must_use]
    pub fn for_data(&self) -> Self {
        Self {
            match_limit: Some(MatchLimit::One),
            return_data: true,
            ..self.clone()
        }
    }

    /// Returns a copy asking for attributes of every matching item.
    #[must_use]
    pub fn for_attributes(&self) -> Self {
        Self {
            match_limit: Some(MatchLimit::All),
            return_attributes: true,
            ..self.clone()
        }
    }

    /// Returns a copy with the shape migration sources must have: match all,
    /// return attributes and persistent references, never data or refs.
    #[must_use]
    pub fn for_migration(&self) -> Self {
        Self {
            match_limit: Some(MatchLimit::All),
            return_attributes: true,
            return_data: false,
            return_ref: false,
            return_persistent_ref: true,
            ..self.clone()
        }
    }

    /// Returns a copy with every request-shaping field removed, suitable for
    /// `delete` and as the match half of `update`.
    #[must_use]
    pub fn for_delete(&self) -> Self {
        Self {
            match_limit: None,
            return_attributes: false,
            return_data: false,
            return_ref: false,
            return_persistent_ref: false,
            operation_prompt: None,
            extra: self
                .extra
                .iter()
                .filter(|(key, _)| !key.is_request_only())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            ..self.clone()
        }
    }

    /// Converts to the untyped dictionary the store consumes.
    ///
    /// Typed fields take precedence over same-named entries in `extra`.
    #[must_use]
    pub fn to_wire(&self) -> WireQuery {
        let mut wire = self.extra.clone();
        if let Some(class) = self.class {
            wire.insert(AttrKey::Class, class.as_str().into());
        }
        if let Some(service) = &self.service {
            wire.insert(AttrKey::Service, service.as_str().into());
        }
        if let Some(account) = &self.account {
            wire.insert(AttrKey::Account, account.as_str().into());
        }
        if let Some(group) = &self.access_group {
            wire.insert(AttrKey::AccessGroup, group.as_str().into());
        }
        if let Some(accessible) = &self.accessible {
            wire.insert(AttrKey::Accessible, accessible.as_str().into());
        }
        if let Some(control) = &self.access_control {
            wire.insert(AttrKey::AccessControl, control.as_str().into());
        }
        if let Some(sync) = self.synchronizable {
            wire.insert(AttrKey::Synchronizable, sync.into());
        }
        if let Some(limit) = self.match_limit {
            wire.insert(AttrKey::MatchLimit, limit.as_str().into());
        }
        for (flag, key) in [
            (self.return_attributes, AttrKey::ReturnAttributes),
            (self.return_data, AttrKey::ReturnData),
            (self.return_ref, AttrKey::ReturnRef),
            (self.return_persistent_ref, AttrKey::ReturnPersistentRef),
        ] {
            if flag {
                wire.insert(key, true.into());
            }
        }
        if let Some(reference) = &self.persistent_ref {
            wire.insert(AttrKey::PersistentRef, reference.0.clone().into());
        }
        if let Some(prompt) = &self.operation_prompt {
            wire.insert(AttrKey::OperationPrompt, prompt.as_str().into());
        }
        if let Some(context) = &self.auth_context {
            wire.insert(AttrKey::AuthContext, context.clone().into());
        }
        wire
    }
}

fn expect_string(key: &AttrKey, value: AttrValue) -> StoreResult<String> {
    match value {
        AttrValue::String(value) => Ok(value),
        other => Err(StoreError::malformed(
            key.clone(),
            format!("expected string, got {other:?}"),
        )),
    }
}

fn expect_bool(key: &AttrKey, value: &AttrValue) -> StoreResult<bool> {
    value.as_bool().ok_or_else(|| {
        StoreError::malformed(key.clone(), format!("expected bool, got {value:?}"))
    })
}

fn expect_data(key: &AttrKey, value: AttrValue) -> StoreResult<Vec<u8>> {
    match value {
        AttrValue::Data(value) => Ok(value),
        other => Err(StoreError::malformed(
            key.clone(),
            format!("expected data, got {other:?}"),
        )),
    }
}

impl TryFrom<WireQuery> for Query {
    type Error = StoreError;

    /// Lifts a caller-supplied dictionary into a typed query.
    ///
    /// Unknown keys are kept in `extra`. A known key with a value of the
    /// wrong type is rejected.
    fn try_from(wire: WireQuery) -> StoreResult<Self> {
        let mut query = Self::default();
        for (key, value) in wire {
            match key {
                AttrKey::Class => {
                    let name = expect_string(&key, value)?;
                    query.class = Some(ItemClass::from_name(&name).ok_or_else(|| {
                        StoreError::malformed(key.clone(), format!("unknown class {name}"))
                    })?);
                }
                AttrKey::Service => query.service = Some(expect_string(&key, value)?),
                AttrKey::Account => query.account = Some(expect_string(&key, value)?),
                AttrKey::AccessGroup => {
                    query.access_group = Some(expect_string(&key, value)?);
                }
                AttrKey::Accessible => query.accessible = Some(expect_string(&key, value)?),
                AttrKey::AccessControl => {
                    query.access_control = Some(expect_string(&key, value)?);
                }
                AttrKey::Synchronizable => {
                    query.synchronizable = Some(expect_bool(&key, &value)?);
                }
                AttrKey::MatchLimit => {
                    let name = expect_string(&key, value)?;
                    query.match_limit = Some(MatchLimit::from_name(&name).ok_or_else(|| {
                        StoreError::malformed(key.clone(), format!("unknown limit {name}"))
                    })?);
                }
                AttrKey::ReturnAttributes => query.return_attributes = expect_bool(&key, &value)?,
                AttrKey::ReturnData => query.return_data = expect_bool(&key, &value)?,
                AttrKey::ReturnRef => query.return_ref = expect_bool(&key, &value)?,
                AttrKey::ReturnPersistentRef => {
                    query.return_persistent_ref = expect_bool(&key, &value)?;
                }
                AttrKey::PersistentRef => {
                    query.persistent_ref = Some(PersistentRef(expect_data(&key, value)?));
                }
                AttrKey::OperationPrompt => {
                    query.operation_prompt = Some(expect_string(&key, value)?);
                }
                AttrKey::AuthContext => query.auth_context = Some(expect_data(&key, value)?),
                AttrKey::ValueData | AttrKey::Other(_) => {
                    query.extra.insert(key, value);
                }
            }
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wire_only_emits_set_fields() {
        let wire = Query::generic_password().to_wire();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire.get(&AttrKey::Class), Some(&AttrValue::from("genp")));
    }

    #[test]
    fn test_typed_fields_override_extra() {
        let mut query = Query::generic_password();
        query.service = Some("typed".to_string());
        query
            .extra
            .insert(AttrKey::Service, AttrValue::from("untyped"));
        let wire = query.to_wire();
        assert_eq!(wire.get(&AttrKey::Service), Some(&AttrValue::from("typed")));
    }

    #[test]
    fn test_wire_round_trip_keeps_unknown_keys() {
        let mut query = Query::generic_password().for_migration();
        query.service = Some("svc".to_string());
        query
            .extra
            .insert(AttrKey::Other("labl".to_string()), AttrValue::from("label"));

        let lifted = Query::try_from(query.to_wire()).expect("lift");
        assert_eq!(lifted, query);
    }

    #[test]
    fn test_try_from_rejects_wrongly_typed_flag() {
        let mut wire = WireQuery::new();
        wire.insert(AttrKey::ReturnData, AttrValue::from("yes"));
        let err = Query::try_from(wire).expect_err("must reject");
        assert!(matches!(
            err,
            StoreError::MalformedAttribute {
                key: AttrKey::ReturnData,
                ..
            }
        ));
    }

    #[test]
    fn test_for_delete_strips_request_shape() {
        let mut query = Query::generic_password().for_migration().for_data();
        query.service = Some("svc".to_string());
        query.operation_prompt = Some("unlock".to_string());
        query
            .extra
            .insert(AttrKey::ReturnRef, AttrValue::Bool(true));

        let delete = query.for_delete();
        assert_eq!(delete.match_limit, None);
        assert!(!delete.return_attributes);
        assert!(!delete.return_data);
        assert!(!delete.return_persistent_ref);
        assert!(delete.operation_prompt.is_none());
        assert!(delete.extra.is_empty());
        assert_eq!(delete.service.as_deref(), Some("svc"));
    }
}
