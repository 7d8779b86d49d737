//! Shape checks on migration source queries. No store access happens here.

use vaultscope_store::{AttrKey, ItemClass, MatchLimit, Query};

use crate::error::QueryViolation;

/// Checks `source` against the shape a migration needs.
///
/// `destination` is the destination's base query. A source naming the
/// destination's service is rejected here; overlap through other attributes
/// is caught once the matches are known.
pub(crate) fn validate_source(source: &Query, destination: &Query) -> Result<(), QueryViolation> {
    if source.class != Some(ItemClass::GenericPassword) {
        return Err(QueryViolation::NotGenericPassword);
    }
    if source.match_limit != Some(MatchLimit::All) {
        return Err(QueryViolation::NotMatchAll);
    }
    if !source.return_attributes {
        return Err(QueryViolation::AttributesNotRequested);
    }
    if source.return_data {
        return Err(QueryViolation::DataRequested);
    }
    if source.return_ref {
        return Err(QueryViolation::ReferenceRequested);
    }
    if !source.return_persistent_ref {
        return Err(QueryViolation::PersistentReferenceNotRequested);
    }
    if source.access_control.is_some() {
        return Err(QueryViolation::AccessControlConstraint);
    }
    if let Some(key) = source
        .extra
        .keys()
        .find(|key| !matches!(AttrKey::from_name(key.as_str()), AttrKey::Other(_)))
    {
        return Err(QueryViolation::ReservedAttribute(key.as_str().to_string()));
    }
    if source.service.is_some() && source.service == destination.service {
        return Err(QueryViolation::OverlapsDestination);
    }
    Ok(())
}
