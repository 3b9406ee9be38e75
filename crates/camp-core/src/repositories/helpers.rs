//! Input validation shared by the repository services.

use crate::{CoreError, CoreResult};
use camp_types::{EmailAddress, NonEmptyText, PhoneNumber};
use camp_uuid::ShardableUuid;

/// Trimmed, non-empty text.
pub(crate) fn required_text(field: &str, value: &str) -> CoreResult<NonEmptyText> {
    NonEmptyText::new(value).map_err(|_| CoreError::invalid(format!("{} is required", field)))
}

/// Trimmed text; blank becomes `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_email(field: &str, value: &str) -> CoreResult<EmailAddress> {
    EmailAddress::parse(value).map_err(|e| CoreError::invalid(format!("{}: {}", field, e)))
}

pub(crate) fn optional_email(field: &str, value: Option<String>) -> CoreResult<Option<EmailAddress>> {
    optional_text(value)
        .map(|v| parse_email(field, &v))
        .transpose()
}

pub(crate) fn optional_phone(field: &str, value: Option<String>) -> CoreResult<Option<PhoneNumber>> {
    optional_text(value)
        .map(|v| PhoneNumber::parse(&v).map_err(|e| CoreError::invalid(format!("{}: {}", field, e))))
        .transpose()
}

/// Parses an identifier supplied by a caller. `what` names the entity in the error.
pub(crate) fn parse_id(what: &str, raw: &str) -> CoreResult<ShardableUuid> {
    ShardableUuid::parse(raw.trim())
        .map_err(|_| CoreError::invalid(format!("invalid {} id '{}'", what, raw)))
}

pub(crate) fn optional_id(what: &str, raw: Option<String>) -> CoreResult<Option<ShardableUuid>> {
    optional_text(raw).map(|v| parse_id(what, &v)).transpose()
}
