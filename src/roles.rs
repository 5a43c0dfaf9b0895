//! Role-tag resolution.
//!
//! Writes are strict: every requested role-tag name must resolve.  Reads
//! are lenient: identifiers that no longer resolve are dropped from the
//! displayed `role-tag` header.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::GatewayError;
use crate::identity::IdentityService;

static ROLE_TAG_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("valid regex"));

/// Split a comma-separated role-tag list into names.
///
/// A blank value yields no names.  Empty names inside a list are kept so
/// that strict resolution rejects them.
pub fn split_role_tags(value: &str) -> Vec<String> {
    let value = value.trim();
    if value.is_empty() {
        return Vec::new();
    }
    ROLE_TAG_SEPARATOR
        .split(value)
        .map(str::to_string)
        .collect()
}

/// Resolve role names to identifiers, in the order given.
///
/// Fails with [`GatewayError::UnknownRole`] naming the first name that
/// does not resolve.
pub async fn resolve_role_names(
    identity: &dyn IdentityService,
    account_uuid: &str,
    names: &[String],
) -> Result<Vec<String>, GatewayError> {
    let lookup = identity
        .resolve_names(account_uuid, names)
        .await
        .map_err(GatewayError::Upstream)?;

    names
        .iter()
        .map(|name| match lookup.get(name) {
            Some(Some(uuid)) => Ok(uuid.clone()),
            _ => Err(GatewayError::UnknownRole { name: name.clone() }),
        })
        .collect()
}

/// Render role identifiers as the `role-tag` header value.
///
/// Returns `None` when there is nothing to display.
pub async fn display_role_tags(
    identity: &dyn IdentityService,
    identifiers: &[String],
) -> Result<Option<String>, GatewayError> {
    if identifiers.is_empty() {
        return Ok(None);
    }

    let lookup = identity
        .resolve_identifiers(identifiers)
        .await
        .map_err(GatewayError::Upstream)?;

    let names: Vec<&str> = identifiers
        .iter()
        .filter_map(|id| lookup.get(id).map(String::as_str))
        .collect();
    Ok(Some(names.join(", ")))
}
