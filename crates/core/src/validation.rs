//! Input validation utilities.
//!
//! This module contains functions for validating user inputs before they are stored in the
//! registry.

use crate::constants::{NAME_MAX_LEN, USERNAME_MAX_LEN};
use crate::{RegistryError, RegistryResult};
use mdr_types::NonEmptyText;

/// Validates the name of an item, workgroup, authority or vocabulary entry.
///
/// Names are trimmed and must be non-empty and at most [`NAME_MAX_LEN`] characters. Line
/// breaks are rejected because names are embedded in role group names and notification text.
///
/// # Errors
///
/// Returns a `RegistryError::Text` or `RegistryError::InvalidInput` if the name is invalid.
pub fn validate_name(name: &str) -> RegistryResult<NonEmptyText> {
    let text = NonEmptyText::with_max_len(name, NAME_MAX_LEN)?;
    if text.as_str().contains(['\n', '\r']) {
        return Err(RegistryError::InvalidInput(
            "names must not contain line breaks".into(),
        ));
    }
    Ok(text)
}

/// Validates a username.
///
/// Usernames follow the conservative character set used by most account systems: ASCII
/// alphanumerics and `@`, `.`, `+`, `-`, `_`, bounded to [`USERNAME_MAX_LEN`] characters.
///
/// # Errors
///
/// Returns a `RegistryError::InvalidInput` if the username is invalid.
pub fn validate_username(username: &str) -> RegistryResult<NonEmptyText> {
    let text = NonEmptyText::with_max_len(username, USERNAME_MAX_LEN)?;

    let ok = text
        .as_str()
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'@' | b'.' | b'+' | b'-' | b'_'));

    if !ok {
        return Err(RegistryError::InvalidInput(format!(
            "username contains invalid characters (only alphanumeric, '@', '.', '+', '-', '_' allowed): {}",
            text
        )));
    }

    Ok(text)
}
