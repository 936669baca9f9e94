//! Identifier validation for table and bucket names.
//!
//! Disk-backed adapters interpolate the configured table or bucket name into
//! dynamically built statements and filesystem paths. This check runs at
//! construction, before any identifier reaches statement construction, and
//! rejects everything outside a conservative charset. It is a security
//! control, not a data constraint.

use crate::error::{Error, Result};

/// Validates a table or bucket identifier.
///
/// Accepts only non-empty sequences of ASCII letters, digits, and underscore.
/// `role` names the identifier's position ("table", "bucket") and is carried
/// in the error.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] for an empty name or any character
/// outside `[A-Za-z0-9_]`.
pub(crate) fn validate_identifier<'a>(name: &'a str, role: &'static str) -> Result<&'a str> {
    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err(Error::invalid_identifier(role, name));
    }
    Ok(name)
}
