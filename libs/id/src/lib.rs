//! # hoster-id
//!
//! Typed reference ids for the hoster control plane.
//!
//! ## Design Principles
//!
//! - Ids are opaque references handed out by the resource store; this crate never
//!   interprets their contents beyond basic validation
//! - Ids are typed so a node reference can never be passed where a deployment is expected
//! - Freshly minted ids use the `{prefix}_{ulid}` form, but any well-formed reference
//!   coming back from the store is accepted as-is
//!
//! ## Validation
//!
//! A reference is accepted when it is non-empty, at most [`MAX_ID_LENGTH`] bytes and
//! contains only ASCII alphanumerics, `-`, `_`, `.` or `:`.
//!
//! Examples:
//! - `node_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `dep_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `local` (the local node sentinel)

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

/// Maximum accepted length of a reference id in bytes.
pub const MAX_ID_LENGTH: usize = 128;

/// Validate the characters and length of a reference id.
pub fn validate_ref(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    if s.len() > MAX_ID_LENGTH {
        return Err(IdError::TooLong {
            max: MAX_ID_LENGTH,
            actual: s.len(),
        });
    }
    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
    {
        return Err(IdError::InvalidCharacter(c));
    }
    Ok(())
}
