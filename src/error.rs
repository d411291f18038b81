//! Error handling for the admission core.
//!
//! A small set of named variants rather than a generic boxed error, since
//! every failure mode here is a validation fault the caller can act on
//! directly (there is no I/O, parsing, or third-party error to wrap).
//!
//! Validation failure is distinct from a policy outcome:
//! a non-positive `max_requests` or an empty `tenant_id` is a programming
//! fault returned as `Err`, never folded into [`crate::CheckResult`].

use std::fmt;

/// A validation failure at the admission boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `tenant_id`, `client_id` or `action_type` was empty.
    EmptyIdentifier(&'static str),
    /// `max_requests` was zero.
    NonPositiveMaxRequests,
    /// `window` was zero.
    NonPositiveWindow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyIdentifier(field) => write!(f, "{field} must not be empty"),
            Error::NonPositiveMaxRequests => write!(f, "max_requests must be positive"),
            Error::NonPositiveWindow => write!(f, "window must be positive"),
        }
    }
}

impl std::error::Error for Error {}

/// Validates a [`Key`](crate::Key) and [`Policy`](crate::Policy) pair before
/// any component is touched.
pub(crate) fn validate(key: &crate::Key, policy: &crate::Policy) -> Result<(), Error> {
    if key.tenant_id.is_empty() {
        return Err(Error::EmptyIdentifier("tenant_id"));
    }
    if key.client_id.is_empty() {
        return Err(Error::EmptyIdentifier("client_id"));
    }
    if key.action_type.is_empty() {
        return Err(Error::EmptyIdentifier("action_type"));
    }
    if policy.max_requests == 0 {
        return Err(Error::NonPositiveMaxRequests);
    }
    if policy.window.is_zero() {
        return Err(Error::NonPositiveWindow);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Key, Policy};
    use std::time::Duration;

    #[test]
    fn rejects_empty_identifiers() {
        let policy = Policy::new(1, Duration::from_secs(1));
        assert_eq!(
            validate(&Key::new("", "c", "a"), &policy),
            Err(Error::EmptyIdentifier("tenant_id"))
        );
        assert_eq!(
            validate(&Key::new("t", "", "a"), &policy),
            Err(Error::EmptyIdentifier("client_id"))
        );
        assert_eq!(
            validate(&Key::new("t", "c", ""), &policy),
            Err(Error::EmptyIdentifier("action_type"))
        );
    }

    #[test]
    fn rejects_non_positive_policy() {
        let key = Key::new("t", "c", "a");
        assert_eq!(
            validate(&key, &Policy::new(0, Duration::from_secs(1))),
            Err(Error::NonPositiveMaxRequests)
        );
        assert_eq!(
            validate(&key, &Policy::new(1, Duration::from_secs(0))),
            Err(Error::NonPositiveWindow)
        );
    }

    #[test]
    fn accepts_valid_input() {
        let key = Key::new("t", "c", "a");
        assert!(validate(&key, &Policy::new(1, Duration::from_secs(1))).is_ok());
    }
}
