//! Error types for the ax CLI
//!
//! Every failure that reaches the dispatcher is one of four kinds, each with a
//! fixed process exit status. Capability store failures are folded into these
//! kinds at the boundary.

use crate::store::StoreError;
use thiserror::Error;

/// Failures surfaced to the caller of `ax`
#[derive(Debug, Error)]
pub enum AxError {
    /// Element, application or attribute is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// The accessibility or capture subsystem refused access
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The target resolved but the platform call failed
    #[error("action failed: {0}")]
    ActionFailed(String),

    /// Malformed address, key combination or flag value
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl AxError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn action_failed(message: impl Into<String>) -> Self {
        Self::ActionFailed(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    /// Create an error for an element id that could not be resolved
    pub fn element_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("element {} not found", id))
    }

    /// Process exit status for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) => 2,
            Self::PermissionDenied(_) => 3,
            Self::ActionFailed(_) => 4,
            Self::InvalidArguments(_) => 5,
        }
    }
}

impl From<StoreError> for AxError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PermissionDenied => Self::PermissionDenied(err.to_string()),
            StoreError::InvalidElement => Self::NotFound(err.to_string()),
            StoreError::Platform { .. } | StoreError::Unsupported(_) => {
                Self::ActionFailed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            AxError::not_found("x").exit_code(),
            AxError::PermissionDenied("x".into()).exit_code(),
            AxError::action_failed("x").exit_code(),
            AxError::invalid("x").exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_element_not_found_message() {
        let err = AxError::element_not_found("42:99");
        assert_eq!(err.to_string(), "not found: element 42:99 not found");
    }

    #[test]
    fn test_store_error_mapping() {
        // 事後条件: 権限エラーは PermissionDenied、無効な要素は NotFound に写像される
        assert!(matches!(
            AxError::from(StoreError::PermissionDenied),
            AxError::PermissionDenied(_)
        ));
        assert!(matches!(
            AxError::from(StoreError::InvalidElement),
            AxError::NotFound(_)
        ));
        let err = AxError::from(StoreError::Platform {
            code: -25205,
            context: "AXPress".into(),
        });
        assert!(matches!(err, AxError::ActionFailed(_)));
        assert!(err.to_string().contains("-25205"));
    }
}
