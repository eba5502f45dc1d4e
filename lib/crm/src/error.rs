//! Error types for the CRM boundary.

use std::fmt;

/// Errors from CRM operations.
///
/// Exactly two kinds, per the action-layer contract: an authentication
/// failure (the token is missing, expired, or lacks scope) or a generic
/// operation failure carrying the provider's diagnostic detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrmError {
    /// The provider rejected the credentials.
    Unauthorized { detail: String },
    /// The operation failed for any other reason.
    Operation { detail: String },
}

impl fmt::Display for CrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized { detail } => {
                write!(f, "crm authentication failed: {detail}")
            }
            Self::Operation { detail } => {
                write!(f, "crm operation failed: {detail}")
            }
        }
    }
}

impl std::error::Error for CrmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_display() {
        let err = CrmError::Unauthorized {
            detail: "expired token".to_string(),
        };
        assert!(err.to_string().contains("authentication failed"));
        assert!(err.to_string().contains("expired token"));
    }

    #[test]
    fn operation_display() {
        let err = CrmError::Operation {
            detail: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("operation failed"));
    }
}
