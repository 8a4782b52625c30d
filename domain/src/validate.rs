//! Request validation rules shared by the write-path services.

use crate::DomainError;

/// A title is required for both resources; the database never sees a write
/// with an empty title.
pub fn validate_title(title: &str) -> Result<(), DomainError> {
    if title.is_empty() {
        return Err(DomainError::TitleRequired);
    }
    Ok(())
}

/// Resolve the priority to store: an empty request value falls back to the
/// default.
pub fn effective_priority(priority: &str) -> String {
    if priority.is_empty() {
        crate::DEFAULT_PRIORITY.to_string()
    } else {
        priority.to_string()
    }
}
