use thiserror::Error;

/// Rejected job submission. `details` lists every failing field so the
/// client can show all problems at once.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid input: {}", .details.join("; "))]
pub struct ValidationError {
    pub details: Vec<String>,
}

impl ValidationError {
    pub fn new(details: Vec<String>) -> Self {
        Self { details }
    }
}
