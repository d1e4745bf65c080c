/// Local precondition and validation failures.
///
/// These are raised before any network call is made, so a caller seeing
/// one of them knows the remote service was never contacted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Prerequisite not met: {0}")]
    Prerequisite(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}
