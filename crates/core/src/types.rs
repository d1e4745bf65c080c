/// Server-assigned job identifier.
pub type JobId = String;

/// Server-assigned identifier of an uploaded audio file.
pub type FileId = String;

/// All local timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
