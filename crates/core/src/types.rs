/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// External handle for a build job. Always a validated project id.
pub type JobId = String;
