/// Job primary keys are random UUIDs generated at submission time.
pub type JobId = uuid::Uuid;

/// User ids are issued by the external auth service (token `sub` claim).
pub type UserId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
