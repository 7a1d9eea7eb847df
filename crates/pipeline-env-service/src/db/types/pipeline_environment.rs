use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use uuid::Uuid;

/// Space identifier.
///
/// Spaces are owned by an external service, this service only refers to them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SpaceId(pub Uuid);
impl Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pipeline environment identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct PipelineEnvironmentId(pub Uuid);
impl Display for PipelineEnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pipeline environment descriptor, the user-provided part of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineEnvironmentDescr {
    pub name: String,
    /// Environment UUIDs, in order.
    pub environments: Vec<Uuid>,
}

/// Pipeline environment as stored in the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedPipelineEnvironment {
    pub id: PipelineEnvironmentId,
    pub space_id: SpaceId,
    pub name: String,
    pub environments: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
