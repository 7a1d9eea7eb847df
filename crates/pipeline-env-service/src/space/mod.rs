//! Lookup of the spaces that pipeline environments belong to.
//!
//! Spaces live in an external service. Before a pipeline environment is
//! created, the space it names must be known to that service.
use crate::db::types::pipeline_environment::SpaceId;
use async_trait::async_trait;

pub mod error;
pub mod wit;

pub use error::SpaceError;

/// The parts of a space this service cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpaceInfo {
    pub id: SpaceId,
    pub name: String,
    pub description: Option<String>,
    /// Identifier of the owning identity.
    pub owner: Option<String>,
}

#[async_trait]
pub trait SpaceLookup: Send + Sync {
    /// Looks up the space, on behalf of the caller whose bearer token is given.
    async fn lookup(&self, space_id: SpaceId, token: Option<&str>)
        -> Result<SpaceInfo, SpaceError>;
}
