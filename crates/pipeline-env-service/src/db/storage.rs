use crate::db::error::DBError;
use crate::db::types::pipeline_environment::{
    ExtendedPipelineEnvironment, PipelineEnvironmentDescr, SpaceId,
};
use async_trait::async_trait;
use uuid::Uuid;

/// The storage trait contains the methods to interact with the pipeline
/// environments database.
///
/// Every method runs in its own transaction. The uniqueness of a name within
/// a space is enforced by the database, not by callers.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Checks whether the database can be connected to.
    async fn check_connection(&self) -> Result<(), DBError>;

    /// Creates a new pipeline environment in the space.
    ///
    /// Fails with [`DBError::DuplicateName`] if the space already has a
    /// pipeline environment with the same name.
    async fn new_pipeline_environment(
        &self,
        new_id: Uuid,
        space_id: SpaceId,
        descr: PipelineEnvironmentDescr,
    ) -> Result<ExtendedPipelineEnvironment, DBError>;

    /// Retrieves the most recently created pipeline environment of the space.
    ///
    /// Fails with [`DBError::UnknownPipelineEnvironment`] if there is none.
    async fn get_pipeline_environment_by_space(
        &self,
        space_id: SpaceId,
    ) -> Result<ExtendedPipelineEnvironment, DBError>;
}
