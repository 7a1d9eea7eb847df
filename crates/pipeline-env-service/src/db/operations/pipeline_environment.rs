use crate::db::error::DBError;
use crate::db::operations::utils::maybe_unique_violation;
use crate::db::types::pipeline_environment::{
    ExtendedPipelineEnvironment, PipelineEnvironmentDescr, PipelineEnvironmentId, SpaceId,
};
use deadpool_postgres::Transaction;
use tokio_postgres::Row;
use uuid::Uuid;

/// Columns of a pipeline environment row, without its environments.
const RETRIEVE_PIPELINE_ENVIRONMENT_COLUMNS: &str =
    "pe.id, pe.space_id, pe.name, pe.created_at, pe.updated_at";

/// Converts a pipeline environment row and its environments to the stored record.
fn row_to_extended_pipeline_environment(
    row: &Row,
    environments: Vec<Uuid>,
) -> ExtendedPipelineEnvironment {
    assert_eq!(row.len(), 5);
    ExtendedPipelineEnvironment {
        id: PipelineEnvironmentId(row.get(0)),
        space_id: SpaceId(row.get(1)),
        name: row.get(2),
        environments,
        created_at: row.get(3),
        updated_at: row.get(4),
    }
}

/// Retrieves the environments of a pipeline environment, in their original order.
async fn get_environments(
    txn: &Transaction<'_>,
    pipeline_environment_id: PipelineEnvironmentId,
) -> Result<Vec<Uuid>, DBError> {
    let stmt = txn
        .prepare_cached(
            "SELECT e.env_uuid
             FROM environments AS e
             WHERE e.pipeline_environment_id = $1
             ORDER BY e.position ASC",
        )
        .await?;
    let rows = txn.query(&stmt, &[&pipeline_environment_id.0]).await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Inserts a new pipeline environment together with its environments.
pub(crate) async fn new_pipeline_environment(
    txn: &Transaction<'_>,
    new_id: Uuid,
    space_id: SpaceId,
    descr: &PipelineEnvironmentDescr,
) -> Result<ExtendedPipelineEnvironment, DBError> {
    let stmt = txn
        .prepare_cached(&format!(
            "INSERT INTO pipeline_environments AS pe (id, space_id, name, created_at, updated_at)
             VALUES ($1, $2, $3, now(), now())
             RETURNING {RETRIEVE_PIPELINE_ENVIRONMENT_COLUMNS}"
        ))
        .await?;
    let row = txn
        .query_one(&stmt, &[&new_id, &space_id.0, &descr.name])
        .await
        .map_err(|e| maybe_unique_violation(e, space_id, &descr.name))?;

    let stmt = txn
        .prepare_cached(
            "INSERT INTO environments (pipeline_environment_id, position, env_uuid)
             VALUES ($1, $2, $3)",
        )
        .await?;
    for (position, env_uuid) in descr.environments.iter().enumerate() {
        let position = i32::try_from(position).map_err(|_| {
            DBError::invalid_data(format!("environment position {position} is out of range"))
        })?;
        txn.execute(&stmt, &[&new_id, &position, env_uuid])
            .await
            .map_err(|e| maybe_unique_violation(e, space_id, &descr.name))?;
    }

    Ok(row_to_extended_pipeline_environment(
        &row,
        descr.environments.clone(),
    ))
}

/// Retrieves the most recently created pipeline environment of the space.
pub(crate) async fn get_pipeline_environment_by_space(
    txn: &Transaction<'_>,
    space_id: SpaceId,
) -> Result<ExtendedPipelineEnvironment, DBError> {
    let stmt = txn
        .prepare_cached(&format!(
            "SELECT {RETRIEVE_PIPELINE_ENVIRONMENT_COLUMNS}
             FROM pipeline_environments AS pe
             WHERE pe.space_id = $1
             ORDER BY pe.created_at DESC, pe.id DESC
             LIMIT 1"
        ))
        .await?;
    let row = txn
        .query_opt(&stmt, &[&space_id.0])
        .await?
        .ok_or(DBError::UnknownPipelineEnvironment { space_id })?;
    let environments = get_environments(txn, PipelineEnvironmentId(row.get(0))).await?;
    Ok(row_to_extended_pipeline_environment(&row, environments))
}
