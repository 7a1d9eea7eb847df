use crate::db::error::DBError;
use crate::db::types::pipeline_environment::SpaceId;
use tokio_postgres::error::Error as PgError;

/// Converts the Postgres error of an insert into our `DBError`.
/// If the underlying Postgres error is a unique constraint violation,
/// it is already mapped to the corresponding specific `DBError`.
pub(crate) fn maybe_unique_violation(err: PgError, space_id: SpaceId, name: &str) -> DBError {
    if let Some(db_err) = err.as_db_error() {
        if db_err.code() == &tokio_postgres::error::SqlState::UNIQUE_VIOLATION {
            // Unique constraints
            match db_err.constraint() {
                Some("pipeline_environments_pkey") => {
                    DBError::unique_key_violation("pipeline_environments_pkey")
                }
                Some("environments_pkey") => DBError::unique_key_violation("environments_pkey"),
                _ => DBError::DuplicateName {
                    space_id,
                    name: name.to_string(),
                },
            }
        } else {
            // Other database errors
            DBError::from(err)
        }
    } else {
        // It was a Postgres error which was not directly related to the database.
        // For example: network, parsing, serialization, TLS, I/O, timeouts etc.
        DBError::from(err)
    }
}
