use crate::db::error::DBError;
use deadpool_postgres::Transaction;

/// Round trip behind `/healthz`: a trivial query on the pipeline environments
/// database, succeeding when the server answers within the transaction.
pub async fn check_connection(txn: &Transaction<'_>) -> Result<(), DBError> {
    let stmt = txn.prepare_cached("SELECT 1").await?;
    txn.execute(&stmt, &[]).await?;
    Ok(())
}
