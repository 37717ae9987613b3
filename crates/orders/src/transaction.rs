//! Ending a unit of work according to the outcome of its steps.

use store::Transaction;

use crate::error::Result;

/// Commits `tx` if `outcome` is Ok, otherwise rolls it back and returns the
/// original error.
///
/// Every engine funnels its transaction through here so that each exit path
/// releases the transaction exactly once. A failed rollback is logged and the
/// step's error is still the one surfaced.
pub(crate) async fn settle<T, Tx: Transaction>(
    tx: Tx,
    operation: &'static str,
    outcome: Result<T>,
) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            tracing::debug!(operation, error = %err, "rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(operation, error = %rollback_err, "rollback failed");
            }
            metrics::counter!("transactions_rolled_back_total", "operation" => operation)
                .increment(1);
            Err(err)
        }
    }
}
