//! Transaction coordinator.
//!
//! A unit of work is a closure over a [`Queries`] handle. [`Executor::exec_tx`]
//! runs it inside a transaction and guarantees commit-or-rollback on every
//! exit path: declared errors, panics, cancellation and deadline expiry.
//!
//! ```ignore
//! let pr = Executor::Store(&store)
//!     .exec_tx(&ctx, &metrics, move |q| {
//!         async move { Ok(q.get_pull_request(id).await?) }.boxed()
//!     })
//!     .await?;
//! ```
//!
//! A unit of work that itself needs transactional helpers passes its handle
//! down as [`Executor::Tx`]; nested calls reuse the enclosing transaction
//! instead of opening a new one, and only the outermost call commits.

use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::error::ReviewError;
use crate::metrics::{ReviewMetrics, TX_COMMITTED, TX_ROLLED_BACK};
use crate::store::{Queries, ReviewStore, StoreTx};

/// Where a unit of work runs.
pub enum Executor<'a> {
    /// Open a fresh transaction on this store.
    Store(&'a dyn ReviewStore),
    /// Join a transaction that is already open.
    Tx(&'a mut dyn Queries),
}

impl<'a> Executor<'a> {
    /// Run `work` atomically.
    ///
    /// On success the transaction is committed before returning. On failure
    /// it is rolled back and the original error is returned, wrapped in
    /// [`ReviewError::RolledBack`] if the rollback failed too. A panic inside
    /// `work` rolls back and then resumes unwinding.
    ///
    /// When joining an existing transaction, `work` runs directly and its
    /// result is handed back to the enclosing call, which decides the outcome.
    pub async fn exec_tx<T, F>(
        self,
        ctx: &RequestContext,
        metrics: &dyn ReviewMetrics,
        work: F,
    ) -> Result<T, ReviewError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut dyn Queries) -> BoxFuture<'t, Result<T, ReviewError>> + Send,
    {
        let store = match self {
            Executor::Tx(queries) => return work(queries).await,
            Executor::Store(store) => store,
        };

        ctx.check()?;
        let mut tx = ctx.guard(store.begin()).await??;

        let outcome = ctx
            .guard(AssertUnwindSafe(work(tx.queries())).catch_unwind())
            .await;

        match outcome {
            Ok(Ok(Ok(value))) => {
                tx.commit().await?;
                metrics.increment(TX_COMMITTED, &[]);
                debug!("Transaction committed");
                Ok(value)
            }
            Ok(Ok(Err(err))) => Err(abort(tx, metrics, err).await),
            Ok(Err(panic)) => {
                metrics.increment(TX_ROLLED_BACK, &[]);
                if let Err(rollback) = tx.rollback().await {
                    error!(rollback_error = %rollback, "Rollback after panic failed");
                }
                error!("Unit of work panicked, transaction rolled back");
                std::panic::resume_unwind(panic)
            }
            Err(interrupted) => Err(abort(tx, metrics, interrupted).await),
        }
    }
}

/// Roll back and return the error to propagate.
async fn abort(tx: Box<dyn StoreTx>, metrics: &dyn ReviewMetrics, cause: ReviewError) -> ReviewError {
    metrics.increment(TX_ROLLED_BACK, &[]);
    match tx.rollback().await {
        Ok(()) => {
            warn!(error = %cause, "Transaction rolled back");
            cause
        }
        Err(rollback) => {
            error!(error = %cause, rollback_error = %rollback, "Transaction rollback failed");
            cause.with_rollback_failure(rollback)
        }
    }
}
