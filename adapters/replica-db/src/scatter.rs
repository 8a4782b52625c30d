//! Concurrent fan-out executor used by every administrative operation
//! (open-all, close-all, ping-all, prepare-all).

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::DbError;

/// Run `op(0..n)` concurrently, one task per index, and collect the outputs
/// in index order.
///
/// Results are gathered over a channel with capacity exactly `n`, so no
/// producer can ever block on the receiver. Partial failures do not
/// short-circuit: all `n` operations always run to completion (closing or
/// pinging replicas must not abandon a subset mid-flight). If any leg failed,
/// the error observed last in completion order wins; which replica failed is
/// deliberately not preserved.
pub(crate) async fn scatter<T, F, Fut>(n: usize, op: F) -> Result<Vec<T>, DbError>
where
    T: Send + 'static,
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<T, DbError>> + Send + 'static,
{
    let (done_tx, mut done_rx) = mpsc::channel(n.max(1));
    for idx in 0..n {
        let done_tx = done_tx.clone();
        let fut = op(idx);
        tokio::spawn(async move {
            let _ = done_tx.send((idx, fut.await)).await;
        });
    }
    drop(done_tx);

    let mut slots: Vec<Option<T>> = (0..n).map(|_| None).collect();
    let mut last_err: Option<DbError> = None;
    while let Some((idx, res)) = done_rx.recv().await {
        match res {
            Ok(out) => slots[idx] = Some(out),
            Err(e) => last_err = Some(e),
        }
    }

    if let Some(err) = last_err {
        return Err(err);
    }
    // A leg that panicked leaves its slot empty without reporting an error.
    let mut out = Vec::with_capacity(n);
    for slot in slots {
        out.push(slot.ok_or(DbError::TaskAborted)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn collects_outputs_in_index_order() {
        let out = scatter(4, |idx| async move {
            // Finish out of order.
            tokio::time::sleep(std::time::Duration::from_millis(4 - idx as u64)).await;
            Ok(idx * 10)
        })
        .await
        .expect("all legs succeed");
        assert_eq!(out, vec![0, 10, 20, 30]);
    }

    #[tokio::test]
    async fn all_legs_run_even_when_some_fail() {
        let completed = Arc::new(AtomicUsize::new(0));
        let failure_set = [1usize, 3];

        let c = Arc::clone(&completed);
        let res = scatter(5, move |idx| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if failure_set.contains(&idx) {
                    Err(DbError::Configuration(format!("leg {idx}")))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(res.is_err());
        assert_eq!(completed.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn empty_failure_set_is_ok() {
        let completed = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&completed);
        let res = scatter(8, move |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        assert!(res.is_ok());
        assert_eq!(completed.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn zero_legs_is_ok() {
        let out: Vec<()> = scatter(0, |_| async move { Ok(()) }).await.expect("empty");
        assert!(out.is_empty());
    }
}
