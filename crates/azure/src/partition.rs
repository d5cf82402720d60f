//! One task per Event Hubs partition.

use std::collections::BTreeMap;
use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AzureError;

/// Number of events handled by each partition worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionReport {
    pub received: BTreeMap<String, u64>,
}

impl PartitionReport {
    pub fn total(&self) -> u64 {
        self.received.values().sum()
    }
}

/// Run `worker` once per partition, concurrently, until every worker returns.
///
/// Each worker gets a child of `cancel`; cancelling `cancel` stops them all.
/// The first worker error cancels the remaining workers and is returned
/// once they have finished. Duplicate partition ids are run once.
pub async fn run_per_partition<F, Fut>(
    partition_ids: Vec<String>,
    cancel: &CancellationToken,
    worker: F,
) -> Result<PartitionReport, AzureError>
where
    F: Fn(String, CancellationToken) -> Fut,
    Fut: Future<Output = Result<u64, AzureError>> + Send + 'static,
{
    let mut ids = partition_ids;
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
    if ids.is_empty() {
        return Err(AzureError::Configuration(
            "no partitions to receive from".to_owned(),
        ));
    }

    let group = cancel.child_token();
    let mut tasks = JoinSet::new();
    for id in ids {
        debug!(partition_id = %id, "starting partition worker");
        let fut = worker(id.clone(), group.child_token());
        tasks.spawn(async move { (id, fut.await) });
    }

    let mut report = PartitionReport::default();
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((id, Ok(count))) => {
                info!(partition_id = %id, count, "partition worker finished");
                report.received.insert(id, count);
                None
            }
            Ok((id, Err(e))) => {
                error!(partition_id = %id, error = %e, "partition worker failed");
                Some(e)
            }
            Err(join_err) => {
                error!(error = %join_err, "partition worker panicked");
                Some(AzureError::Service(format!(
                    "partition worker panicked: {join_err}"
                )))
            }
        };
        if let Some(e) = failure
            && first_error.is_none()
        {
            group.cancel();
            first_error = Some(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn every_partition_runs_once() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let report = run_per_partition(
            vec!["0".into(), "1".into(), "0".into(), "2".into()],
            &cancel,
            |id, _token| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(id.parse::<u64>().unwrap() + 1)
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.received.len(), 3);
        assert_eq!(report.received["2"], 3);
        assert_eq!(report.total(), 6);
    }

    #[tokio::test]
    async fn empty_partition_list_is_rejected() {
        let cancel = CancellationToken::new();
        let err = run_per_partition(Vec::new(), &cancel, |_, _| async { Ok(0) })
            .await
            .unwrap_err();
        assert!(matches!(err, AzureError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_all_workers() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let report = run_per_partition(
            vec!["0".into(), "1".into()],
            &cancel,
            |_, token| async move {
                let mut count = 0;
                loop {
                    tokio::select! {
                        () = token.cancelled() => return Ok(count),
                        () = tokio::time::sleep(Duration::from_secs(1)) => count += 1,
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(report.received.len(), 2);
        assert!(report.total() > 0);
    }

    #[tokio::test]
    async fn first_error_cancels_the_rest() {
        let cancel = CancellationToken::new();

        let result = run_per_partition(
            vec!["0".into(), "1".into(), "2".into()],
            &cancel,
            |id, token| async move {
                if id == "1" {
                    return Err(AzureError::Connection("link detached".into()));
                }
                token.cancelled().await;
                Ok(0)
            },
        )
        .await;

        assert!(matches!(result, Err(AzureError::Connection(_))));
        // Only the internal group is cancelled, not the caller's token.
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn panicking_worker_becomes_service_error() {
        let cancel = CancellationToken::new();

        let result = run_per_partition(vec!["0".into()], &cancel, |id, _| async move {
            assert_ne!(id, "0", "boom");
            Ok(0)
        })
        .await;

        assert!(matches!(result, Err(AzureError::Service(msg)) if msg.contains("panicked")));
    }
}
