//! Splitting a list of events into size-limited batches.

use std::future::Future;

use tracing::debug;

use crate::error::AzureError;
use crate::event::{BatchReport, OutgoingEvent};

/// Something that builds and sends size-limited event batches.
///
/// The Event Hubs producer implements this over the SDK's `EventDataBatch`;
/// tests implement it with an in-memory batch of fixed capacity.
pub trait BatchSink {
    type Batch;

    /// Start a new, empty batch.
    fn new_batch(&self) -> impl Future<Output = Result<Self::Batch, AzureError>>;

    /// Add `event` to `batch`. `Ok(false)` means the batch is full.
    fn try_add(&self, batch: &mut Self::Batch, event: &OutgoingEvent) -> Result<bool, AzureError>;

    /// Send a batch holding at least one event.
    fn send(&self, batch: Self::Batch) -> impl Future<Output = Result<(), AzureError>>;
}

fn too_large(index: usize, event: &OutgoingEvent) -> AzureError {
    AzureError::InvalidPayload(format!(
        "event {index} ({} bytes) is too large for a batch",
        event.body.len()
    ))
}

/// Send `events` in order, starting a new batch whenever the current one is
/// full.
///
/// An event that does not fit into an empty batch fails the call; batches
/// already sent stay sent.
pub async fn send_in_batches<S: BatchSink>(
    sink: &S,
    events: &[OutgoingEvent],
) -> Result<BatchReport, AzureError> {
    let mut report = BatchReport::default();
    if events.is_empty() {
        return Ok(report);
    }

    let mut batch = sink.new_batch().await?;
    let mut in_batch = 0usize;

    for (index, event) in events.iter().enumerate() {
        if sink.try_add(&mut batch, event)? {
            in_batch += 1;
            continue;
        }
        if in_batch == 0 {
            return Err(too_large(index, event));
        }

        debug!(count = in_batch, "batch full, sending");
        sink.send(batch).await?;
        report.batches += 1;
        report.events += in_batch;

        batch = sink.new_batch().await?;
        if !sink.try_add(&mut batch, event)? {
            return Err(too_large(index, event));
        }
        in_batch = 1;
    }

    sink.send(batch).await?;
    report.batches += 1;
    report.events += in_batch;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Batches hold at most `capacity` events and reject bodies over `max_body`.
    struct FixedSink {
        capacity: usize,
        max_body: usize,
        sent: Mutex<Vec<Vec<Vec<u8>>>>,
        created: Mutex<usize>,
    }

    impl FixedSink {
        fn new(capacity: usize, max_body: usize) -> Self {
            Self {
                capacity,
                max_body,
                sent: Mutex::new(Vec::new()),
                created: Mutex::new(0),
            }
        }

        fn sent_sizes(&self) -> Vec<usize> {
            self.sent.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    impl BatchSink for FixedSink {
        type Batch = Vec<Vec<u8>>;

        async fn new_batch(&self) -> Result<Self::Batch, AzureError> {
            *self.created.lock().unwrap() += 1;
            Ok(Vec::new())
        }

        fn try_add(
            &self,
            batch: &mut Self::Batch,
            event: &OutgoingEvent,
        ) -> Result<bool, AzureError> {
            if batch.len() >= self.capacity || event.body.len() > self.max_body {
                return Ok(false);
            }
            batch.push(event.body.clone());
            Ok(true)
        }

        async fn send(&self, batch: Self::Batch) -> Result<(), AzureError> {
            self.sent.lock().unwrap().push(batch);
            Ok(())
        }
    }

    fn events(n: usize) -> Vec<OutgoingEvent> {
        (0..n).map(|i| OutgoingEvent::text(&format!("event-{i}"))).collect()
    }

    #[tokio::test]
    async fn full_batches_are_sent_and_restarted() {
        let sink = FixedSink::new(2, 64);
        let report = send_in_batches(&sink, &events(5)).await.unwrap();

        assert_eq!(report, BatchReport { events: 5, batches: 3 });
        assert_eq!(sink.sent_sizes(), vec![2, 2, 1]);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent[2][0], b"event-4");
    }

    #[tokio::test]
    async fn single_batch_when_everything_fits() {
        let sink = FixedSink::new(10, 64);
        let report = send_in_batches(&sink, &events(3)).await.unwrap();
        assert_eq!(report, BatchReport { events: 3, batches: 1 });
    }

    #[tokio::test]
    async fn empty_input_sends_nothing() {
        let sink = FixedSink::new(2, 64);
        let report = send_in_batches(&sink, &[]).await.unwrap();
        assert_eq!(report, BatchReport::default());
        assert_eq!(*sink.created.lock().unwrap(), 0);
        assert!(sink.sent_sizes().is_empty());
    }

    #[tokio::test]
    async fn oversized_first_event_is_rejected() {
        let sink = FixedSink::new(2, 4);
        let err = send_in_batches(&sink, &[OutgoingEvent::text("far too long")])
            .await
            .unwrap_err();
        assert!(matches!(err, AzureError::InvalidPayload(ref m) if m.contains("event 0")));
        assert!(sink.sent_sizes().is_empty());
    }

    #[tokio::test]
    async fn oversized_later_event_fails_after_earlier_batch() {
        let sink = FixedSink::new(2, 4);
        let input = vec![
            OutgoingEvent::text("a"),
            OutgoingEvent::text("b"),
            OutgoingEvent::text("much too long"),
        ];
        let err = send_in_batches(&sink, &input).await.unwrap_err();
        assert!(matches!(err, AzureError::InvalidPayload(ref m) if m.contains("event 2")));
        assert_eq!(sink.sent_sizes(), vec![2]);
    }
}
