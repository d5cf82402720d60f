use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use filetrigger_azure::{
    FileTrigger, OutgoingEvent, ReceiveOptions, ReceivedEvent, SendTarget, StartFrom,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{body_field, parse_key_val};
use crate::OutputFormat;
use crate::shutdown::shutdown_signal;

#[derive(Args, Debug)]
pub struct EventsArgs {
    #[command(subcommand)]
    pub command: EventsCommand,
}

/// Routing and timeout flags shared by the send commands.
#[derive(Args, Debug, Clone)]
pub struct SendFlags {
    /// Send to this partition.
    #[arg(long, conflicts_with = "partition_key")]
    pub partition_id: Option<String>,
    /// Route by hashing this key.
    #[arg(long)]
    pub partition_key: Option<String>,
    /// Give up after this many seconds (overrides the configured timeout; 0 disables it).
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Application property (key=value), repeatable.
    #[arg(long = "property", value_parser = parse_key_val)]
    pub properties: Vec<(String, String)>,
}

impl SendFlags {
    fn target(&self) -> SendTarget {
        SendTarget {
            partition_id: self.partition_id.clone(),
            partition_key: self.partition_key.clone(),
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    fn event(&self, body: impl Into<Vec<u8>>) -> OutgoingEvent {
        self.properties
            .iter()
            .fold(OutgoingEvent::new(body), |event, (k, v)| {
                event.with_property(k.clone(), v.clone())
            })
    }
}

#[derive(Subcommand, Debug)]
pub enum EventsCommand {
    /// Send a single event.
    Send {
        /// Event body.
        #[arg(long)]
        body: String,
        #[command(flatten)]
        flags: SendFlags,
    },
    /// Send many events in as few batches as possible.
    SendBatch {
        /// File with one event body per line.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Event body, repeatable.
        #[arg(long = "body")]
        bodies: Vec<String>,
        #[command(flatten)]
        flags: SendFlags,
    },
    /// Receive from every partition until interrupted.
    Receive {
        /// Partition to read, repeatable. Defaults to all partitions.
        #[arg(long = "partition")]
        partitions: Vec<String>,
        /// Start position: earliest, latest, or a sequence number.
        #[arg(long, default_value = "latest")]
        start: StartFrom,
        /// Stop after this many events.
        #[arg(long)]
        max_events: Option<u64>,
    },
    /// List the partitions of the event hub.
    Partitions,
}

/// Split batch input into event bodies, one per non-empty line.
pub fn batch_bodies(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_owned)
        .collect()
}

pub async fn run(
    trigger: &FileTrigger,
    args: &EventsArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    match &args.command {
        EventsCommand::Send { body, flags } => {
            let producer = trigger.producer()?;
            producer
                .send_event(flags.event(body.as_bytes()), &flags.target(), flags.timeout())
                .await?;
            match format {
                OutputFormat::Json => {
                    let resp = serde_json::json!({
                        "event_hub_name": producer.event_hub_name(),
                        "event_count": 1,
                        "status": "sent"
                    });
                    println!("{}", serde_json::to_string_pretty(&resp)?);
                }
                OutputFormat::Text => {
                    println!("Sent 1 event to {}.", producer.event_hub_name());
                }
            }
        }
        EventsCommand::SendBatch {
            file,
            bodies,
            flags,
        } => {
            let producer = trigger.producer()?;
            let mut all = bodies.clone();
            if let Some(path) = file {
                let contents = tokio::fs::read_to_string(path).await?;
                all.extend(batch_bodies(&contents));
            }
            let events = all
                .into_iter()
                .map(|body| flags.event(body.into_bytes()))
                .collect();
            let report = producer
                .send_batch(events, &flags.target(), flags.timeout())
                .await?;
            match format {
                OutputFormat::Json => {
                    let resp = serde_json::json!({
                        "event_hub_name": producer.event_hub_name(),
                        "event_count": report.events,
                        "batch_count": report.batches,
                        "status": "sent"
                    });
                    println!("{}", serde_json::to_string_pretty(&resp)?);
                }
                OutputFormat::Text => {
                    println!(
                        "Sent {events} events in {batches} batches to {hub}.",
                        events = report.events,
                        batches = report.batches,
                        hub = producer.event_hub_name(),
                    );
                }
            }
        }
        EventsCommand::Receive {
            partitions,
            start,
            max_events,
        } => {
            receive(trigger, partitions, *start, *max_events, format).await?;
        }
        EventsCommand::Partitions => {
            let consumer = trigger.consumer()?;
            let ids = consumer.partition_ids().await?;
            match format {
                OutputFormat::Json => {
                    let resp = serde_json::json!({
                        "event_hub_name": consumer.event_hub_name(),
                        "partition_ids": ids,
                    });
                    println!("{}", serde_json::to_string_pretty(&resp)?);
                }
                OutputFormat::Text => {
                    println!("{} partitions:", ids.len());
                    for id in &ids {
                        println!("  {id}");
                    }
                }
            }
        }
    }
    Ok(())
}

async fn receive(
    trigger: &FileTrigger,
    partitions: &[String],
    start: StartFrom,
    max_events: Option<u64>,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let consumer = trigger.consumer()?;
    let options = ReceiveOptions {
        partitions: (!partitions.is_empty()).then(|| partitions.to_vec()),
        start,
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    let (tx, rx) = mpsc::channel::<ReceivedEvent>(256);
    let printer = drain_events(rx, max_events, cancel.clone(), |event| {
        print_event(event, format)
    });

    let (received, printed) = tokio::join!(consumer.receive(options, tx, cancel), printer);
    let report = received?;
    let printed = printed?;
    info!(printed, received = report.total(), "receive finished");
    Ok(())
}

/// Hand received events to `on_event` until the channel closes or
/// `max_events` have been handled.
///
/// Reaching `max_events` cancels the receive. Takes `rx` by value so that
/// returning drops it and releases partitions blocked on a full channel.
async fn drain_events<F>(
    mut rx: mpsc::Receiver<ReceivedEvent>,
    max_events: Option<u64>,
    cancel: CancellationToken,
    mut on_event: F,
) -> anyhow::Result<u64>
where
    F: FnMut(&ReceivedEvent) -> anyhow::Result<()>,
{
    let mut handled = 0u64;
    while let Some(event) = rx.recv().await {
        on_event(&event)?;
        handled += 1;
        if max_events.is_some_and(|max| handled >= max) {
            cancel.cancel();
            break;
        }
    }
    Ok(handled)
}

fn print_event(event: &ReceivedEvent, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let (field, value) = body_field(&event.body);
            let line = serde_json::json!({
                "partition_id": event.partition_id,
                "sequence_number": event.sequence_number,
                "properties": event.properties,
                field: value,
            });
            println!("{}", serde_json::to_string(&line)?);
        }
        OutputFormat::Text => {
            let seq = event
                .sequence_number
                .map_or_else(|| "?".to_owned(), |n| n.to_string());
            let properties: Vec<String> = event
                .properties
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            if properties.is_empty() {
                println!(
                    "[partition {partition}] #{seq}: {body}",
                    partition = event.partition_id,
                    body = event.body_text(),
                );
            } else {
                println!(
                    "[partition {partition}] #{seq} {{{props}}}: {body}",
                    partition = event.partition_id,
                    props = properties.join(", "),
                    body = event.body_text(),
                );
            }
        }
    }
    Ok(())
}
