use std::sync::Arc;
use std::time::Duration;

use azure_messaging_eventhubs::models::{EventData, ReceivedEventData};
use azure_messaging_eventhubs::{
    ConsumerClient, EventDataBatch, EventDataBatchOptions, OpenReceiverOptions, ProducerClient,
    SendEventOptions, StartLocation, StartPosition,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::auth::build_azure_credential;
use crate::batch::{BatchSink, send_in_batches};
use crate::config::AzureBaseConfig;
use crate::connection_string::ConnectionString;
use crate::error::{AzureError, sdk_error};
use crate::event::{
    BatchReport, OutgoingEvent, ReceiveOptions, ReceivedEvent, SendRoute, SendTarget, StartFrom,
    pump_partition, with_timeout,
};
use crate::partition::{PartitionReport, run_per_partition};

/// Consumer group used when none is configured.
pub const DEFAULT_CONSUMER_GROUP: &str = "$Default";

/// Configuration for the Azure Event Hubs producer and consumer.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct EventHubsConfig {
    /// Shared Azure configuration.
    #[serde(flatten)]
    pub azure: AzureBaseConfig,

    /// Event Hubs fully-qualified namespace (e.g. `"mynamespace.servicebus.windows.net"`).
    #[serde(default)]
    pub namespace: Option<String>,

    /// Event Hub name.
    #[serde(default)]
    pub event_hub_name: Option<String>,

    /// Consumer group for receivers. Defaults to `$Default`.
    #[serde(default)]
    pub consumer_group: Option<String>,

    /// Connection string supplying the namespace and hub name when those
    /// are not set explicitly. Redacted in `Debug`.
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Send timeout in seconds. `0` or absent disables the timeout.
    #[serde(default)]
    pub send_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for EventHubsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHubsConfig")
            .field("azure", &self.azure)
            .field("namespace", &self.namespace)
            .field("event_hub_name", &self.event_hub_name)
            .field("consumer_group", &self.consumer_group)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "[REDACTED]"),
            )
            .field("send_timeout_secs", &self.send_timeout_secs)
            .finish()
    }
}

/// Namespace and hub name after applying the connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHub {
    pub namespace: String,
    pub event_hub_name: String,
}

impl EventHubsConfig {
    /// Create an `EventHubsConfig` for a namespace and hub.
    pub fn new(namespace: impl Into<String>, event_hub_name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            event_hub_name: Some(event_hub_name.into()),
            ..Self::default()
        }
    }

    /// Create an `EventHubsConfig` from a connection string.
    pub fn from_connection_string(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: Some(connection_string.into()),
            ..Self::default()
        }
    }

    /// Set the consumer group.
    #[must_use]
    pub fn with_consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the endpoint URL override.
    #[must_use]
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.azure.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Set the send timeout.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Replace the shared Azure configuration.
    #[must_use]
    pub fn with_azure(mut self, azure: AzureBaseConfig) -> Self {
        self.azure = azure;
        self
    }

    pub fn consumer_group(&self) -> &str {
        self.consumer_group
            .as_deref()
            .unwrap_or(DEFAULT_CONSUMER_GROUP)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Work out the namespace and hub name.
    ///
    /// Explicit fields win over values parsed from the connection string.
    pub fn resolve(&self) -> Result<ResolvedHub, AzureError> {
        let parsed = self
            .connection_string
            .as_deref()
            .map(str::parse::<ConnectionString>)
            .transpose()?;

        if parsed.as_ref().is_some_and(ConnectionString::has_shared_key) {
            warn!("shared access keys are not used; authenticating with an Azure AD credential");
        }

        let namespace = self
            .namespace
            .clone()
            .or_else(|| parsed.as_ref().map(|cs| cs.namespace.clone()))
            .ok_or_else(|| {
                AzureError::Configuration(
                    "azure eventhubs: namespace or connection_string is required".to_owned(),
                )
            })?;
        let event_hub_name = self
            .event_hub_name
            .clone()
            .or_else(|| parsed.and_then(|cs| cs.entity_path))
            .ok_or_else(|| {
                AzureError::Configuration(
                    "azure eventhubs: event_hub_name or an EntityPath is required".to_owned(),
                )
            })?;

        Ok(ResolvedHub {
            namespace,
            event_hub_name,
        })
    }
}

fn to_event_data(event: &OutgoingEvent) -> EventData {
    let mut builder = EventData::builder().with_body(event.body.clone());
    for (k, v) in &event.properties {
        builder = builder.add_property(k.clone(), v.as_str());
    }
    builder.build()
}

fn to_start_position(start: StartFrom) -> StartPosition {
    let location = match start {
        StartFrom::Earliest => StartLocation::Earliest,
        StartFrom::Latest => StartLocation::Latest,
        StartFrom::SequenceNumber(n) => StartLocation::SequenceNumber(n),
    };
    StartPosition {
        location,
        inclusive: true,
    }
}

fn from_received(partition_id: &str, received: &ReceivedEventData) -> ReceivedEvent {
    ReceivedEvent {
        partition_id: partition_id.to_owned(),
        sequence_number: received.sequence_number(),
        body: received
            .event_data()
            .body()
            .map(<[u8]>::to_vec)
            .unwrap_or_default(),
        properties: received
            .event_data()
            .properties()
            .map(|props| {
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), property_text(v)))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Render an AMQP property value as plain text.
///
/// Values print through `Debug` as `Kind(inner)`; strings lose their quotes.
fn property_text(value: &impl std::fmt::Debug) -> String {
    let debug = format!("{value:?}");
    let inner = match (debug.find('('), debug.strip_suffix(')')) {
        (Some(open), Some(trimmed)) if open < trimmed.len() => &trimmed[open + 1..],
        _ => debug.as_str(),
    };
    inner
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(inner)
        .to_owned()
}

/// Batches built by the SDK producer for one send target.
struct ProducerBatches<'a> {
    producer: &'a ProducerClient,
    target: &'a SendTarget,
}

impl<'a> BatchSink for ProducerBatches<'a> {
    type Batch = EventDataBatch<'a>;

    async fn new_batch(&self) -> Result<Self::Batch, AzureError> {
        self.producer
            .create_batch(Some(EventDataBatchOptions {
                partition_id: self.target.partition_id.clone(),
                partition_key: self.target.partition_key.clone(),
                ..Default::default()
            }))
            .await
            .map_err(|e| sdk_error("create_batch", &e))
    }

    fn try_add(&self, batch: &mut Self::Batch, event: &OutgoingEvent) -> Result<bool, AzureError> {
        batch
            .try_add_event_data(to_event_data(event), None)
            .map_err(|e| AzureError::InvalidPayload(e.to_string()))
    }

    async fn send(&self, batch: Self::Batch) -> Result<(), AzureError> {
        self.producer
            .send_batch(batch, None)
            .await
            .map_err(|e| sdk_error("send_batch", &e))
    }
}

/// Event Hubs producer for publishing events.
pub struct EventHubsProducer {
    config: EventHubsConfig,
    hub: ResolvedHub,
    producer: ProducerClient,
}

impl std::fmt::Debug for EventHubsProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHubsProducer")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .field("producer", &"<ProducerClient>")
            .finish()
    }
}

impl EventHubsProducer {
    /// Open an Event Hubs producer client.
    pub async fn new(config: EventHubsConfig) -> Result<Self, AzureError> {
        let hub = config.resolve()?;
        let credential = build_azure_credential(&config.azure)?;

        let mut builder = ProducerClient::builder();
        if let Some(ref endpoint) = config.azure.endpoint_url {
            builder = builder.with_custom_endpoint(endpoint.clone());
        }

        let producer = builder
            .open(&hub.namespace, &hub.event_hub_name, credential)
            .await
            .map_err(|e| {
                AzureError::Configuration(format!("failed to open Event Hubs producer: {e}"))
            })?;

        info!(namespace = %hub.namespace, event_hub_name = %hub.event_hub_name, "Event Hubs producer opened");
        Ok(Self {
            config,
            hub,
            producer,
        })
    }

    pub fn event_hub_name(&self) -> &str {
        &self.hub.event_hub_name
    }

    /// Send a single event.
    ///
    /// `timeout` overrides the configured send timeout.
    #[instrument(skip(self, event), fields(event_hub_name = %self.hub.event_hub_name, size = event.body.len()))]
    pub async fn send_event(
        &self,
        event: OutgoingEvent,
        target: &SendTarget,
        timeout: Option<Duration>,
    ) -> Result<(), AzureError> {
        let timeout = timeout.or_else(|| self.config.send_timeout());

        let options = match target.route()? {
            SendRoute::KeyedBatch => {
                self.send_batch(vec![event], target, timeout).await?;
                return Ok(());
            }
            SendRoute::Direct { partition_id } => {
                partition_id.map(|partition_id| SendEventOptions {
                    partition_id: Some(partition_id),
                })
            }
        };

        debug!("sending event to Event Hubs");
        with_timeout(timeout, async {
            self.producer
                .send_event(to_event_data(&event), options)
                .await
                .map_err(|e| sdk_error("send_event", &e))
        })
        .await?;

        info!(event_hub_name = %self.hub.event_hub_name, "event sent to Event Hubs");
        Ok(())
    }

    /// Send events in as few batches as the service size limit allows.
    ///
    /// `timeout` bounds the whole operation and overrides the configured one.
    #[instrument(skip(self, events), fields(event_hub_name = %self.hub.event_hub_name, count = events.len()))]
    pub async fn send_batch(
        &self,
        events: Vec<OutgoingEvent>,
        target: &SendTarget,
        timeout: Option<Duration>,
    ) -> Result<BatchReport, AzureError> {
        target.validate()?;
        if events.is_empty() {
            debug!("no events to send");
            return Ok(BatchReport::default());
        }
        let timeout = timeout.or_else(|| self.config.send_timeout());

        let sink = ProducerBatches {
            producer: &self.producer,
            target,
        };
        let report = with_timeout(timeout, send_in_batches(&sink, &events)).await?;

        info!(
            event_hub_name = %self.hub.event_hub_name,
            events = report.events,
            batches = report.batches,
            "batch sent to Event Hubs"
        );
        Ok(report)
    }

    /// Partition ids of the event hub.
    #[instrument(skip(self))]
    pub async fn partition_ids(&self) -> Result<Vec<String>, AzureError> {
        let properties = self
            .producer
            .get_eventhub_properties()
            .await
            .map_err(|e| sdk_error("get_eventhub_properties", &e))?;
        Ok(properties.partition_ids)
    }

    #[instrument(skip(self), fields(event_hub_name = %self.hub.event_hub_name))]
    pub async fn health_check(&self) -> Result<(), AzureError> {
        debug!("performing Event Hubs health check");
        self.producer.get_eventhub_properties().await.map_err(|e| {
            AzureError::Connection(format!("Event Hubs health check failed: {e}"))
        })?;
        info!("Event Hubs health check passed");
        Ok(())
    }
}

/// Event Hubs consumer reading every partition in parallel.
pub struct EventHubsConsumer {
    config: EventHubsConfig,
    hub: ResolvedHub,
    consumer: Arc<ConsumerClient>,
}

impl std::fmt::Debug for EventHubsConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHubsConsumer")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .field("consumer", &"<ConsumerClient>")
            .finish()
    }
}

impl EventHubsConsumer {
    /// Open an Event Hubs consumer client for the configured consumer group.
    pub async fn new(config: EventHubsConfig) -> Result<Self, AzureError> {
        let hub = config.resolve()?;
        let credential = build_azure_credential(&config.azure)?;

        let mut builder =
            ConsumerClient::builder().with_consumer_group(config.consumer_group().to_owned());
        if let Some(ref endpoint) = config.azure.endpoint_url {
            builder = builder.with_custom_endpoint(endpoint.clone());
        }

        let consumer = builder
            .open(&hub.namespace, hub.event_hub_name.clone(), credential)
            .await
            .map_err(|e| {
                AzureError::Configuration(format!("failed to open Event Hubs consumer: {e}"))
            })?;

        info!(
            namespace = %hub.namespace,
            event_hub_name = %hub.event_hub_name,
            consumer_group = %config.consumer_group(),
            "Event Hubs consumer opened"
        );
        Ok(Self {
            config,
            hub,
            consumer: Arc::new(consumer),
        })
    }

    pub fn event_hub_name(&self) -> &str {
        &self.hub.event_hub_name
    }

    /// Partition ids of the event hub.
    #[instrument(skip(self))]
    pub async fn partition_ids(&self) -> Result<Vec<String>, AzureError> {
        let properties = self
            .consumer
            .get_eventhub_properties()
            .await
            .map_err(|e| sdk_error("get_eventhub_properties", &e))?;
        Ok(properties.partition_ids)
    }

    /// Receive from each partition until `cancel` fires or `sink` is closed.
    ///
    /// Every received event is sent to `sink`. The first partition failure
    /// stops the other partitions and is returned.
    #[instrument(skip(self, sink, cancel), fields(event_hub_name = %self.hub.event_hub_name, start = %options.start))]
    pub async fn receive(
        &self,
        options: ReceiveOptions,
        sink: mpsc::Sender<ReceivedEvent>,
        cancel: CancellationToken,
    ) -> Result<PartitionReport, AzureError> {
        let partitions = match options.partitions {
            Some(ids) => ids,
            None => self.partition_ids().await?,
        };
        info!(partitions = ?partitions, "receiving from partitions");

        let start = options.start;
        run_per_partition(partitions, &cancel, |partition_id, token| {
            let consumer = Arc::clone(&self.consumer);
            let sink = sink.clone();
            async move { receive_partition(consumer, partition_id, start, sink, token).await }
        })
        .await
    }
}

async fn receive_partition(
    consumer: Arc<ConsumerClient>,
    partition_id: String,
    start: StartFrom,
    sink: mpsc::Sender<ReceivedEvent>,
    cancel: CancellationToken,
) -> Result<u64, AzureError> {
    let receiver = consumer
        .open_receiver_on_partition(
            partition_id.clone(),
            Some(OpenReceiverOptions {
                start_position: Some(to_start_position(start)),
                ..Default::default()
            }),
        )
        .await
        .map_err(|e| sdk_error("open_receiver_on_partition", &e))?;
    debug!(partition_id = %partition_id, "receiver opened");

    let stream = receiver.stream_events().map(|item| {
        item.map(|received| from_received(&partition_id, &received))
            .map_err(|e| sdk_error("receive", &e))
    });
    pump_partition(&partition_id, stream, &sink, &cancel).await
}
