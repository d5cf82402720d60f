use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blob::{BlobConfig, BlobStore};
use crate::error::AzureError;
use crate::eventhubs::{EventHubsConfig, EventHubsConsumer, EventHubsProducer};

/// Configuration for every client a [`FileTrigger`] can hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub eventhubs: EventHubsConfig,
}

/// Which clients [`FileTrigger::connect`] should open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Components {
    pub blob: bool,
    pub producer: bool,
    pub consumer: bool,
}

impl Components {
    pub const BLOB: Self = Self {
        blob: true,
        producer: false,
        consumer: false,
    };
    pub const PRODUCER: Self = Self {
        blob: false,
        producer: true,
        consumer: false,
    };
    pub const CONSUMER: Self = Self {
        blob: false,
        producer: false,
        consumer: true,
    };

    #[must_use]
    pub fn with(self, other: Self) -> Self {
        Self {
            blob: self.blob || other.blob,
            producer: self.producer || other.producer,
            consumer: self.consumer || other.consumer,
        }
    }
}

/// A blob store plus an Event Hubs producer and consumer, each optional.
#[derive(Debug, Default)]
pub struct FileTrigger {
    blob: Option<BlobStore>,
    producer: Option<EventHubsProducer>,
    consumer: Option<EventHubsConsumer>,
}

impl FileTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the requested clients. Unrequested clients are left out.
    pub async fn connect(config: &TriggerConfig, components: Components) -> Result<Self, AzureError> {
        let mut trigger = Self::new();
        if components.blob {
            trigger = trigger.with_blob(BlobStore::new(config.blob.clone())?);
        }
        if components.producer {
            trigger = trigger.with_producer(EventHubsProducer::new(config.eventhubs.clone()).await?);
        }
        if components.consumer {
            trigger = trigger.with_consumer(EventHubsConsumer::new(config.eventhubs.clone()).await?);
        }
        info!(?components, "file trigger connected");
        Ok(trigger)
    }

    #[must_use]
    pub fn with_blob(mut self, blob: BlobStore) -> Self {
        self.blob = Some(blob);
        self
    }

    #[must_use]
    pub fn with_producer(mut self, producer: EventHubsProducer) -> Self {
        self.producer = Some(producer);
        self
    }

    #[must_use]
    pub fn with_consumer(mut self, consumer: EventHubsConsumer) -> Self {
        self.consumer = Some(consumer);
        self
    }

    pub fn blob(&self) -> Result<&BlobStore, AzureError> {
        self.blob.as_ref().ok_or(AzureError::NotConfigured("blob"))
    }

    pub fn producer(&self) -> Result<&EventHubsProducer, AzureError> {
        self.producer
            .as_ref()
            .ok_or(AzureError::NotConfigured("Event Hubs producer"))
    }

    pub fn consumer(&self) -> Result<&EventHubsConsumer, AzureError> {
        self.consumer
            .as_ref()
            .ok_or(AzureError::NotConfigured("Event Hubs consumer"))
    }

    /// Check every configured client.
    pub async fn health_check(&self) -> Result<(), AzureError> {
        if let Some(ref blob) = self.blob {
            blob.health_check().await?;
        }
        if let Some(ref producer) = self.producer {
            producer.health_check().await?;
        }
        if let Some(ref consumer) = self.consumer {
            consumer.partition_ids().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trigger_reports_missing_clients() {
        let trigger = FileTrigger::new();
        assert!(matches!(trigger.blob(), Err(AzureError::NotConfigured("blob"))));
        assert!(matches!(
            trigger.producer(),
            Err(AzureError::NotConfigured(_))
        ));
        assert!(matches!(
            trigger.consumer(),
            Err(AzureError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn connect_with_nothing_opens_nothing() {
        let trigger = FileTrigger::connect(&TriggerConfig::default(), Components::default())
            .await
            .unwrap();
        assert!(trigger.blob().is_err());
        assert!(trigger.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn connect_blob_without_account_fails_fast() {
        let err = FileTrigger::connect(&TriggerConfig::default(), Components::BLOB)
            .await
            .unwrap_err();
        assert!(matches!(err, AzureError::Configuration(_)));
    }

    #[tokio::test]
    async fn connect_producer_without_hub_fails_fast() {
        let err = FileTrigger::connect(&TriggerConfig::default(), Components::PRODUCER)
            .await
            .unwrap_err();
        assert!(matches!(err, AzureError::Configuration(_)));
    }

    #[test]
    fn components_combine() {
        let both = Components::BLOB.with(Components::PRODUCER);
        assert!(both.blob);
        assert!(both.producer);
        assert!(!both.consumer);
    }

    #[test]
    fn trigger_config_from_toml() {
        let config: TriggerConfig = toml::from_str(
            r#"
            [blob]
            account_name = "archive"

            [eventhubs]
            namespace = "ns.servicebus.windows.net"
            event_hub_name = "uploads"
            "#,
        )
        .unwrap();
        assert_eq!(config.blob.account_name.as_deref(), Some("archive"));
        assert_eq!(config.eventhubs.resolve().unwrap().event_hub_name, "uploads");
    }
}
