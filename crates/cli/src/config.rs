use std::path::Path;

use anyhow::Context;
use filetrigger_azure::{AzureBaseConfig, BlobConfig, EventHubsConfig, TriggerConfig};
use serde::Deserialize;
use tracing::debug;

/// Contents of the TOML configuration file.
///
/// # Example
///
/// ```toml
/// [azure]
/// use_managed_identity = true
///
/// [blob]
/// account_name = "mystorageaccount"
/// container_name = "uploads"
///
/// [eventhubs]
/// namespace = "myns.servicebus.windows.net"
/// event_hub_name = "file-events"
/// send_timeout_secs = 30
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Credentials shared by both services. Per-service values win.
    #[serde(default)]
    pub azure: AzureBaseConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub eventhubs: EventHubsConfig,
}

/// Values given on the command line or through `FILETRIGGER_*` variables.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub account_name: Option<String>,
    pub blob_endpoint: Option<String>,
    pub namespace: Option<String>,
    pub event_hub: Option<String>,
    pub consumer_group: Option<String>,
    pub connection_string: Option<String>,
    pub eventhubs_endpoint: Option<String>,
}

impl FileConfig {
    /// Load the config file at `path`.
    ///
    /// A missing file yields the defaults unless `required` is set.
    pub fn load(path: &Path, required: bool) -> anyhow::Result<Self> {
        if !path.exists() && !required {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Merge the shared section and the overrides into a [`TriggerConfig`].
    pub fn into_trigger_config(self, overrides: Overrides) -> TriggerConfig {
        let mut blob = self.blob;
        blob.azure = merge_base(blob.azure, &self.azure);
        override_with(&mut blob.account_name, overrides.account_name);
        override_with(&mut blob.azure.endpoint_url, overrides.blob_endpoint);

        let mut eventhubs = self.eventhubs;
        eventhubs.azure = merge_base(eventhubs.azure, &self.azure);
        if overrides.connection_string.is_some() {
            // A new connection string names its own namespace and hub.
            eventhubs.namespace = None;
            eventhubs.event_hub_name = None;
        }
        override_with(&mut eventhubs.connection_string, overrides.connection_string);
        override_with(&mut eventhubs.namespace, overrides.namespace);
        override_with(&mut eventhubs.event_hub_name, overrides.event_hub);
        override_with(&mut eventhubs.consumer_group, overrides.consumer_group);
        override_with(&mut eventhubs.azure.endpoint_url, overrides.eventhubs_endpoint);

        TriggerConfig { blob, eventhubs }
    }
}

fn override_with(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Fill unset per-service fields from the shared `[azure]` section.
///
/// The endpoint override is service specific and never shared.
fn merge_base(specific: AzureBaseConfig, shared: &AzureBaseConfig) -> AzureBaseConfig {
    AzureBaseConfig {
        tenant_id: specific.tenant_id.or_else(|| shared.tenant_id.clone()),
        client_id: specific.client_id.or_else(|| shared.client_id.clone()),
        client_credential: specific
            .client_credential
            .or_else(|| shared.client_credential.clone()),
        use_managed_identity: specific.use_managed_identity || shared.use_managed_identity,
        endpoint_url: specific.endpoint_url,
    }
}
