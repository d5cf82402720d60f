use serde::{Deserialize, Serialize};

/// Shared base configuration for the Blob Storage and Event Hubs clients.
///
/// Carries the optional service-principal credentials, the managed identity
/// switch and an endpoint override for local development (e.g. `Azurite`).
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AzureBaseConfig {
    /// Azure AD tenant ID.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Azure AD application (client) ID. Also selects a user-assigned
    /// managed identity when `use_managed_identity` is set.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Azure AD client credential (service principal). Redacted in `Debug`.
    #[serde(default)]
    pub client_credential: Option<String>,

    /// Authenticate with the host's managed identity instead of the Azure CLI.
    #[serde(default)]
    pub use_managed_identity: bool,

    /// Optional endpoint URL override for local development (e.g. `Azurite`).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl std::fmt::Debug for AzureBaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureBaseConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id.as_ref().map(|_| "[REDACTED]"))
            .field(
                "client_credential",
                &self.client_credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("use_managed_identity", &self.use_managed_identity)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

impl AzureBaseConfig {
    /// Create an empty `AzureBaseConfig` (Azure CLI credential, public endpoints).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Azure AD tenant ID.
    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the Azure AD application (client) ID.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the Azure AD client credential.
    #[must_use]
    pub fn with_client_credential(mut self, client_credential: impl Into<String>) -> Self {
        self.client_credential = Some(client_credential.into());
        self
    }

    /// Use the managed identity of the host.
    #[must_use]
    pub fn with_managed_identity(mut self, enabled: bool) -> Self {
        self.use_managed_identity = enabled;
        self
    }

    /// Set the endpoint URL override for local development.
    #[must_use]
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Whether all three service-principal fields are present.
    pub fn has_service_principal(&self) -> bool {
        self.tenant_id.is_some() && self.client_id.is_some() && self.client_credential.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_is_empty() {
        let config = AzureBaseConfig::new();
        assert!(config.tenant_id.is_none());
        assert!(config.client_id.is_none());
        assert!(config.client_credential.is_none());
        assert!(!config.use_managed_identity);
        assert!(config.endpoint_url.is_none());
        assert!(!config.has_service_principal());
    }

    #[test]
    fn builder_chain() {
        let config = AzureBaseConfig::new()
            .with_tenant_id("tid-123")
            .with_client_id("cid-456")
            .with_client_credential("cred-789")
            .with_endpoint_url("http://127.0.0.1:10000/devstoreaccount1");
        assert_eq!(config.tenant_id.as_deref(), Some("tid-123"));
        assert_eq!(config.client_id.as_deref(), Some("cid-456"));
        assert_eq!(config.client_credential.as_deref(), Some("cred-789"));
        assert_eq!(
            config.endpoint_url.as_deref(),
            Some("http://127.0.0.1:10000/devstoreaccount1")
        );
        assert!(config.has_service_principal());
    }

    #[test]
    fn partial_service_principal() {
        let config = AzureBaseConfig::new()
            .with_tenant_id("tid")
            .with_client_id("cid");
        assert!(!config.has_service_principal());
    }

    #[test]
    fn debug_redacts_credentials() {
        let config = AzureBaseConfig::new()
            .with_client_id("my-app-id")
            .with_client_credential("super-private");
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("my-app-id"));
        assert!(!debug.contains("super-private"));
    }

    #[test]
    fn deserialize_from_toml() {
        let config: AzureBaseConfig = toml::from_str(
            r#"
            tenant_id = "tid"
            use_managed_identity = true
            endpoint_url = "http://azurite:10000/devstoreaccount1"
            "#,
        )
        .unwrap();
        assert_eq!(config.tenant_id.as_deref(), Some("tid"));
        assert!(config.use_managed_identity);
        assert!(config.client_id.is_none());
    }
}
