use std::path::{Path, PathBuf};
use std::sync::Arc;

use azure_core::credentials::TokenCredential;
use azure_storage_blob::{BlobClient, BlobServiceClient};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::auth::build_azure_credential;
use crate::config::AzureBaseConfig;
use crate::error::{AzureError, sdk_error};

/// Configuration for the Azure Blob Storage client.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Shared Azure configuration.
    #[serde(flatten)]
    pub azure: AzureBaseConfig,

    /// Azure Storage account name.
    #[serde(default)]
    pub account_name: Option<String>,

    /// Default container name, used when an operation is given none.
    #[serde(default)]
    pub container_name: Option<String>,

    /// Blob name prefix prepended to every blob (e.g. `"uploads/"`).
    #[serde(default)]
    pub prefix: Option<String>,
}

impl std::fmt::Debug for BlobConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobConfig")
            .field("azure", &self.azure)
            .field("account_name", &self.account_name)
            .field("container_name", &self.container_name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl BlobConfig {
    /// Create a `BlobConfig` for the given storage account.
    pub fn new(account_name: impl Into<String>) -> Self {
        Self {
            account_name: Some(account_name.into()),
            ..Self::default()
        }
    }

    /// Set the default container name.
    #[must_use]
    pub fn with_container_name(mut self, container_name: impl Into<String>) -> Self {
        self.container_name = Some(container_name.into());
        self
    }

    /// Set the blob name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the account URL override (an `Azurite` URL or a full account URL).
    #[must_use]
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.azure.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Replace the shared Azure configuration.
    #[must_use]
    pub fn with_azure(mut self, azure: AzureBaseConfig) -> Self {
        self.azure = azure;
        self
    }

    /// The account URL to talk to.
    ///
    /// The endpoint override wins; otherwise the public endpoint of
    /// `account_name` is used.
    pub fn endpoint(&self) -> Result<String, AzureError> {
        if let Some(ref url) = self.azure.endpoint_url {
            return Ok(url.trim_end_matches('/').to_owned());
        }
        let account_name = self.account_name.as_deref().ok_or_else(|| {
            AzureError::Configuration(
                "azure blob: account_name or endpoint_url is required".to_owned(),
            )
        })?;
        Ok(format!("https://{account_name}.blob.core.windows.net"))
    }
}

/// Read a whole local file into memory.
pub async fn read_local_file(path: impl AsRef<Path>) -> Result<Vec<u8>, AzureError> {
    let path = path.as_ref();
    tokio::fs::read(path)
        .await
        .map_err(|e| AzureError::io(path, e))
}

/// Write `data` to `path`, creating missing parent directories.
pub async fn write_local_file(path: impl AsRef<Path>, data: &[u8]) -> Result<(), AzureError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AzureError::io(parent, e))?;
    }
    tokio::fs::write(path, data)
        .await
        .map_err(|e| AzureError::io(path, e))
}

/// Azure Blob Storage client for containers and blobs.
pub struct BlobStore {
    config: BlobConfig,
    service_client: BlobServiceClient,
    credential: Arc<dyn TokenCredential>,
    endpoint: String,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl BlobStore {
    /// Create a new `BlobStore` by building an Azure Blob Storage client.
    pub fn new(config: BlobConfig) -> Result<Self, AzureError> {
        let endpoint = config.endpoint()?;
        let credential = build_azure_credential(&config.azure)?;

        let service_client = BlobServiceClient::new(&endpoint, Some(Arc::clone(&credential)), None)
            .map_err(|e| AzureError::Configuration(format!("blob client error: {e}")))?;

        info!(endpoint = %endpoint, "blob client created");

        Ok(Self {
            config,
            service_client,
            credential,
            endpoint,
        })
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Resolve the container name from the argument or config default.
    fn resolve_container<'a>(&'a self, container: Option<&'a str>) -> Result<&'a str, AzureError> {
        resolve_container(container, self.config.container_name.as_deref())
    }

    /// Apply the configured prefix to a blob name.
    fn prefixed_name(&self, blob_name: &str) -> String {
        prefixed_name(self.config.prefix.as_deref(), blob_name)
    }

    /// Create a container. Returns `false` if it already existed.
    #[instrument(skip(self))]
    pub async fn create_container(&self, name: &str) -> Result<bool, AzureError> {
        info!(container = %name, "creating blob container");
        let container_client = self.service_client.blob_container_client(name);
        match container_client.create(None).await {
            Ok(_) => {
                info!(container = %name, "blob container created");
                Ok(true)
            }
            Err(e) => match sdk_error("create_container", &e) {
                AzureError::AlreadyExists(_) => {
                    info!(container = %name, "blob container already exists");
                    Ok(false)
                }
                other => Err(other),
            },
        }
    }

    /// Delete a container. Returns `false` if it did not exist.
    #[instrument(skip(self))]
    pub async fn delete_container(&self, name: &str) -> Result<bool, AzureError> {
        info!(container = %name, "deleting blob container");
        let container_client = self.service_client.blob_container_client(name);
        match container_client.delete(None).await {
            Ok(_) => {
                info!(container = %name, "blob container deleted");
                Ok(true)
            }
            Err(e) => match sdk_error("delete_container", &e) {
                AzureError::NotFound(_) => {
                    info!(container = %name, "blob container did not exist");
                    Ok(false)
                }
                other => Err(other),
            },
        }
    }

    /// Upload an in-memory buffer, overwriting any existing blob.
    ///
    /// Returns the number of bytes uploaded.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload_buffer(
        &self,
        container: Option<&str>,
        blob_name: &str,
        data: Vec<u8>,
    ) -> Result<u64, AzureError> {
        let container = self.resolve_container(container)?;
        let blob_name = self.prefixed_name(blob_name);
        let content_length = data.len() as u64;
        debug!(container = %container, blob_name = %blob_name, size = content_length, "uploading blob");

        let blob_client = self.service_client.blob_client(container, &blob_name);
        let data: azure_core::Bytes = data.into();

        blob_client
            .upload(data.into(), true, content_length, None)
            .await
            .map_err(|e| sdk_error("upload", &e))?;

        info!(container = %container, blob_name = %blob_name, size = content_length, "blob uploaded");
        Ok(content_length)
    }

    /// Upload the local file at `path` as `blob_name`.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn upload_file(
        &self,
        container: Option<&str>,
        blob_name: &str,
        path: impl AsRef<Path>,
    ) -> Result<u64, AzureError> {
        let data = read_local_file(path).await?;
        self.upload_buffer(container, blob_name, data).await
    }

    /// Upload `dir/file_name`, naming the blob after the file.
    pub async fn upload_from_dir(
        &self,
        container: Option<&str>,
        dir: impl AsRef<Path>,
        file_name: &str,
    ) -> Result<u64, AzureError> {
        let path: PathBuf = dir.as_ref().join(file_name);
        self.upload_file(container, file_name, path).await
    }

    /// Download a whole blob into memory.
    #[instrument(skip(self))]
    pub async fn download_buffer(
        &self,
        container: Option<&str>,
        blob_name: &str,
    ) -> Result<Vec<u8>, AzureError> {
        let container = self.resolve_container(container)?;
        let blob_name = self.prefixed_name(blob_name);
        debug!(container = %container, blob_name = %blob_name, "downloading blob");

        let blob_client = BlobClient::new(
            &self.endpoint,
            container,
            &blob_name,
            Some(Arc::clone(&self.credential)),
            None,
        )
        .map_err(|e| AzureError::Configuration(format!("blob client error: {e}")))?;

        let response = blob_client
            .download(None)
            .await
            .map_err(|e| sdk_error("download", &e))?;

        let body_bytes: azure_core::Bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| AzureError::Service(format!("failed to read blob body: {e}")))?;

        info!(container = %container, blob_name = %blob_name, size = body_bytes.len(), "blob downloaded");
        Ok(body_bytes.to_vec())
    }

    /// Download a blob to the local file at `path`.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn download_file(
        &self,
        container: Option<&str>,
        blob_name: &str,
        path: impl AsRef<Path>,
    ) -> Result<u64, AzureError> {
        let data = self.download_buffer(container, blob_name).await?;
        write_local_file(path, &data).await?;
        Ok(data.len() as u64)
    }

    /// Delete a blob.
    #[instrument(skip(self))]
    pub async fn delete_blob(&self, container: Option<&str>, blob_name: &str) -> Result<(), AzureError> {
        let container = self.resolve_container(container)?;
        let blob_name = self.prefixed_name(blob_name);
        debug!(container = %container, blob_name = %blob_name, "deleting blob");

        let blob_client = self.service_client.blob_client(container, &blob_name);
        blob_client
            .delete(None)
            .await
            .map_err(|e| sdk_error("delete_blob", &e))?;

        info!(container = %container, blob_name = %blob_name, "blob deleted");
        Ok(())
    }

    /// Verify the client can reach the storage account.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AzureError> {
        debug!("performing Azure Blob health check");
        // Fetching the first page exercises the credential and the endpoint.
        let mut pager = self
            .service_client
            .list_containers(None)
            .map_err(|e| AzureError::Connection(format!("Azure Blob health check failed: {e}")))?;
        pager
            .try_next()
            .await
            .map_err(|e| AzureError::Connection(format!("Azure Blob health check failed: {e}")))?;
        info!("Azure Blob health check passed");
        Ok(())
    }
}

fn resolve_container<'a>(
    container: Option<&'a str>,
    default: Option<&'a str>,
) -> Result<&'a str, AzureError> {
    container
        .filter(|c| !c.is_empty())
        .or(default)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AzureError::Configuration("no container given or configured".to_owned()))
}

fn prefixed_name(prefix: Option<&str>, blob_name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{blob_name}"),
        None => blob_name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_new_sets_account() {
        let config = BlobConfig::new("mystorageaccount");
        assert_eq!(config.account_name.as_deref(), Some("mystorageaccount"));
        assert!(config.container_name.is_none());
        assert!(config.prefix.is_none());
    }

    #[test]
    fn endpoint_from_account_name() {
        let config = BlobConfig::new("archive");
        assert_eq!(
            config.endpoint().unwrap(),
            "https://archive.blob.core.windows.net"
        );
    }

    #[test]
    fn endpoint_override_wins() {
        let config =
            BlobConfig::new("archive").with_endpoint_url("http://127.0.0.1:10000/devstoreaccount1/");
        assert_eq!(
            config.endpoint().unwrap(),
            "http://127.0.0.1:10000/devstoreaccount1"
        );
    }

    #[test]
    fn endpoint_requires_account_or_url() {
        let err = BlobConfig::default().endpoint().unwrap_err();
        assert!(matches!(err, AzureError::Configuration(_)));
    }

    #[test]
    fn config_debug_redacts() {
        let config = BlobConfig::new("mystorageaccount").with_azure(
            AzureBaseConfig::new().with_client_credential("private-val"),
        );
        let debug = format!("{config:?}");
        assert!(debug.contains("BlobConfig"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("mystorageaccount"));
        assert!(!debug.contains("private-val"));
    }

    #[test]
    fn config_from_toml_flattens_azure() {
        let config: BlobConfig = toml::from_str(
            r#"
            account_name = "archive"
            container_name = "backups"
            prefix = "data/"
            endpoint_url = "http://azurite:10000/devstoreaccount1"
            "#,
        )
        .unwrap();
        assert_eq!(config.account_name.as_deref(), Some("archive"));
        assert_eq!(config.container_name.as_deref(), Some("backups"));
        assert_eq!(config.prefix.as_deref(), Some("data/"));
        assert_eq!(
            config.azure.endpoint_url.as_deref(),
            Some("http://azurite:10000/devstoreaccount1")
        );
    }

    #[test]
    fn container_argument_overrides_default() {
        assert_eq!(resolve_container(Some("a"), Some("b")).unwrap(), "a");
        assert_eq!(resolve_container(None, Some("b")).unwrap(), "b");
        assert!(resolve_container(None, None).is_err());
        assert!(resolve_container(Some(""), None).is_err());
        assert_eq!(resolve_container(Some(""), Some("b")).unwrap(), "b");
    }

    #[tokio::test]
    async fn health_check_fails_for_unreachable_endpoint() {
        let config = BlobConfig::new("devstoreaccount1")
            .with_endpoint_url("https://127.0.0.1:9/devstoreaccount1");
        let result = match BlobStore::new(config) {
            Ok(store) => {
                tokio::time::timeout(std::time::Duration::from_secs(60), store.health_check())
                    .await
                    .unwrap_or(Err(AzureError::Timeout(std::time::Duration::from_secs(60))))
            }
            Err(e) => Err(e),
        };
        assert!(result.is_err());
    }

    #[test]
    fn prefix_is_prepended() {
        assert_eq!(prefixed_name(Some("logs/"), "a.txt"), "logs/a.txt");
        assert_eq!(prefixed_name(None, "a.txt"), "a.txt");
    }

    #[tokio::test]
    async fn local_file_helpers_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/report.bin");

        write_local_file(&path, b"\x00\x01payload").await.unwrap();
        let data = read_local_file(&path).await.unwrap();
        assert_eq!(data, b"\x00\x01payload");
    }

    #[tokio::test]
    async fn read_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");

        let err = read_local_file(&path).await.unwrap_err();
        assert!(matches!(err, AzureError::Io { .. }));
        assert!(err.to_string().contains("missing.txt"));
    }
}
