use std::sync::Arc;

use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::{ManagedIdentityCredentialOptions, UserAssignedId};
use tracing::{debug, info};

use crate::config::AzureBaseConfig;
use crate::error::AzureError;

/// Which credential [`build_azure_credential`] will construct for a config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    ServicePrincipal,
    ManagedIdentity,
    AzureCli,
}

impl CredentialKind {
    /// Select the credential kind for the given configuration.
    ///
    /// A complete service principal wins over managed identity, which wins
    /// over the Azure CLI login context.
    pub fn for_config(config: &AzureBaseConfig) -> Self {
        if config.has_service_principal() {
            Self::ServicePrincipal
        } else if config.use_managed_identity {
            Self::ManagedIdentity
        } else {
            Self::AzureCli
        }
    }
}

/// Build an Azure credential from the given [`AzureBaseConfig`].
///
/// If `tenant_id`, `client_id`, and `client_credential` are all present,
/// uses `ClientSecretCredential` for service-principal authentication.
/// With `use_managed_identity` set, uses `ManagedIdentityCredential`
/// (user-assigned when `client_id` is given). Otherwise falls back to
/// `AzureCliCredential`, which uses the Azure CLI login context.
///
/// # Errors
///
/// Returns [`AzureError::Credential`] if credential construction fails.
pub fn build_azure_credential(
    config: &AzureBaseConfig,
) -> Result<Arc<dyn TokenCredential>, AzureError> {
    match CredentialKind::for_config(config) {
        CredentialKind::ServicePrincipal => {
            let (Some(tenant_id), Some(client_id), Some(client_cred)) = (
                &config.tenant_id,
                &config.client_id,
                &config.client_credential,
            ) else {
                return Err(AzureError::Credential(
                    "incomplete service principal".to_owned(),
                ));
            };
            info!("using service-principal credentials for Azure");
            debug!(tenant_id = %tenant_id, "building ClientSecretCredential");

            let credential = azure_identity::ClientSecretCredential::new(
                tenant_id,
                client_id.clone(),
                Secret::new(client_cred.clone()),
                None,
            )
            .map_err(|e| AzureError::Credential(e.to_string()))?;

            Ok(credential)
        }
        CredentialKind::ManagedIdentity => {
            info!(
                user_assigned = config.client_id.is_some(),
                "using ManagedIdentityCredential for Azure"
            );
            let options = ManagedIdentityCredentialOptions {
                user_assigned_id: config.client_id.clone().map(UserAssignedId::ClientId),
                ..Default::default()
            };
            let credential = azure_identity::ManagedIdentityCredential::new(Some(options))
                .map_err(|e| AzureError::Credential(e.to_string()))?;

            Ok(credential)
        }
        CredentialKind::AzureCli => {
            info!("using AzureCliCredential for Azure");
            let credential = azure_identity::AzureCliCredential::new(None)
                .map_err(|e| AzureError::Credential(e.to_string()))?;

            Ok(credential)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_service_principal_selected_first() {
        let config = AzureBaseConfig::new()
            .with_tenant_id("tid")
            .with_client_id("cid")
            .with_client_credential("secret")
            .with_managed_identity(true);
        assert_eq!(
            CredentialKind::for_config(&config),
            CredentialKind::ServicePrincipal
        );
    }

    #[test]
    fn managed_identity_when_requested() {
        let config = AzureBaseConfig::new()
            .with_client_id("cid")
            .with_managed_identity(true);
        assert_eq!(
            CredentialKind::for_config(&config),
            CredentialKind::ManagedIdentity
        );
    }

    #[test]
    fn falls_back_to_cli() {
        let config = AzureBaseConfig::new().with_tenant_id("tid");
        assert_eq!(CredentialKind::for_config(&config), CredentialKind::AzureCli);
    }
}
