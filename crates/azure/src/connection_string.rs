//! Parsing of Event Hubs connection strings.
//!
//! ```text
//! Endpoint=sb://<namespace>.servicebus.windows.net/;SharedAccessKeyName=<name>;SharedAccessKey=<key>;EntityPath=<hub>
//! ```

use std::str::FromStr;

use crate::error::AzureError;

/// The parts of an Event Hubs connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// Fully-qualified namespace host, without scheme or trailing slash.
    pub namespace: String,
    /// Event Hub name from `EntityPath`, if present.
    pub entity_path: Option<String>,
    pub shared_access_key_name: Option<String>,
    /// Redacted in `Debug`.
    pub shared_access_key: Option<String>,
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("namespace", &self.namespace)
            .field("entity_path", &self.entity_path)
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field(
                "shared_access_key",
                &self.shared_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ConnectionString {
    pub fn has_shared_key(&self) -> bool {
        self.shared_access_key.is_some()
    }
}

impl FromStr for ConnectionString {
    type Err = AzureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut endpoint = None;
        let mut entity_path = None;
        let mut key_name = None;
        let mut key = None;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                AzureError::Configuration(format!("connection string segment '{part}' has no '='"))
            })?;
            let value = value.trim().to_owned();
            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value),
                "entitypath" => entity_path = Some(value).filter(|v| !v.is_empty()),
                "sharedaccesskeyname" => key_name = Some(value),
                "sharedaccesskey" => key = Some(value),
                // e.g. UseDevelopmentEmulator
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or_else(|| {
            AzureError::Configuration("connection string is missing Endpoint".to_owned())
        })?;
        let namespace = endpoint
            .split_once("://")
            .map_or(endpoint.as_str(), |(_, rest)| rest)
            .trim_end_matches('/')
            .to_owned();
        if namespace.is_empty() {
            return Err(AzureError::Configuration(
                "connection string Endpoint has no host".to_owned(),
            ));
        }

        Ok(Self {
            namespace,
            entity_path,
            shared_access_key_name: key_name,
            shared_access_key: key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "Endpoint=sb://myns.servicebus.windows.net/;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=abc+def/ghi=;EntityPath=telemetry";

    #[test]
    fn parses_full_connection_string() {
        let cs: ConnectionString = FULL.parse().unwrap();
        assert_eq!(cs.namespace, "myns.servicebus.windows.net");
        assert_eq!(cs.entity_path.as_deref(), Some("telemetry"));
        assert_eq!(
            cs.shared_access_key_name.as_deref(),
            Some("RootManageSharedAccessKey")
        );
        // Base64 keys keep their trailing '='.
        assert_eq!(cs.shared_access_key.as_deref(), Some("abc+def/ghi="));
        assert!(cs.has_shared_key());
    }

    #[test]
    fn keys_are_case_insensitive_and_unordered() {
        let cs: ConnectionString = "entitypath=hub;ENDPOINT=sb://ns.example.net".parse().unwrap();
        assert_eq!(cs.namespace, "ns.example.net");
        assert_eq!(cs.entity_path.as_deref(), Some("hub"));
        assert!(!cs.has_shared_key());
    }

    #[test]
    fn trailing_semicolon_is_ignored() {
        let cs: ConnectionString = "Endpoint=sb://ns.example.net/;".parse().unwrap();
        assert_eq!(cs.namespace, "ns.example.net");
        assert!(cs.entity_path.is_none());
    }

    #[test]
    fn missing_endpoint_is_an_error() {
        let err = "EntityPath=hub".parse::<ConnectionString>().unwrap_err();
        assert!(matches!(err, AzureError::Configuration(_)));
    }

    #[test]
    fn segment_without_equals_is_an_error() {
        let err = "Endpoint=sb://ns;garbage"
            .parse::<ConnectionString>()
            .unwrap_err();
        assert!(err.to_string().contains("garbage"));
    }

    #[test]
    fn debug_redacts_key() {
        let cs: ConnectionString = FULL.parse().unwrap();
        let debug = format!("{cs:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("abc+def"));
    }
}
