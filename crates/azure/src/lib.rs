//! Azure clients for filetrigger.
//!
//! This crate provides feature-gated wrappers over the official Azure SDKs:
//!
//! - **Blob Storage** (`blob` feature): create/delete containers,
//!   upload/download blobs from files or memory
//! - **Event Hubs** (`eventhubs` feature): send single events and batches,
//!   receive from every partition until cancelled
//!
//! All clients share a common [`AzureBaseConfig`] for credentials and the
//! endpoint override.

pub mod auth;
pub mod batch;
pub mod config;
pub mod connection_string;
pub mod error;
pub mod event;
pub mod partition;

#[cfg(feature = "blob")]
pub mod blob;

#[cfg(feature = "eventhubs")]
pub mod eventhubs;

#[cfg(all(feature = "blob", feature = "eventhubs"))]
pub mod trigger;

// Re-exports for convenience.
pub use config::AzureBaseConfig;
pub use error::AzureError;
pub use batch::{BatchSink, send_in_batches};
pub use event::{
    BatchReport, OutgoingEvent, ReceiveOptions, ReceivedEvent, SendRoute, SendTarget, StartFrom,
};
pub use partition::PartitionReport;

#[cfg(feature = "blob")]
pub use blob::{BlobConfig, BlobStore};

#[cfg(feature = "eventhubs")]
pub use eventhubs::{EventHubsConfig, EventHubsConsumer, EventHubsProducer};

#[cfg(all(feature = "blob", feature = "eventhubs"))]
pub use trigger::{Components, FileTrigger, TriggerConfig};
