//! Property-path data sinks for WDM traits.
//!
//! A trait is a schema-described property bag owned by some resource and
//! kept in sync with a remote peer. This crate provides the client-side
//! view of one trait instance and the plumbing around it.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Store**: [`PropertyPathStore`], typed get/set by slash-delimited path
//! - **Backend**: [`DataSinkBackend`] / [`ClientBackend`], where the data
//!   actually lives and how it reaches the peer
//! - **Completion**: [`CompletionHandler`] and [`CompletionNotifier`],
//!   one outcome per refresh, delivered from the backend's context
//! - **Client**: [`WdmClient`], creates stores and keeps their reference table
//! - **Handles**: [`SinkHandle`], generation-checked so a released handle
//!   cannot reach another instance's state
//!
//! ## Lifecycle
//!
//! 1. Create a [`WdmClient`] over a backend
//! 2. [`WdmClient::new_data_sink`] for each trait instance of interest
//! 3. Stage writes with `set`, push them with [`WdmClient::flush_update`]
//! 4. Refresh with [`PropertyPathStore::begin_refresh_data`] and read back
//! 5. [`PropertyPathStore::shutdown`] or [`WdmClient::close`]
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wdm_sink::{ClientConfig, MemoryBackend, WdmClient};
//! use wdm_types::TraitDescriptor;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let client = WdmClient::new(backend, ClientConfig::default());
//!
//! let mut locale = client.new_data_sink(TraitDescriptor::new(20, 0)).unwrap();
//! locale.set("/1", "en-US").unwrap();
//! assert_eq!(locale.get_string("/1").unwrap().as_deref(), Some("en-US"));
//!
//! locale.shutdown();
//! assert!(locale.get_string("/1").is_err());
//! ```

mod backend;
mod client;
mod completion;
mod config;
mod error;
pub mod handle;
pub mod memory;
mod store;

pub use backend::{ClientBackend, DataSinkBackend};
pub use client::WdmClient;
pub use completion::{CompletionHandler, CompletionNotifier};
pub use config::{ClientConfig, InvalidHandlePolicy, StoreConfig};
pub use error::{SinkError, SinkResult};
pub use handle::{HandleTable, SinkHandle};
pub use memory::{MemoryBackend, MemoryBackendConfig};
pub use store::{PropertyPathStore, PropertyType};
