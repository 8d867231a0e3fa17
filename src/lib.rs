//! Cloudflare IP prefix provider
//!
//! This crate manages the mutable settings of a Cloudflare BYOIP prefix for
//! a Hemmer-style infrastructure orchestrator: its free-text description and
//! whether it is advertised over BGP. The prefix itself is provisioned out of
//! band, so creating the resource adopts it and deleting the resource only
//! drops it from state.
//!
//! # Overview
//!
//! - **Resource**: [`PrefixResource`] implements create/read/update/delete/import
//!   on top of a [`PrefixApi`] client
//! - **Provider**: [`IpPrefixProvider`] implements [`ProviderService`], the
//!   contract the orchestrator drives with JSON states
//! - **Client**: [`CloudflareClient`] talks to the Cloudflare v4 API over HTTPS
//! - **Schema & validation**: attribute descriptions and diagnostics
//! - **Logging**: `tracing` to stderr
//!
//! # Quick Start
//!
//! ```ignore
//! use cloudflare_ip_prefix_provider::{init_logging, IpPrefixProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = IpPrefixProvider::new();
//!     provider
//!         .configure(json!({"api_token": "...", "account_id": "..."}))
//!         .await?;
//!
//!     let state = provider
//!         .read("cloudflare_ip_prefix", json!({"prefix_id": "..."}))
//!         .await?;
//!     println!("{state}");
//!     Ok(())
//! }
//! ```
//!
//! # Resource attributes
//!
//! | Attribute       | Kind                | Notes                                  |
//! |-----------------|---------------------|----------------------------------------|
//! | `prefix_id`     | required, force new | identifier of an existing prefix        |
//! | `description`   | optional, computed  | pushed only when it differs from state |
//! | `advertisement` | optional, computed  | `"on"` or `"off"`                      |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod state;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{CloudflareClient, PrefixApi};
pub use config::ProviderConfig;
pub use error::{ApiError, ProviderError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{EnvLookup, IpPrefixProvider, ProviderService};
pub use resource::{Advertisement, PrefixResource, RESOURCE_TYPE};
pub use schema::ProviderSchema;
pub use state::ResourceData;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
