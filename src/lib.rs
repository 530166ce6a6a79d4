//! # cmr-dl
//!
//! Search NASA's Common Metadata Repository (CMR) for MODIS and other Earthdata
//! granules and download the matching files.
//!
//! ## Design Philosophy
//!
//! cmr-dl is designed to be:
//! - **Sensible defaults** - Talks to the production Earthdata endpoints out of the box
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Lazy** - Queries fetch pages only as results are consumed
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use cmr_dl::{
//!     CmrClient, ClientConfig, CollectionQuery, Concurrency, DateRange, DownloadOptions,
//!     GranuleApi, GranuleQuery, SpatialFilter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from ~/.netrc unless passed explicitly
//!     let client = CmrClient::new(ClientConfig::default(), None)?;
//!
//!     let collections = client
//!         .collections()
//!         .query(&CollectionQuery::new().short_name("MOD13A1").version("061"))
//!         .await?;
//!
//!     let query = GranuleQuery::new()
//!         .dates(DateRange::parse(Some("2020-01-01"), Some("2020-02-01"), None)?)
//!         .spatial(SpatialFilter::bounding_box([55.0, 5.0, 105.0, 45.0])?)
//!         .limit(10);
//!     let granules = GranuleApi::from_collection(client.clone(), &collections[0])
//!         .collect(&query)
//!         .await?;
//!
//!     let downloader = client.downloader();
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let options = DownloadOptions::default()
//!         .with_destination("downloads")
//!         .with_concurrency(Concurrency::from_threads(Some(-1)));
//!     let paths = downloader.download_granules(&granules, &options).await?;
//!     println!("downloaded {} files", paths.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Credentials, cookies and the HTTP session
pub mod auth;
/// Search API client
pub mod client;
/// Configuration types
pub mod config;
/// Location resolution and file downloads
pub mod download;
/// Error types
pub mod error;
/// Search records
pub mod models;
/// Query parameters and pagination
pub mod query;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use auth::{
    CookieJar, Credentials, Netrc, NetrcEntry, Session, SessionCookie, add_earthdata_netrc,
    remove_earthdata_netrc,
};
pub use client::{CmrClient, CollectionApi, GranuleApi};
pub use config::{ClientConfig, HostConfig, RedirectStrategy};
pub use download::{Downloader, fetch, resolve_location};
pub use error::{Error, Result};
pub use models::{ApiLink, Collection, Granule, GranuleLink, Link};
pub use query::{
    CollectionQuery, DateRange, Geometry, GranuleQuery, PaginationState, Paginator,
    SpatialFilter, SpatialInput,
};
pub use types::{Concurrency, DownloadOptions, Event, MimeType};
