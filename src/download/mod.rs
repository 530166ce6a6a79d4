//! Downloading granule files
//!
//! A download runs in two steps. The [`resolver`] finds the URL that actually serves
//! the file, following the redirect convention of its host, and the [`executor`]
//! streams that URL to disk. The [`orchestrator`] runs batches of both, one at a time
//! or across parallel workers.

pub mod executor;
pub mod orchestrator;
pub mod resolver;

pub use executor::fetch;
pub use orchestrator::Downloader;
pub use resolver::resolve_location;
