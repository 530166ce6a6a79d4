//! Core types and events for cmr-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Response format requested from the search API
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MimeType {
    /// text/html
    Html,
    /// application/json
    #[default]
    Json,
    /// application/xml
    Xml,
    /// ECHO 10 metadata
    Echo10,
    /// ISO 19115 metadata
    Iso,
    /// ISO 19115 metadata (explicit name)
    Iso19115,
    /// DIF metadata
    Dif,
    /// DIF 10 metadata
    Dif10,
    /// text/csv
    Csv,
    /// Atom feed
    Atom,
    /// Open data JSON
    Opendata,
    /// Google Earth KML
    Kml,
    /// Native metadata format of the record
    Native,
    /// UMM JSON results
    UmmJson,
}

impl MimeType {
    /// Every supported format
    pub const ALL: [MimeType; 14] = [
        MimeType::Html,
        MimeType::Json,
        MimeType::Xml,
        MimeType::Echo10,
        MimeType::Iso,
        MimeType::Iso19115,
        MimeType::Dif,
        MimeType::Dif10,
        MimeType::Csv,
        MimeType::Atom,
        MimeType::Opendata,
        MimeType::Kml,
        MimeType::Native,
        MimeType::UmmJson,
    ];

    /// Value sent in the Accept header
    pub fn as_header_value(&self) -> &'static str {
        match self {
            MimeType::Html => "text/html",
            MimeType::Json => "application/json",
            MimeType::Xml => "application/xml",
            MimeType::Echo10 => "application/echo10+xml",
            MimeType::Iso | MimeType::Iso19115 => "application/iso19115+xml",
            MimeType::Dif => "application/dif+xml",
            MimeType::Dif10 => "application/dif10+xml",
            MimeType::Csv => "text/csv",
            MimeType::Atom => "application/atom+xml",
            MimeType::Opendata => "application/opendata+json",
            MimeType::Kml => "application/vnd.google-earth.kml+xml",
            MimeType::Native => "application/metadata+xml",
            MimeType::UmmJson => "application/vnd.nasa.cmr.umm_results+json",
        }
    }

    /// Short name used in configuration (e.g. "umm_json")
    pub fn name(&self) -> &'static str {
        match self {
            MimeType::Html => "html",
            MimeType::Json => "json",
            MimeType::Xml => "xml",
            MimeType::Echo10 => "echo10",
            MimeType::Iso => "iso",
            MimeType::Iso19115 => "iso19115",
            MimeType::Dif => "dif",
            MimeType::Dif10 => "dif10",
            MimeType::Csv => "csv",
            MimeType::Atom => "atom",
            MimeType::Opendata => "opendata",
            MimeType::Kml => "kml",
            MimeType::Native => "native",
            MimeType::UmmJson => "umm_json",
        }
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for MimeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MimeType::ALL
            .iter()
            .find(|m| m.name() == s)
            .copied()
            .ok_or_else(|| Error::Config {
                message: format!("invalid mime type: {s}"),
                key: Some("api.mime_type".to_string()),
            })
    }
}

/// How many downloads run at once
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Concurrency {
    /// One file at a time, in input order
    #[default]
    Sequential,
    /// A fixed number of parallel workers
    Workers(NonZeroUsize),
    /// All available cores except the given number
    AllBut(usize),
}

impl Concurrency {
    /// Interpret a signed thread count
    ///
    /// `None`, 0 and 1 run sequentially, values above 1 use that many workers, and
    /// negative values are relative to the available parallelism: -1 uses all cores,
    /// -2 all but one, and so on.
    pub fn from_threads(threads: Option<i64>) -> Self {
        match threads {
            None | Some(0) | Some(1) => Concurrency::Sequential,
            Some(n) if n > 1 => NonZeroUsize::new(usize::try_from(n).unwrap_or(usize::MAX))
                .map_or(Concurrency::Sequential, Concurrency::Workers),
            Some(n) => {
                let spare = n.unsigned_abs().saturating_sub(1);
                Concurrency::AllBut(usize::try_from(spare).unwrap_or(usize::MAX))
            }
        }
    }

    /// Number of workers to run, never below 1
    pub fn worker_count(&self) -> usize {
        match self {
            Concurrency::Sequential => 1,
            Concurrency::Workers(n) => n.get(),
            Concurrency::AllBut(spare) => {
                let available = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
                available.saturating_sub(*spare).max(1)
            }
        }
    }

    /// Whether downloads run one at a time
    pub fn is_sequential(&self) -> bool {
        matches!(self, Concurrency::Sequential)
    }
}

/// Options for a batch download
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    /// Accepted file extensions, matched against the end of the link path
    /// (None = configured defaults)
    pub extensions: Option<Vec<String>>,

    /// How many files are fetched at once
    pub concurrency: Concurrency,

    /// Destination directory (None = configured default, then current directory)
    pub destination: Option<PathBuf>,

    /// Download even if a file of the expected size already exists
    pub force: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            extensions: None,
            concurrency: Concurrency::Sequential,
            destination: None,
            force: false,
        }
    }
}

impl DownloadOptions {
    /// Accept only these extensions
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    /// Run with the given concurrency
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Save files into `destination`
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Re-download files even when they already exist
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Event emitted while querying and downloading
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A page of search results was decoded
    PageFetched {
        /// Search resource (e.g. "granules")
        resource: String,
        /// 1-based page number within the query
        page: usize,
        /// Records yielded from this page
        records: usize,
        /// Whether the server offered another page
        has_more: bool,
    },

    /// A file download started
    DownloadStarted {
        /// Position of the file in the batch
        index: usize,
        /// Resource URL
        url: String,
    },

    /// A file already existed with the expected size and was not fetched again
    DownloadSkipped {
        /// Position of the file in the batch
        index: usize,
        /// Existing local file
        path: PathBuf,
    },

    /// A file was written to disk
    DownloadComplete {
        /// Position of the file in the batch
        index: usize,
        /// Local file
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },

    /// A file could not be downloaded
    DownloadFailed {
        /// Position of the file in the batch
        index: usize,
        /// Resource URL
        url: String,
        /// Error message
        error: String,
    },
}
