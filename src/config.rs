//! Configuration types for cmr-dl

use crate::error::{Error, Result};
use crate::types::MimeType;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Well-known Earthdata hosts
pub mod hosts {
    /// Common Metadata Repository search API
    pub const API: &str = "cmr.earthdata.nasa.gov";
    /// Earthdata Login (URS) identity provider
    pub const URS: &str = "urs.earthdata.nasa.gov";
    /// Domain of the identity-provider login cookie
    pub const EARTHDATA: &str = ".earthdata.nasa.gov";
    /// LP DAAC data pool
    pub const LPDAAC: &str = "e4ftl01.cr.usgs.gov";
    /// NSIDC DAAC
    pub const NSIDC: &str = "n5eil01u.ecs.nsidc.org";
    /// LP DAAC cloud distribution
    pub const LPDAAC_CLOUD: &str = "data.lpdaac.earthdatacloud.nasa.gov";
    /// LAADS DAAC archive
    pub const LAADS: &str = "ladsweb.modaps.eosdis.nasa.gov";
    /// Ocean Biology DAAC data access
    pub const OCEANDATA: &str = "oceandata.sci.gsfc.nasa.gov";
    /// Ocean Biology DAAC cloud distribution
    pub const OCEANDATA_CLOUD: &str = "obdaac-tea.earthdatacloud.nasa.gov";
}

/// How the true download URL is obtained from a resource host
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectStrategy {
    /// Request without following redirects and read the `Location` header,
    /// retrying once with proxy credentials on 401
    #[default]
    GenericRedirect,
    /// Follow redirects and use the final landing URL
    FollowFinalLocation,
    /// Follow redirects and use the `Location` of the last redirect hop
    FollowPenultimateLocation,
}

/// A known resource host and the redirect convention it uses
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host name (e.g. "e4ftl01.cr.usgs.gov")
    pub host: String,

    /// Redirect strategy for this host (default: generic redirect)
    #[serde(default)]
    pub strategy: RedirectStrategy,
}

impl HostConfig {
    /// Create a host entry
    pub fn new(host: impl Into<String>, strategy: RedirectStrategy) -> Self {
        Self {
            host: host.into(),
            strategy,
        }
    }
}

/// Cookie set by a resource host once a download session is established
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCookie {
    /// Cookie name (e.g. "DATA")
    pub name: String,
    /// Domain the cookie must be scoped to
    pub domain: String,
}

/// Search API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the search API (default: "https://cmr.earthdata.nasa.gov")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Response format requested through the Accept header (default: json)
    #[serde(default)]
    pub mime_type: MimeType,

    /// Granules per page (default: 2000)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Granule sort key (default: "-start_date")
    #[serde(default = "default_sort_key")]
    pub sort_key: String,

    /// Only return downloadable granules (default: true)
    #[serde(default = "default_true")]
    pub downloadable: bool,

    /// Response header carrying the pagination cursor (default: "CMR-Search-After")
    #[serde(default = "default_cursor_header")]
    pub cursor_header: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            mime_type: MimeType::default(),
            page_size: default_page_size(),
            sort_key: default_sort_key(),
            downloadable: true,
            cursor_header: default_cursor_header(),
        }
    }
}

impl ApiConfig {
    /// Parsed base URL
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL {}: {}", self.base_url, e),
            key: Some("api.base_url".to_string()),
        })
    }

    /// Default parameters sent with every granule query
    pub fn default_granule_params(&self) -> Vec<(String, String)> {
        vec![
            ("downloadable".to_string(), self.downloadable.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
            ("sort_key".to_string(), self.sort_key.clone()),
        ]
    }
}

/// Authentication settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Identity-provider host, also the credential file entry (default: "urs.earthdata.nasa.gov")
    #[serde(default = "default_identity_host")]
    pub identity_host: String,

    /// Domain of the "already logged in" cookie (default: ".earthdata.nasa.gov")
    #[serde(default = "default_identity_cookie_domain")]
    pub identity_cookie_domain: String,

    /// Resource cookies proving direct download access, checked in order
    #[serde(default = "default_resource_cookies")]
    pub resource_cookies: Vec<ResourceCookie>,

    /// Credential file location (default: "~/.netrc")
    #[serde(default)]
    pub netrc_path: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_host: default_identity_host(),
            identity_cookie_domain: default_identity_cookie_domain(),
            resource_cookies: default_resource_cookies(),
            netrc_path: None,
        }
    }
}

/// Download behavior settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Destination directory when none is given per call (default: current directory)
    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    /// Write buffer size in bytes (default: 1 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Accepted file extensions when none are given per call
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Rewrite resource links to https before resolving (default: true)
    #[serde(default = "default_true")]
    pub upgrade_to_https: bool,

    /// Maximum redirect hops followed per request (default: 30)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            chunk_size: default_chunk_size(),
            extensions: default_extensions(),
            upgrade_to_https: true,
            max_redirects: default_max_redirects(),
        }
    }
}

/// HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout, including streaming a file body (None = unlimited)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
        }
    }
}

/// Retry configuration for transient download failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0, no retry)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for [`CmrClient`](crate::CmrClient) and [`Downloader`](crate::Downloader)
///
/// Every field has a default, so `ClientConfig::default()` talks to the production
/// Earthdata endpoints and an empty JSON object deserializes to the same thing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Search API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Authentication settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Known resource hosts and their redirect conventions
    #[serde(default = "default_hosts")]
    pub hosts: Vec<HostConfig>,

    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry settings for downloads
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            auth: AuthConfig::default(),
            hosts: default_hosts(),
            download: DownloadConfig::default(),
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Whether `host` is one of the known resource hosts
    pub fn is_resource_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| h.host.eq_ignore_ascii_case(host))
    }

    /// Redirect strategy for `host` (generic for unknown hosts)
    pub fn strategy_for(&self, host: &str) -> RedirectStrategy {
        self.hosts
            .iter()
            .find(|h| h.host.eq_ignore_ascii_case(host))
            .map(|h| h.strategy)
            .unwrap_or_default()
    }

    /// Check the configuration for values that can never work
    pub fn validate(&self) -> Result<()> {
        self.api.base_url()?;
        if self.api.page_size == 0 {
            return Err(Error::Config {
                message: "page size must be at least 1".to_string(),
                key: Some("api.page_size".to_string()),
            });
        }
        if self.download.chunk_size == 0 {
            return Err(Error::Config {
                message: "chunk size must be at least 1 byte".to_string(),
                key: Some("download.chunk_size".to_string()),
            });
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    format!("https://{}", hosts::API)
}

fn default_page_size() -> u32 {
    2000
}

fn default_sort_key() -> String {
    "-start_date".to_string()
}

fn default_cursor_header() -> String {
    "CMR-Search-After".to_string()
}

fn default_identity_host() -> String {
    hosts::URS.to_string()
}

fn default_identity_cookie_domain() -> String {
    hosts::EARTHDATA.to_string()
}

fn default_resource_cookies() -> Vec<ResourceCookie> {
    vec![
        ResourceCookie {
            name: "DATA".to_string(),
            domain: hosts::LPDAAC.to_string(),
        },
        ResourceCookie {
            name: "CIsForCookie_OPS".to_string(),
            domain: hosts::NSIDC.to_string(),
        },
    ]
}

fn default_hosts() -> Vec<HostConfig> {
    vec![
        HostConfig::new(hosts::LPDAAC, RedirectStrategy::GenericRedirect),
        HostConfig::new(hosts::NSIDC, RedirectStrategy::GenericRedirect),
        HostConfig::new(hosts::LPDAAC_CLOUD, RedirectStrategy::GenericRedirect),
        HostConfig::new(hosts::LAADS, RedirectStrategy::FollowFinalLocation),
        HostConfig::new(hosts::OCEANDATA, RedirectStrategy::GenericRedirect),
        HostConfig::new(
            hosts::OCEANDATA_CLOUD,
            RedirectStrategy::FollowPenultimateLocation,
        ),
    ]
}

fn default_chunk_size() -> usize {
    1 << 20
}

fn default_extensions() -> Vec<String> {
    ["hdf", "h5", "nc", "xml"]
        .iter()
        .map(|e| (*e).to_string())
        .collect()
}

fn default_max_redirects() -> usize {
    30
}

fn default_user_agent() -> String {
    concat!("cmr-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (as seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
