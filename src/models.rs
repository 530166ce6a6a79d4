//! Records returned by the search API.
//!
//! Only the fields needed to select and fetch files are required; everything else is
//! optional so upstream schema additions never break decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

/// Link attached to a search record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiLink {
    /// Target URL; spaces are percent-encoded before parsing
    #[serde(deserialize_with = "deserialize_href")]
    pub href: Url,

    /// Relation type, without a trailing `#`
    #[serde(default, deserialize_with = "deserialize_rel")]
    pub rel: String,

    /// Language of the target
    #[serde(default)]
    pub hreflang: Option<String>,

    /// Media type of the target
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
}

/// Link attached to a granule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GranuleLink {
    /// Common link fields
    #[serde(flatten)]
    pub link: ApiLink,

    /// Whether the link was inherited from the collection
    #[serde(default)]
    pub inherited: Option<bool>,
}

impl GranuleLink {
    /// Host, path and media type of the link
    pub fn to_link(&self) -> Link {
        Link {
            host: self.link.href.host_str().unwrap_or_default().to_string(),
            path: self.link.href.path().to_string(),
            media_type: self.link.media_type.clone(),
        }
    }
}

/// Host/path/type triple used to pick the right asset among a record's links
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    /// URL host
    pub host: String,
    /// URL path
    pub path: String,
    /// Declared media type
    pub media_type: Option<String>,
}

/// One downloadable data file's metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Granule {
    /// Concept id (e.g. "G1234-LPDAAC_ECS")
    pub id: String,
    /// Granule title
    #[serde(default)]
    pub title: String,
    /// Dataset name
    #[serde(default)]
    pub dataset_id: Option<String>,
    /// Coordinate system of the spatial extent
    #[serde(default)]
    pub coordinate_system: Option<String>,
    /// Concept id of the owning collection
    #[serde(default)]
    pub collection_concept_id: Option<String>,
    /// Start of the acquisition time range
    #[serde(default)]
    pub time_start: Option<DateTime<Utc>>,
    /// End of the acquisition time range
    #[serde(default)]
    pub time_end: Option<DateTime<Utc>>,
    /// Last metadata update
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    /// Size in megabytes
    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub granule_size: Option<f64>,
    /// Cloud cover percentage as reported
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub cloud_cover: Option<String>,
    /// Day/night flag
    #[serde(default)]
    pub day_night_flag: Option<String>,
    /// Producer's file name
    #[serde(default)]
    pub producer_granule_id: Option<String>,
    /// Footprint polygons as coordinate strings
    #[serde(default)]
    pub polygons: Option<Vec<Vec<String>>>,
    /// Data, metadata and browse links
    pub links: Vec<GranuleLink>,
}

impl Granule {
    /// Acquisition time range
    pub fn time_range(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (self.time_start, self.time_end)
    }

    /// Links as host/path/type triples
    pub fn links(&self) -> impl Iterator<Item = Link> + '_ {
        self.links.iter().map(GranuleLink::to_link)
    }
}

/// A named, versioned dataset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Concept id (e.g. "C1234-LPDAAC_ECS")
    pub id: String,
    /// Collection title
    #[serde(default)]
    pub title: String,
    /// Short name (e.g. "MOD13A1")
    #[serde(default)]
    pub short_name: String,
    /// Version (e.g. "061")
    #[serde(default)]
    pub version_id: String,
    /// Dataset name
    #[serde(default)]
    pub dataset_id: Option<String>,
    /// Coordinate system of the spatial extent
    #[serde(default)]
    pub coordinate_system: Option<String>,
    /// Processing level
    #[serde(default)]
    pub processing_level_id: Option<String>,
    /// Free-text description
    #[serde(default)]
    pub summary: Option<String>,
    /// Start of the temporal extent
    #[serde(default)]
    pub time_start: Option<DateTime<Utc>>,
    /// Last metadata update
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    /// Related links
    #[serde(default)]
    pub links: Vec<ApiLink>,
}

/// A page of search results (`feed` object of a JSON response)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feed<T> {
    /// Feed title
    #[serde(default)]
    pub title: Option<String>,
    /// When the feed was generated
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    /// Records on this page
    pub entry: Vec<T>,
}

/// Feed of granules
pub type GranuleFeed = Feed<Granule>;

/// Feed of collections
pub type CollectionFeed = Feed<Collection>;

/// Top-level JSON response body
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct FeedResponse<T> {
    pub feed: Feed<T>,
}

fn deserialize_href<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Url::parse(&raw.replace(' ', "%20")).map_err(serde::de::Error::custom)
}

fn deserialize_rel<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim_end_matches('#').to_string())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

fn deserialize_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<NumberOrString>::deserialize(deserializer)?.map(|v| match v {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::String(s) => s,
        }),
    )
}
