//! Mock search API and data pool for end-to-end tests

use cmr_dl::{ClientConfig, CmrClient, Credentials, HostConfig, RedirectStrategy};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Collection id used by the fixtures
pub const COLLECTION_ID: &str = "C1621091662-LPDAAC_ECS";

/// Cursor returned with the first granule page
pub const CURSOR: &str = "[\"1577836800000\",2153441281]";

/// Matches requests that lack a header
pub struct NoHeader(pub &'static str);

impl Match for NoHeader {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key(self.0)
    }
}

/// Matches a header by its exact raw value
///
/// wiremock's `header` matcher splits values on commas, which breaks cursors like
/// [`CURSOR`].
pub struct RawHeader(pub &'static str, pub &'static str);

impl Match for RawHeader {
    fn matches(&self, request: &Request) -> bool {
        request.headers.get(self.0).and_then(|v| v.to_str().ok()) == Some(self.1)
    }
}

/// Body served for a data file
pub fn file_body(name: &str) -> String {
    format!("HDF4 payload of {name}")
}

/// Granule record with a data link on `server` and a browse image elsewhere
pub fn granule(server: &MockServer, name: &str) -> Value {
    json!({
        "id": format!("G-{name}"),
        "title": format!("LPDAAC_ECS:{name}"),
        "collection_concept_id": COLLECTION_ID,
        "time_start": "2020-01-01T00:00:00.000Z",
        "time_end": "2020-01-16T23:59:59.000Z",
        "links": [
            {
                "rel": "http://esipfed.org/ns/fedsearch/1.1/browse#",
                "type": "image/jpeg",
                "href": format!("https://e4ftl01.cr.usgs.gov/WORKING/BRWS/{name}.jpg")
            },
            {
                "rel": "http://esipfed.org/ns/fedsearch/1.1/data#",
                "type": "application/x-hdfeos",
                "href": format!("{}/MOLT/MOD13A1.061/2020.01.01/{name}.hdf", server.uri())
            }
        ]
    })
}

fn feed(entries: Vec<Value>) -> Value {
    json!({ "feed": { "title": "ECHO granule metadata", "entry": entries } })
}

/// Mount a collection lookup, two granule pages and a redirecting data pool
///
/// Page one carries `first` and a cursor, page two carries `second` and no cursor.
pub async fn mount_archive(server: &MockServer, first: &[&str], second: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/search/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "feed": { "entry": [{
                "id": COLLECTION_ID,
                "short_name": "MOD13A1",
                "version_id": "061",
                "dataset_id": "MODIS/Terra Vegetation Indices 16-Day L3 Global 500m SIN Grid V061",
                "links": []
            }] }
        })))
        .mount(server)
        .await;

    let first_page: Vec<Value> = first.iter().map(|n| granule(server, n)).collect();
    let second_page: Vec<Value> = second.iter().map(|n| granule(server, n)).collect();
    Mock::given(method("GET"))
        .and(path("/search/granules"))
        .and(NoHeader("CMR-Search-After"))
        .and(NoHeader("Authorization"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("CMR-Search-After", CURSOR)
                .set_body_json(feed(first_page)),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/granules"))
        .and(RawHeader("CMR-Search-After", CURSOR))
        .and(NoHeader("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed(second_page)))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/MOLT/.+\.hdf$"))
        .respond_with(|req: &Request| {
            let name = req.url.path().rsplit('/').next().unwrap_or_default().to_string();
            ResponseTemplate::new(302).insert_header("Location", format!("/pool/{name}").as_str())
        })
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/pool/.+\.hdf$"))
        .respond_with(|req: &Request| {
            let name = req.url.path().rsplit('/').next().unwrap_or_default();
            let stem = name.trim_end_matches(".hdf");
            ResponseTemplate::new(200).set_body_string(file_body(stem))
        })
        .mount(server)
        .await;
}

/// Client pointed at `server`, treating it as a resource host
pub fn client(server: &MockServer) -> CmrClient {
    let mut config = ClientConfig::default();
    config.api.base_url = server.uri();
    config.download.upgrade_to_https = false;
    config
        .hosts
        .push(HostConfig::new("127.0.0.1", RedirectStrategy::GenericRedirect));
    CmrClient::new(config, Some(Credentials::new("earthdata-user", "earthdata-pass")))
        .expect("client construction failed")
}
