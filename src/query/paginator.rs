//! Cursor-based pagination over search results.
//!
//! The search API returns a continuation token in a response header. The token from
//! page N is sent back as a header on the request for page N+1, and a response without
//! the header is the last page. The cursor lives in a [`PaginationState`] owned by the
//! [`Paginator`], never on the shared session, so a download can run on the same
//! session while a query is still being drained.

use crate::auth::session::{RequestOptions, Session};
use crate::error::{Error, Result};
use crate::models::FeedResponse;
use crate::types::{Event, MimeType};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

/// Progress of one logical query
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaginationState {
    cursor: Option<String>,
    yielded: usize,
    pages: usize,
    done: bool,
}

impl PaginationState {
    /// Token to send with the next request
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Records handed out so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Whether the query is finished
    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Forward-only reader over the pages of one query
///
/// Re-running a query issues fresh requests; page boundaries may differ if the
/// upstream data changed in between.
pub struct Paginator<T> {
    session: Session,
    url: Url,
    params: Vec<(String, String)>,
    mime_type: MimeType,
    cursor_header: String,
    limit: Option<usize>,
    resource: String,
    state: PaginationState,
    event_tx: broadcast::Sender<Event>,
    _records: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Paginator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("url", &self.url.as_str())
            .field("resource", &self.resource)
            .field("limit", &self.limit)
            .field("state", &self.state)
            .finish()
    }
}

impl<T> Paginator<T>
where
    T: DeserializeOwned + Send + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session: Session,
        url: Url,
        resource: impl Into<String>,
        params: Vec<(String, String)>,
        mime_type: MimeType,
        cursor_header: impl Into<String>,
        limit: Option<usize>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            session,
            url,
            params,
            mime_type,
            cursor_header: cursor_header.into(),
            limit: limit.filter(|l| *l > 0),
            resource: resource.into(),
            state: PaginationState::default(),
            event_tx,
            _records: PhantomData,
        }
    }

    /// Current pagination state
    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.state.yielded >= limit)
    }

    fn decode_error(&self, message: impl Into<String>) -> Error {
        Error::QueryDecode {
            resource: self.resource.clone(),
            message: message.into(),
        }
    }

    /// Fetch the next page, or None once the query is finished
    ///
    /// The page is truncated so the total never exceeds the limit. Requests carry no
    /// credentials. A page that cannot be decoded fails the whole query.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.state.done || self.limit_reached() {
            self.state.done = true;
            self.state.cursor = None;
            return Ok(None);
        }

        let mut options = RequestOptions::public();
        options.query = self.params.clone();
        options
            .headers
            .push(("Accept".to_string(), self.mime_type.as_header_value().to_string()));
        if let Some(cursor) = &self.state.cursor {
            options.headers.push((self.cursor_header.clone(), cursor.clone()));
        }

        let exchange = self.session.get(self.url.clone(), &options).await?;
        let response = exchange.response;
        let status = response.status();
        let next_cursor = response
            .headers()
            .get(self.cursor_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        if !status.is_success() {
            let snippet: String = String::from_utf8_lossy(&body).chars().take(200).collect();
            return Err(self.decode_error(format!("HTTP {}: {}", status.as_u16(), snippet)));
        }
        let decoded: FeedResponse<T> =
            serde_json::from_slice(&body).map_err(|e| self.decode_error(e.to_string()))?;

        let mut entries = decoded.feed.entry;
        if let Some(limit) = self.limit {
            entries.truncate(limit.saturating_sub(self.state.yielded));
        }
        self.state.yielded += entries.len();
        self.state.pages += 1;

        match next_cursor {
            Some(cursor) if !entries.is_empty() => {
                self.state.cursor = Some(cursor);
                if self.limit_reached() {
                    self.state.done = true;
                }
            }
            _ => {
                self.state.cursor = None;
                self.state.done = true;
            }
        }

        debug!(
            resource = %self.resource,
            page = self.state.pages,
            records = entries.len(),
            has_more = !self.state.done,
            "page fetched"
        );
        self.event_tx
            .send(Event::PageFetched {
                resource: self.resource.clone(),
                page: self.state.pages,
                records: entries.len(),
                has_more: !self.state.done,
            })
            .ok();

        Ok(Some(entries))
    }

    /// Lazy stream of records across all pages
    ///
    /// Pages are requested only as the stream is polled. The first error ends the
    /// stream.
    pub fn into_stream(self) -> BoxStream<'static, Result<T>> {
        stream::try_unfold(self, |mut paginator| async move {
            let page = paginator.next_page().await?;
            Ok::<_, Error>(page.map(|records| (stream::iter(records.into_iter().map(Ok::<T, Error>)), paginator)))
        })
        .try_flatten()
        .boxed()
    }

    /// Drain every remaining page into a vector
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        while let Some(page) = self.next_page().await? {
            records.extend(page);
        }
        Ok(records)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::config::ClientConfig;
    use crate::models::Granule;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    struct NoHeader(&'static str);

    impl Match for NoHeader {
        fn matches(&self, request: &Request) -> bool {
            !request.headers.contains_key(self.0)
        }
    }

    fn granule(id: usize) -> serde_json::Value {
        json!({
            "id": format!("G{id}-LPDAAC_ECS"),
            "title": format!("granule {id}"),
            "links": [{
                "rel": "http://esipfed.org/ns/fedsearch/1.1/data#",
                "href": format!("https://e4ftl01.cr.usgs.gov/MOLT/MOD13A1.061/file{id}.hdf")
            }]
        })
    }

    fn page(ids: std::ops::Range<usize>) -> serde_json::Value {
        json!({ "feed": { "title": "ECHO granule metadata", "entry": ids.map(granule).collect::<Vec<_>>() } })
    }

    fn paginator(server: &MockServer, limit: Option<usize>) -> Paginator<Granule> {
        let config = ClientConfig::default();
        let session = Session::new(Some(Credentials::new("u", "p")), &config).unwrap();
        let url = Url::parse(&format!("{}/search/granules", server.uri())).unwrap();
        let (event_tx, _rx) = broadcast::channel(16);
        Paginator::new(
            session,
            url,
            "granules",
            vec![("concept_id".to_string(), "C1".to_string())],
            MimeType::Json,
            "CMR-Search-After",
            limit,
            event_tx,
        )
    }

    #[tokio::test]
    async fn cursor_is_forwarded_until_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/granules"))
            .and(query_param("concept_id", "C1"))
            .and(NoHeader("CMR-Search-After"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("CMR-Search-After", "[\"cursor-1\"]")
                    .set_body_json(page(0..3)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/granules"))
            .and(header("CMR-Search-After", "[\"cursor-1\"]"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(3..5)))
            .expect(1)
            .mount(&server)
            .await;

        let mut pages = paginator(&server, None);
        let first = pages.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(pages.state().cursor(), Some("[\"cursor-1\"]"));

        let second = pages.next_page().await.unwrap().unwrap();
        assert_eq!(second[0].id, "G3-LPDAAC_ECS");
        assert!(pages.state().is_done());
        assert_eq!(pages.state().cursor(), None);

        assert!(pages.next_page().await.unwrap().is_none());
        assert_eq!(pages.state().yielded(), 5);
    }

    #[tokio::test]
    async fn limit_truncates_and_stops_requesting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/granules"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("CMR-Search-After", "next")
                    .set_body_json(page(0..8)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let records = paginator(&server, Some(5)).collect().await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[4].id, "G4-LPDAAC_ECS");
    }

    #[tokio::test]
    async fn stream_yields_records_in_page_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(NoHeader("CMR-Search-After"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("CMR-Search-After", "c1")
                    .set_body_json(page(0..2)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("CMR-Search-After", "c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(2..4)))
            .mount(&server)
            .await;

        let ids: Vec<String> = paginator(&server, Some(0))
            .into_stream()
            .map_ok(|g| g.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["G0-LPDAAC_ECS", "G1-LPDAAC_ECS", "G2-LPDAAC_ECS", "G3-LPDAAC_ECS"]);
    }

    #[tokio::test]
    async fn empty_page_with_cursor_ends_the_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/granules"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("CMR-Search-After", "[\"stale\"]")
                    .set_body_json(page(0..0)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut pages = paginator(&server, None);
        let first = pages.next_page().await.unwrap().unwrap();
        assert!(first.is_empty());
        assert!(pages.state().is_done());
        assert_eq!(pages.state().cursor(), None);

        assert!(pages.next_page().await.unwrap().is_none());
        assert_eq!(pages.state().pages(), 1);
    }

    #[tokio::test]
    async fn queries_carry_no_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(NoHeader("Authorization"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(0..1)))
            .expect(1)
            .mount(&server)
            .await;

        let records = paginator(&server, None).collect().await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn malformed_page_is_query_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .mount(&server)
            .await;

        let err = paginator(&server, None).collect().await.unwrap_err();
        assert_eq!(err.code(), "query_decode_error");
    }

    #[tokio::test]
    async fn error_status_is_query_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "errors": ["bad temporal"] })))
            .mount(&server)
            .await;

        let err = paginator(&server, None).next_page().await.unwrap_err();
        assert!(matches!(err, Error::QueryDecode { ref message, .. } if message.contains("bad temporal")));
    }
}
