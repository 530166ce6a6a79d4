//! Batch downloads across sequential or parallel workers

use super::executor::{FetchOutcome, fetch_file};
use crate::auth::Session;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::Granule;
use crate::types::{DownloadOptions, Event};
use crate::utils::path_has_extension;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::borrow::Borrow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

/// Downloads granule files with a shared session
///
/// Cloning is cheap; clones share the session, the configuration and the event
/// channel.
#[derive(Clone, Debug)]
pub struct Downloader {
    session: Session,
    config: Arc<ClientConfig>,
    event_tx: broadcast::Sender<Event>,
}

impl Downloader {
    /// Create a downloader with its own event channel
    pub fn new(session: Session, config: ClientConfig) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        Self::with_events(session, Arc::new(config), event_tx)
    }

    pub(crate) fn with_events(
        session: Session,
        config: Arc<ClientConfig>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            session,
            config,
            event_tx,
        }
    }

    /// Subscribe to download events
    ///
    /// Events are dropped for slow subscribers once the channel buffer (1000 events)
    /// is full.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Session used for every request
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// First link of `granule` served by a known resource host whose path ends with
    /// one of `extensions`
    ///
    /// # Errors
    ///
    /// [`Error::NoMatchingLink`] when no link qualifies.
    pub fn select_link<S: AsRef<str>>(&self, granule: &Granule, extensions: &[S]) -> Result<Url> {
        granule
            .links
            .iter()
            .map(|link| &link.link.href)
            .find(|href| {
                href.host_str()
                    .is_some_and(|host| self.config.is_resource_host(host))
                    && path_has_extension(href.path(), extensions)
            })
            .cloned()
            .ok_or_else(|| Error::NoMatchingLink {
                granule_id: granule.id.clone(),
                extensions: extensions.iter().map(|e| e.as_ref().to_string()).collect(),
            })
    }

    fn extensions<'a>(&'a self, options: &'a DownloadOptions) -> &'a [String] {
        options
            .extensions
            .as_deref()
            .unwrap_or(&self.config.download.extensions)
    }

    fn destination(&self, requested: Option<&Path>) -> PathBuf {
        requested
            .map(Path::to_path_buf)
            .or_else(|| self.config.download.download_dir.clone())
            .unwrap_or_default()
    }

    /// Download one file, returning its local path
    pub async fn fetch(&self, url: &Url, destination: Option<&Path>, force: bool) -> Result<PathBuf> {
        self.run_one(0, url, &self.destination(destination), force).await
    }

    async fn run_one(&self, index: usize, url: &Url, directory: &Path, force: bool) -> Result<PathBuf> {
        self.emit_event(Event::DownloadStarted {
            index,
            url: url.to_string(),
        });
        match fetch_file(&self.session, &self.config, url, directory, force).await {
            Ok(FetchOutcome::Skipped { path }) => {
                self.emit_event(Event::DownloadSkipped {
                    index,
                    path: path.clone(),
                });
                Ok(path)
            }
            Ok(FetchOutcome::Downloaded { path, bytes }) => {
                self.emit_event(Event::DownloadComplete {
                    index,
                    path: path.clone(),
                    bytes,
                });
                Ok(path)
            }
            Err(e) => {
                warn!(index, url = %url, error = %e, "download failed");
                self.emit_event(Event::DownloadFailed {
                    index,
                    url: url.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Download the matching file of every granule
    ///
    /// Links are selected for all granules before any download starts, so a granule
    /// without a matching link fails the batch up front. Results follow input order.
    ///
    /// # Errors
    ///
    /// [`Error::NoMatchingLink`] for a granule without a usable link, otherwise the
    /// first download failure.
    pub async fn download_granules<I>(&self, granules: I, options: &DownloadOptions) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator,
        I::Item: Borrow<Granule>,
    {
        let extensions = self.extensions(options);
        let urls = granules
            .into_iter()
            .map(|granule| self.select_link(granule.borrow(), extensions))
            .collect::<Result<Vec<_>>>()?;
        self.download_urls(&urls, options).await
    }

    /// Download every URL, stopping at the first failure
    ///
    /// Sequential mode fetches in input order. Parallel mode keeps up to the configured
    /// number of downloads in flight and drops the rest once one fails. Either way the
    /// returned paths line up with `urls`.
    pub async fn download_urls(&self, urls: &[Url], options: &DownloadOptions) -> Result<Vec<PathBuf>> {
        let directory = self.destination(options.destination.as_deref());
        let workers = options.concurrency.worker_count();
        info!(files = urls.len(), workers, directory = %directory.display(), "starting downloads");

        if options.concurrency.is_sequential() {
            let mut paths = Vec::with_capacity(urls.len());
            for (index, url) in urls.iter().enumerate() {
                paths.push(self.run_one(index, url, &directory, options.force).await?);
            }
            return Ok(paths);
        }

        stream::iter(urls.iter().enumerate())
            .map(|(index, url)| self.run_one(index, url, &directory, options.force))
            .buffered(workers)
            .try_collect()
            .await
    }

    /// Download every URL, keeping one result per input
    ///
    /// A failed file does not stop the others. `result[i]` belongs to `urls[i]`.
    pub async fn download_urls_settled(&self, urls: &[Url], options: &DownloadOptions) -> Vec<Result<PathBuf>> {
        let directory = self.destination(options.destination.as_deref());
        let workers = options.concurrency.worker_count();

        let results: Vec<Result<PathBuf>> = stream::iter(urls.iter().enumerate())
            .map(|(index, url)| self.run_one(index, url, &directory, options.force))
            .buffered(workers)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(files = urls.len(), failed, "downloads settled");
        results
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::config::{HostConfig, RedirectStrategy};
    use crate::types::Concurrency;
    use serde_json::json;
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader() -> Downloader {
        let mut config = ClientConfig::default();
        config.download.upgrade_to_https = false;
        config.hosts.push(HostConfig::new("127.0.0.1", RedirectStrategy::GenericRedirect));
        let session = Session::new(Some(Credentials::new("user", "pass")), &config).unwrap();
        Downloader::new(session, config)
    }

    fn granule(hrefs: &[&str]) -> Granule {
        let links: Vec<_> = hrefs
            .iter()
            .map(|href| json!({ "rel": "http://esipfed.org/ns/fedsearch/1.1/data#", "href": href }))
            .collect();
        serde_json::from_value(json!({ "id": "G1-LPDAAC_ECS", "links": links })).unwrap()
    }

    /// Serves `/MOLT/<name>` as a redirect to `/data/<name>`, whose body is the name
    async fn serve_files(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/MOLT/[^/]+$"))
            .respond_with(|req: &wiremock::Request| {
                let name = req.url.path().trim_start_matches("/MOLT/").to_string();
                ResponseTemplate::new(302).insert_header("Location", format!("/data/{name}").as_str())
            })
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/data/[^/]+$"))
            .respond_with(|req: &wiremock::Request| {
                let name = req.url.path().trim_start_matches("/data/").to_string();
                // later files answer sooner so completion order differs from input order
                let delay = 60u64.saturating_sub(name.len() as u64 * 4);
                ResponseTemplate::new(200)
                    .set_body_string(format!("contents of {name}"))
                    .set_delay(Duration::from_millis(delay))
            })
            .mount(server)
            .await;
    }

    #[test]
    fn select_link_matches_host_and_extension() {
        let d = downloader();
        let g = granule(&[
            "https://example.com/browse/granule.hdf",
            "https://e4ftl01.cr.usgs.gov/MOLT/granule.hdf.xml",
            "https://e4ftl01.cr.usgs.gov/MOLT/granule.hdf",
        ]);
        let url = d.select_link(&g, &["hdf", "nc"]).unwrap();
        assert_eq!(url.as_str(), "https://e4ftl01.cr.usgs.gov/MOLT/granule.hdf");
    }

    #[test]
    fn select_link_without_match_is_error() {
        let d = downloader();
        let g = granule(&["https://e4ftl01.cr.usgs.gov/MOLT/granule.hdf.xml"]);
        let err = d.select_link(&g, &["hdf", "nc"]).unwrap_err();
        assert!(matches!(
            err,
            Error::NoMatchingLink { ref granule_id, ref extensions }
                if granule_id == "G1-LPDAAC_ECS" && extensions == &["hdf", "nc"]
        ));
    }

    #[tokio::test]
    async fn parallel_results_follow_input_order() {
        let server = MockServer::start().await;
        serve_files(&server).await;
        let dir = TempDir::new().unwrap();
        let names = ["a.hdf", "bb.hdf", "ccc.hdf", "dddd.hdf", "eeeee.hdf"];
        let urls: Vec<Url> = names
            .iter()
            .map(|n| Url::parse(&format!("{}/MOLT/{n}", server.uri())).unwrap())
            .collect();

        for workers in [1usize, 2, 4] {
            let options = DownloadOptions::default()
                .with_destination(dir.path().join(workers.to_string()))
                .with_concurrency(Concurrency::Workers(NonZeroUsize::new(workers).unwrap()));
            let paths = downloader().download_urls(&urls, &options).await.unwrap();

            assert_eq!(paths.len(), names.len());
            for (path, name) in paths.iter().zip(names) {
                assert_eq!(path.file_name().unwrap().to_str().unwrap(), name);
                assert_eq!(std::fs::read_to_string(path).unwrap(), format!("contents of {name}"));
            }
        }
    }

    #[tokio::test]
    async fn sequential_emits_events_in_order() {
        let server = MockServer::start().await;
        serve_files(&server).await;
        let dir = TempDir::new().unwrap();
        let urls: Vec<Url> = ["x.hdf", "y.hdf"]
            .iter()
            .map(|n| Url::parse(&format!("{}/MOLT/{n}", server.uri())).unwrap())
            .collect();

        let d = downloader();
        let mut events = d.subscribe();
        let options = DownloadOptions::default().with_destination(dir.path());
        d.download_urls(&urls, &options).await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen[0], Event::DownloadStarted { index: 0, .. }));
        assert!(matches!(seen[1], Event::DownloadComplete { index: 0, .. }));
        assert!(matches!(seen[2], Event::DownloadStarted { index: 1, .. }));
        assert!(matches!(seen[3], Event::DownloadComplete { index: 1, .. }));
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn one_failure_fails_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/MOLT/missing.hdf"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        serve_files(&server).await;
        let dir = TempDir::new().unwrap();
        let urls: Vec<Url> = ["ok.hdf", "missing.hdf"]
            .iter()
            .map(|n| Url::parse(&format!("{}/MOLT/{n}", server.uri())).unwrap())
            .collect();

        let options = DownloadOptions::default()
            .with_destination(dir.path())
            .with_concurrency(Concurrency::from_threads(Some(2)));
        let err = downloader().download_urls(&urls, &options).await.unwrap_err();
        assert_eq!(err.code(), "location_not_found");
    }

    #[tokio::test]
    async fn settled_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/MOLT/missing.hdf"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        serve_files(&server).await;
        let dir = TempDir::new().unwrap();
        let urls: Vec<Url> = ["one.hdf", "missing.hdf", "three.hdf"]
            .iter()
            .map(|n| Url::parse(&format!("{}/MOLT/{n}", server.uri())).unwrap())
            .collect();

        let options = DownloadOptions::default()
            .with_destination(dir.path())
            .with_concurrency(Concurrency::from_threads(Some(3)));
        let results = downloader().download_urls_settled(&urls, &options).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().ends_with("one.hdf"));
        assert!(matches!(results[1], Err(Error::LocationNotFound { .. })));
        assert!(results[2].as_ref().unwrap().ends_with("three.hdf"));
    }

    #[tokio::test]
    async fn granule_without_link_fails_before_downloading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let good = granule(&[format!("{}/MOLT/a.hdf", server.uri()).as_str()]);
        let bad = granule(&["https://e4ftl01.cr.usgs.gov/MOLT/a.jpg"]);

        let options = DownloadOptions::default().with_extensions(["hdf"]);
        let err = downloader()
            .download_granules([good, bad], &options)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_matching_link");
    }
}
