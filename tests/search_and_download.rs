//! End-to-end tests: collection lookup, paginated granule query, link selection and
//! parallel download against a mock search API and data pool.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --test search_and_download
//! ```

mod common;

use cmr_dl::{
    CollectionQuery, Concurrency, DateRange, DownloadOptions, Error, Event, GranuleApi,
    GranuleQuery, SpatialFilter,
};
use common::{COLLECTION_ID, client, file_body, mount_archive};
use futures::TryStreamExt;
use std::collections::HashSet;
use tempfile::TempDir;
use wiremock::MockServer;

#[tokio::test]
async fn query_then_download_in_parallel() {
    let server = MockServer::start().await;
    mount_archive(&server, &["h27v07", "h27v08", "h28v07"], &["h28v08", "h29v07"]).await;
    let client = client(&server);
    let dir = TempDir::new().unwrap();

    let collections = client
        .collections()
        .query(&CollectionQuery::new().modis_doi("MOD13A1", "061"))
        .await
        .unwrap();
    assert_eq!(collections[0].id, COLLECTION_ID);

    let query = GranuleQuery::new()
        .dates(DateRange::parse(Some("2020-01-01"), Some("2020-02-01"), None).unwrap())
        .spatial(SpatialFilter::bounding_box([55.0, 5.0, 105.0, 45.0]).unwrap());
    let granules = GranuleApi::from_collection(client.clone(), &collections[0])
        .collect(&query)
        .await
        .unwrap();
    assert_eq!(granules.len(), 5);

    let downloader = client.downloader();
    let mut events = downloader.subscribe();
    let options = DownloadOptions::default()
        .with_destination(dir.path())
        .with_concurrency(Concurrency::from_threads(Some(3)));
    let paths = downloader.download_granules(&granules, &options).await.unwrap();

    let expected = ["h27v07", "h27v08", "h28v07", "h28v08", "h29v07"];
    assert_eq!(paths.len(), expected.len());
    for (path, stem) in paths.iter().zip(expected) {
        assert_eq!(path, &dir.path().join(format!("{stem}.hdf")));
        assert_eq!(std::fs::read_to_string(path).unwrap(), file_body(stem));
    }

    let mut completed = HashSet::new();
    while let Ok(event) = events.try_recv() {
        if let Event::DownloadComplete { index, .. } = event {
            completed.insert(index);
        }
    }
    assert_eq!(completed, (0..5).collect());
}

#[tokio::test]
async fn second_run_skips_existing_files() {
    let server = MockServer::start().await;
    mount_archive(&server, &["h27v07"], &["h27v08"]).await;
    let client = client(&server);
    let dir = TempDir::new().unwrap();

    let granules = client.granules().collect(&GranuleQuery::new()).await.unwrap();
    let downloader = client.downloader();
    let options = DownloadOptions::default().with_destination(dir.path());
    let first = downloader.download_granules(&granules, &options).await.unwrap();

    let mut events = downloader.subscribe();
    let second = downloader.download_granules(&granules, &options).await.unwrap();
    assert_eq!(first, second);

    let mut skipped = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::DownloadSkipped { .. } => skipped += 1,
            Event::DownloadComplete { .. } => panic!("file fetched twice"),
            _ => {}
        }
    }
    assert_eq!(skipped, 2);
}

#[tokio::test]
async fn streamed_query_respects_limit_across_pages() {
    let server = MockServer::start().await;
    mount_archive(&server, &["a", "b"], &["c", "d"]).await;
    let client = client(&server);

    let ids: Vec<String> = client
        .granules()
        .query(&GranuleQuery::new().limit(3))
        .unwrap()
        .into_stream()
        .map_ok(|g| g.id)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(ids, vec!["G-a", "G-b", "G-c"]);
}

#[tokio::test]
async fn unmatched_extension_fails_the_batch() {
    let server = MockServer::start().await;
    mount_archive(&server, &["h27v07"], &[]).await;
    let client = client(&server);

    let granules = client.granules().collect(&GranuleQuery::new()).await.unwrap();
    let options = DownloadOptions::default().with_extensions(["nc"]);
    let err = client
        .downloader()
        .download_granules(&granules, &options)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoMatchingLink { ref granule_id, .. } if granule_id == "G-h27v07"));
}
