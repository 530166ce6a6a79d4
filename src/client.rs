//! Search API client
//!
//! [`CmrClient`] ties a [`Session`] to a [`ClientConfig`] and hands out the typed
//! resource APIs: [`CollectionApi`] for datasets, [`GranuleApi`] for the files in a
//! dataset, and a [`Downloader`] for fetching them. All of them share the client's
//! event channel.

use crate::auth::{Credentials, Session};
use crate::config::ClientConfig;
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::models::{Collection, Granule};
use crate::query::{CollectionQuery, GranuleQuery, Paginator, merge_params, set_param};
use crate::types::{Event, MimeType};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

/// Entry point for searching and downloading
#[derive(Clone, Debug)]
pub struct CmrClient {
    session: Session,
    config: Arc<ClientConfig>,
    event_tx: broadcast::Sender<Event>,
}

impl CmrClient {
    /// Create a client, authenticating with `credentials` or the credential file
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) for an unusable configuration,
    /// [`Error::AuthUnavailable`](crate::Error::AuthUnavailable) when no credentials
    /// can be found.
    pub fn new(config: ClientConfig, credentials: Option<Credentials>) -> Result<Self> {
        config.validate()?;
        let session = Session::new(credentials, &config)?;
        Ok(Self::with_session(session, config))
    }

    /// Create a client around an existing session
    pub fn with_session(session: Session, config: ClientConfig) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            session,
            config: Arc::new(config),
            event_tx,
        }
    }

    /// Session shared by every API of this client
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Subscribe to query and download events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// `<base>/search/<resource>`
    pub fn resource_url(&self, resource: &str) -> Result<Url> {
        let mut url = self.config.api.base_url()?;
        url.path_segments_mut()
            .map_err(|()| Error::invalid_url(self.config.api.base_url.as_str(), "base URL cannot have a path"))?
            .pop_if_empty()
            .extend(["search", resource]);
        Ok(url)
    }

    /// Collections resource
    pub fn collections(&self) -> CollectionApi {
        CollectionApi {
            client: self.clone(),
            mime_type: self.config.api.mime_type,
        }
    }

    /// Granules resource
    pub fn granules(&self) -> GranuleApi {
        GranuleApi::new(self.clone())
    }

    /// Downloader sharing this client's session and events
    pub fn downloader(&self) -> Downloader {
        Downloader::with_events(self.session.clone(), self.config.clone(), self.event_tx.clone())
    }

    fn paginator<T>(
        &self,
        resource: &str,
        params: Vec<(String, String)>,
        mime_type: MimeType,
        limit: Option<usize>,
    ) -> Result<Paginator<T>>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        Ok(Paginator::new(
            self.session.clone(),
            self.resource_url(resource)?,
            resource,
            params,
            mime_type,
            self.config.api.cursor_header.clone(),
            limit,
            self.event_tx.clone(),
        ))
    }
}

/// Dataset search
#[derive(Clone, Debug)]
pub struct CollectionApi {
    client: CmrClient,
    mime_type: MimeType,
}

impl CollectionApi {
    /// Response format requested from the API
    pub fn mime_type(&self) -> MimeType {
        self.mime_type
    }

    /// Change the response format by name (e.g. "json", "umm_json")
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) for an unknown name; the current format
    /// is kept.
    pub fn set_mime_type(&mut self, name: &str) -> Result<()> {
        self.mime_type = name.parse()?;
        Ok(())
    }

    /// Collections matching `query`, first page only
    ///
    /// # Errors
    ///
    /// [`Error::QueryDecode`](crate::Error::QueryDecode) when the response is not a
    /// collection feed.
    pub async fn query(&self, query: &CollectionQuery) -> Result<Vec<Collection>> {
        let mut pages: Paginator<Collection> =
            self.client
                .paginator("collections", query.params().to_vec(), self.mime_type, None)?;
        let collections = pages.next_page().await?.unwrap_or_default();
        debug!(count = collections.len(), "collections found");
        Ok(collections)
    }
}

/// Granule search within one or more collections
#[derive(Clone, Debug)]
pub struct GranuleApi {
    client: CmrClient,
    params: Vec<(String, String)>,
    mime_type: MimeType,
}

impl GranuleApi {
    /// Granule API with the configured default parameters
    pub fn new(client: CmrClient) -> Self {
        let params = client.config.api.default_granule_params();
        let mime_type = client.config.api.mime_type;
        Self {
            client,
            params,
            mime_type,
        }
    }

    /// Granule API restricted to `collection`
    pub fn from_collection(client: CmrClient, collection: &Collection) -> Self {
        Self::new(client).param("concept_id", collection.id.clone())
    }

    /// Set a parameter sent with every query of this API
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        set_param(&mut self.params, key.into(), value.into());
        self
    }

    /// Parameters sent with every query of this API
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Response format requested from the API
    pub fn mime_type(&self) -> MimeType {
        self.mime_type
    }

    /// Change the response format by name
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) for an unknown name.
    pub fn set_mime_type(&mut self, name: &str) -> Result<()> {
        self.mime_type = name.parse()?;
        Ok(())
    }

    /// Start a granule query
    ///
    /// Parameters of `query` override the API-level ones. Nothing is requested until
    /// the returned paginator is polled.
    pub fn query(&self, query: &GranuleQuery) -> Result<Paginator<Granule>> {
        let params = merge_params(&self.params, query.to_params());
        self.client
            .paginator("granules", params, self.mime_type, query.max_results())
    }

    /// Run a granule query to the end
    pub async fn collect(&self, query: &GranuleQuery) -> Result<Vec<Granule>> {
        self.query(query)?.collect().await
    }
}
