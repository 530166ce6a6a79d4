//! Authenticated HTTP session shared by queries, location resolution and downloads.

use super::cookies::CookieJar;
use super::netrc::Netrc;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{COOKIE, LOCATION, PROXY_AUTHORIZATION};
use reqwest::redirect::Policy;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

/// Earthdata Login username and password
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Look up the entry for `host` in a credential file
    pub fn from_netrc(netrc: &Netrc, host: &str) -> Option<Self> {
        netrc
            .authenticators(host)
            .map(|entry| Self::new(entry.login.clone(), entry.password.clone()))
    }

    /// `Proxy-Authorization` header value
    pub(crate) fn proxy_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Which credentials a request carries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum AuthMode {
    /// None, used for the public search endpoint
    #[default]
    None,
    /// `Authorization: Basic`
    Basic,
    /// `Proxy-Authorization: Basic` without the regular header
    Proxy,
}

/// Per-request settings for [`Session::get`]
#[derive(Clone, Debug, Default)]
pub(crate) struct RequestOptions {
    pub auth: AuthMode,
    pub follow_redirects: bool,
    /// Query parameters, applied to the first request only
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub(crate) fn authenticated(follow_redirects: bool) -> Self {
        Self {
            auth: AuthMode::Basic,
            follow_redirects,
            ..Self::default()
        }
    }

    pub(crate) fn public() -> Self {
        Self {
            auth: AuthMode::None,
            follow_redirects: true,
            ..Self::default()
        }
    }
}

/// One redirect answered while following a chain
#[derive(Clone, Debug)]
pub(crate) struct Hop {
    pub url: Url,
    pub status: StatusCode,
    pub location: Option<Url>,
}

/// Final response of a request plus the redirects that led to it
#[derive(Debug)]
pub(crate) struct Exchange {
    pub response: reqwest::Response,
    pub history: Vec<Hop>,
}

impl Exchange {
    /// `Location` header of the final response, resolved against its URL
    pub(crate) fn location(&self) -> Option<Url> {
        let value = self.response.headers().get(LOCATION)?.to_str().ok()?;
        self.response.url().join(value).ok()
    }
}

struct SessionInner {
    client: reqwest::Client,
    credentials: Credentials,
    cookies: CookieJar,
    identity_host: String,
    max_redirects: usize,
}

/// HTTP session carrying Earthdata credentials and a cookie jar
///
/// Cloning is cheap: clones share the connection pool and the cookie jar. Redirects are
/// followed by the session itself so every hop is visible to location resolution and
/// every cookie set along the way is kept. Credentials are only sent to the host a
/// request started at and to the identity provider.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("credentials", &self.inner.credentials)
            .field("identity_host", &self.inner.identity_host)
            .field("cookies", &self.inner.cookies.len())
            .finish()
    }
}

impl Session {
    /// Create a session
    ///
    /// Explicit credentials win; otherwise the credential file (configured path, then
    /// `~/.netrc`) is searched for the identity-provider host.
    ///
    /// # Errors
    ///
    /// [`Error::AuthUnavailable`] when no credentials can be found, [`Error::Credentials`]
    /// when the credential file is malformed.
    pub fn new(credentials: Option<Credentials>, config: &ClientConfig) -> Result<Self> {
        let identity_host = config.auth.identity_host.clone();
        let credentials = match credentials {
            Some(c) => c,
            None => {
                let netrc = match &config.auth.netrc_path {
                    Some(path) => Netrc::load(path)?,
                    None => match Netrc::default_path() {
                        Some(path) => Netrc::load(path)?,
                        None => Netrc::default(),
                    },
                };
                Credentials::from_netrc(&netrc, &identity_host).ok_or_else(|| {
                    Error::AuthUnavailable {
                        host: identity_host.clone(),
                    }
                })?
            }
        };

        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .user_agent(config.http.user_agent.clone())
            .connect_timeout(config.http.connect_timeout);
        if let Some(timeout) = config.http.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        debug!(username = %credentials.username, host = %identity_host, "session created");
        Ok(Self {
            inner: Arc::new(SessionInner {
                client,
                credentials,
                cookies: CookieJar::new(),
                identity_host,
                max_redirects: config.download.max_redirects,
            }),
        })
    }

    /// Credentials used by this session
    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// Cookies collected so far
    pub fn cookies(&self) -> &CookieJar {
        &self.inner.cookies
    }

    fn sends_credentials(&self, host: &str, origin: &str) -> bool {
        host.eq_ignore_ascii_case(origin) || host.eq_ignore_ascii_case(&self.inner.identity_host)
    }

    /// Issue a GET, following redirects when asked
    pub(crate) async fn get(&self, url: Url, options: &RequestOptions) -> Result<Exchange> {
        let origin = url.host_str().unwrap_or_default().to_string();
        let mut current = url;
        let mut history: Vec<Hop> = Vec::new();

        loop {
            let host = current.host_str().unwrap_or_default().to_ascii_lowercase();
            let mut request = self.inner.client.get(current.clone());
            if history.is_empty() && !options.query.is_empty() {
                request = request.query(&options.query);
            }
            for (name, value) in &options.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(cookies) = self.inner.cookies.header_value(&host, Utc::now()) {
                request = request.header(COOKIE, cookies);
            }
            if self.sends_credentials(&host, &origin) {
                let creds = &self.inner.credentials;
                request = match options.auth {
                    AuthMode::None => request,
                    AuthMode::Basic => request.basic_auth(&creds.username, Some(&creds.password)),
                    AuthMode::Proxy => request.header(PROXY_AUTHORIZATION, creds.proxy_header()),
                };
            }

            let response = request.send().await?;
            self.inner.cookies.store_response_cookies(&response, &host);
            let status = response.status();
            trace!(url = %response.url(), status = status.as_u16(), "response");

            if !options.follow_redirects || !status.is_redirection() {
                return Ok(Exchange { response, history });
            }
            let Some(raw) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
            else {
                return Ok(Exchange { response, history });
            };
            let next = response
                .url()
                .join(&raw)
                .map_err(|e| Error::invalid_url(raw.clone(), e.to_string()))?;

            history.push(Hop {
                url: response.url().clone(),
                status,
                location: Some(next.clone()),
            });
            if history.len() > self.inner.max_redirects {
                return Err(Error::UnexpectedStatus {
                    url: response.url().to_string(),
                    status: status.as_u16(),
                });
            }
            debug!(from = %response.url(), to = %next, "following redirect");
            current = next;
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with_netrc(dir: &TempDir, contents: Option<&str>) -> ClientConfig {
        let path = dir.path().join(".netrc");
        if let Some(contents) = contents {
            std::fs::write(&path, contents).unwrap();
        }
        let mut config = ClientConfig::default();
        config.auth.netrc_path = Some(path);
        config
    }

    #[test]
    fn explicit_credentials_win() {
        let dir = TempDir::new().unwrap();
        let config = config_with_netrc(&dir, Some("machine urs.earthdata.nasa.gov login n password p\n"));
        let session = Session::new(Some(Credentials::new("explicit", "pw")), &config).unwrap();
        assert_eq!(session.credentials().username, "explicit");
    }

    #[test]
    fn credentials_fall_back_to_netrc() {
        let dir = TempDir::new().unwrap();
        let config = config_with_netrc(
            &dir,
            Some("machine urs.earthdata.nasa.gov\nlogin alice\npassword s3cret\n"),
        );
        let session = Session::new(None, &config).unwrap();
        assert_eq!(session.credentials(), &Credentials::new("alice", "s3cret"));
    }

    #[test]
    fn missing_credentials_are_auth_unavailable() {
        let dir = TempDir::new().unwrap();
        let config = config_with_netrc(&dir, None);
        let err = Session::new(None, &config).unwrap_err();
        assert!(matches!(err, Error::AuthUnavailable { ref host } if host == "urs.earthdata.nasa.gov"));

        let config = config_with_netrc(&dir, Some("machine other.example.com login a password b\n"));
        let err = Session::new(None, &config).unwrap_err();
        assert_eq!(err.code(), "auth_unavailable");
    }

    #[test]
    fn proxy_header_is_basic_token() {
        let creds = Credentials::new("user", "pass");
        assert_eq!(creds.proxy_header(), "Basic dXNlcjpwYXNz");
        assert!(!format!("{creds:?}").contains("\"pass\""));
    }

    #[tokio::test]
    async fn follows_redirects_and_records_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/middle")
                    .insert_header("Set-Cookie", "DATA=abc; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/middle"))
            .and(header("Cookie", "DATA=abc"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/end"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/end"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .mount(&server)
            .await;

        let session = Session::new(Some(Credentials::new("u", "p")), &ClientConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/start", server.uri())).unwrap();
        let exchange = session
            .get(url, &RequestOptions::authenticated(true))
            .await
            .unwrap();

        assert_eq!(exchange.response.status(), StatusCode::OK);
        assert_eq!(exchange.history.len(), 2);
        assert_eq!(exchange.history[1].location.as_ref().unwrap().path(), "/end");
        assert_eq!(session.cookies().get("DATA").unwrap().value, "abc");
    }

    #[tokio::test]
    async fn stops_at_redirect_when_not_following() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.hdf"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "https://elsewhere.example.com/x"))
            .mount(&server)
            .await;

        let session = Session::new(Some(Credentials::new("u", "p")), &ClientConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/file.hdf", server.uri())).unwrap();
        let exchange = session
            .get(url, &RequestOptions::authenticated(false))
            .await
            .unwrap();

        assert!(exchange.history.is_empty());
        assert_eq!(
            exchange.location().unwrap().as_str(),
            "https://elsewhere.example.com/x"
        );
    }

    #[tokio::test]
    async fn too_many_redirects_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .mount(&server)
            .await;

        let mut config = ClientConfig::default();
        config.download.max_redirects = 3;
        let session = Session::new(Some(Credentials::new("u", "p")), &config).unwrap();
        let url = Url::parse(&format!("{}/loop", server.uri())).unwrap();
        let err = session
            .get(url, &RequestOptions::public())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { status: 302, .. }));
    }
}
