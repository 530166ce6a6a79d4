//! Session cookies and the "already authenticated for direct download" check.

use crate::config::AuthConfig;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, trace};

/// Identity-provider cookie set once a user has logged in
pub const LOGGED_IN_COOKIE: &str = "urs_user_already_logged";

/// Identity-provider UI session cookie
pub const GUI_SESSION_COOKIE: &str = "_urs-gui_session";

/// A cookie held by a [`Session`](crate::Session)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain scope; a leading dot covers subdomains, otherwise host-only
    pub domain: String,
    /// Expiry (None = session cookie)
    pub expires: Option<DateTime<Utc>>,
}

impl SessionCookie {
    /// Create a session cookie without an expiry
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            expires: None,
        }
    }

    /// Set the expiry
    pub fn expiring_at(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Whether the cookie has an expiry at or before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|e| e <= now)
    }

    /// Whether the expiry is known and later than `now`
    fn is_valid_until_after(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|e| e > now)
    }

    /// Whether the cookie would be sent to `host`
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let domain = self.domain.to_ascii_lowercase();
        match domain.strip_prefix('.') {
            Some(parent) => host == parent || host.ends_with(&domain),
            None => host == domain,
        }
    }
}

/// Thread-safe cookie store shared by all clones of a session
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<Vec<SessionCookie>>,
}

impl CookieJar {
    /// Create an empty jar
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SessionCookie>> {
        self.cookies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add a cookie, replacing any cookie with the same name and domain
    pub fn insert(&self, cookie: SessionCookie) {
        let mut cookies = self.lock();
        cookies.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain));
        cookies.push(cookie);
    }

    /// Most recently stored cookie called `name`
    pub fn get(&self, name: &str) -> Option<SessionCookie> {
        self.lock().iter().rev().find(|c| c.name == name).cloned()
    }

    /// Number of stored cookies
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the jar is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every cookie
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Record the `Set-Cookie` headers of a response received from `host`
    ///
    /// A `Domain` attribute that `host` does not fall under drops the cookie.
    pub(crate) fn store_response_cookies(&self, response: &reqwest::Response, host: &str) {
        let now = Utc::now();
        for cookie in response.cookies() {
            let domain = match cookie.domain() {
                Some(d) if d.starts_with('.') => d.to_ascii_lowercase(),
                Some(d) => format!(".{}", d.to_ascii_lowercase()),
                None => host.to_ascii_lowercase(),
            };
            let expires = match (cookie.max_age(), cookie.expires()) {
                (Some(max_age), _) => chrono::Duration::from_std(max_age)
                    .ok()
                    .and_then(|age| now.checked_add_signed(age)),
                (None, Some(at)) => Some(system_time_to_utc(at)),
                (None, None) => None,
            };
            let stored = SessionCookie {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
                domain,
                expires,
            };
            if !stored.matches_host(host) {
                debug!(name = %stored.name, domain = %stored.domain, host, "rejecting cookie for foreign domain");
                continue;
            }
            trace!(name = %stored.name, domain = %stored.domain, "storing cookie");
            if stored.is_expired_at(now) {
                self.lock()
                    .retain(|c| !(c.name == stored.name && c.domain == stored.domain));
            } else {
                self.insert(stored);
            }
        }
    }

    /// `Cookie` header value for a request to `host`
    pub(crate) fn header_value(&self, host: &str, now: DateTime<Utc>) -> Option<String> {
        let cookies = self.lock();
        let pairs: Vec<String> = cookies
            .iter()
            .filter(|c| c.matches_host(host) && !c.is_expired_at(now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Whether the jar already grants direct download access
    ///
    /// Requires an unexpired identity-provider login cookie whose value is `yes`, a
    /// resource-host cookie on its expected domain (the first configured convention
    /// present in the jar is the one checked), and an unexpired identity-provider UI
    /// session cookie. Any missing cookie or mismatch means "not authenticated".
    pub fn has_download_cookies(&self, auth: &AuthConfig) -> bool {
        self.has_download_cookies_at(auth, Utc::now())
    }

    pub(crate) fn has_download_cookies_at(&self, auth: &AuthConfig, now: DateTime<Utc>) -> bool {
        let Some(logged_in) = self.get(LOGGED_IN_COOKIE) else {
            return false;
        };
        if logged_in.domain != auth.identity_cookie_domain
            || !logged_in.is_valid_until_after(now)
            || logged_in.value != "yes"
        {
            return false;
        }

        let resource = auth
            .resource_cookies
            .iter()
            .find_map(|expected| self.get(&expected.name).map(|c| (expected, c)));
        match resource {
            Some((expected, cookie)) if cookie.domain == expected.domain => {}
            _ => return false,
        }

        let Some(gui) = self.get(GUI_SESSION_COOKIE) else {
            return false;
        };
        gui.domain == auth.identity_host && gui.is_valid_until_after(now)
    }
}

fn system_time_to_utc(at: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(at)
}
