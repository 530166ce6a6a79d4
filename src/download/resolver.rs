//! Location resolution: turn a resource link into the URL that serves the bytes.

use crate::auth::session::{AuthMode, Exchange, RequestOptions, Session};
use crate::config::{ClientConfig, RedirectStrategy};
use crate::error::{Error, Result};
use crate::utils::ensure_https;
use reqwest::StatusCode;
use tracing::{debug, trace};
use url::Url;

impl RedirectStrategy {
    /// Apply this host convention to `url`
    pub(crate) async fn resolve(&self, session: &Session, url: &Url) -> Result<Url> {
        let location = match self {
            RedirectStrategy::GenericRedirect => {
                let mut exchange = session
                    .get(url.clone(), &RequestOptions::authenticated(false))
                    .await?;
                if exchange.response.status() == StatusCode::UNAUTHORIZED {
                    debug!(url = %url, "basic auth refused, retrying with proxy auth");
                    let options = RequestOptions {
                        auth: AuthMode::Proxy,
                        ..RequestOptions::default()
                    };
                    exchange = session.get(url.clone(), &options).await?;
                }
                exchange.location()
            }
            RedirectStrategy::FollowFinalLocation => {
                let exchange = session
                    .get(url.clone(), &RequestOptions::authenticated(true))
                    .await?;
                log_hops(&exchange);
                Some(exchange.response.url().clone())
            }
            RedirectStrategy::FollowPenultimateLocation => {
                let exchange = session
                    .get(url.clone(), &RequestOptions::authenticated(true))
                    .await?;
                log_hops(&exchange);
                exchange.history.last().and_then(|hop| hop.location.clone())
            }
        };

        location.ok_or_else(|| Error::LocationNotFound {
            url: url.to_string(),
        })
    }
}

fn log_hops(exchange: &Exchange) {
    for hop in &exchange.history {
        trace!(url = %hop.url, status = hop.status.as_u16(), "redirect hop");
    }
}

/// Find the URL that actually serves a resource
///
/// When the session already holds valid download cookies the link is used as is.
/// Otherwise the link is upgraded to https (unless disabled) and resolved with the
/// redirect strategy configured for its host.
///
/// # Errors
///
/// [`Error::LocationNotFound`] when the host convention yields no URL.
pub async fn resolve_location(session: &Session, config: &ClientConfig, url: &Url) -> Result<Url> {
    if session.cookies().has_download_cookies(&config.auth) {
        debug!(url = %url, "download cookies present, skipping location lookup");
        return Ok(url.clone());
    }

    let target = if config.download.upgrade_to_https {
        ensure_https(url)?
    } else {
        url.clone()
    };
    let strategy = config.strategy_for(target.host_str().unwrap_or_default());
    let location = strategy.resolve(session, &target).await?;
    debug!(url = %url, location = %location, ?strategy, "location resolved");
    Ok(location)
}
