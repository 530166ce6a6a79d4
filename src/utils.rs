//! Utility functions for URL and path handling

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use url::Url;

/// Local file name for a resource URL: the last path segment
///
/// # Examples
///
/// ```
/// use cmr_dl::utils::file_name_from_url;
/// use url::Url;
///
/// let url = Url::parse("https://e4ftl01.cr.usgs.gov/MOLT/MOD13A1.061/2020.01.01/MOD13A1.A2020001.h27v07.061.2020326033640.hdf").unwrap();
/// assert_eq!(file_name_from_url(&url).unwrap(), "MOD13A1.A2020001.h27v07.061.2020326033640.hdf");
/// ```
pub fn file_name_from_url(url: &Url) -> Result<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_url(url.as_str(), "URL path has no file name"))
}

/// Destination of a download: `dir/<last path segment>`
pub fn destination_path(dir: &Path, url: &Url) -> Result<PathBuf> {
    Ok(dir.join(file_name_from_url(url)?))
}

/// Same URL with the `https` scheme
pub fn ensure_https(url: &Url) -> Result<Url> {
    if url.scheme() == "https" {
        return Ok(url.clone());
    }
    let mut secure = url.clone();
    secure
        .set_scheme("https")
        .map_err(|()| Error::invalid_url(url.as_str(), "cannot switch scheme to https"))?;
    Ok(secure)
}

/// Whether `path` ends with any of `extensions` (plain suffix match, e.g. "hdf")
pub fn path_has_extension<S: AsRef<str>>(path: &str, extensions: &[S]) -> bool {
    extensions.iter().any(|ext| path.ends_with(ext.as_ref()))
}
