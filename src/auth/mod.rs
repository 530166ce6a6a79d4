//! Earthdata authentication: credential file, session and cookie state.

pub mod cookies;
pub mod netrc;
pub mod session;

pub use cookies::{CookieJar, SessionCookie};
pub use netrc::{Netrc, NetrcEntry, add_earthdata_netrc, remove_earthdata_netrc};
pub use session::{Credentials, Session};
