//! Small helpers shared by the CLI and the backend client.
//!
//! - **Text**: channel titles come from a remote service and are printed to a
//!   terminal, so they are sanitized and fitted to column widths here.
//! - **URL validation**: the backend base URL must be well-formed and must not
//!   send the session cookie over plain HTTP to a non-local host.

mod text;
mod url_validator;

pub use text::{fit_to_width, sanitize_title};
pub use url_validator::{validate_backend_url, UrlValidationError};
