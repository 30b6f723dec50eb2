//! Utility functions shared by the CLI and the HTTP feed source.
//!
//! - **URL policy**: which feed URLs may be registered and fetched

mod url_validator;

pub use url_validator::{UrlError, UrlPolicy};
