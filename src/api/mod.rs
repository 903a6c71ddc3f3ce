// API module.
// Provides the client, request construction, and namespace proxies for the REST API.

pub mod client;
pub mod namespace;
pub mod params;
pub mod request;
pub mod types;

pub use client::{ApiClient, decode_body};
pub use namespace::Namespace;
pub use params::Params;
pub use request::RequestSpec;
pub use types::{ClientStats, ErrorEnvelope, RateLimit};
