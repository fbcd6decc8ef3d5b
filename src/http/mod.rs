//! HTTP plumbing for trait implementations.
//!
//! The crate itself never decides *what* to download (that is the listing
//! collaborator's job), but implementations of
//! [`RemoteAsset`](crate::remote::RemoteAsset) that sit on top of HTTP all
//! need the same two pieces: a middleware-composed client and a ranged
//! chunk stream mapped into the transport-error taxonomy. Both live here.

pub mod client;
pub mod stream;

pub use client::{create_http_client, HttpClientConfig};
pub use stream::{open_byte_stream, parse_content_range_total};
