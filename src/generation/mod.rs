//! Generation provider client
//!
//! Abstraction over an external text-generation provider. The client is
//! stateless and holds no retry policy; retries and deadlines live in the
//! dispatcher.

mod client;
mod error;
mod http;

pub use client::GenerationClient;
#[cfg(test)]
pub use client::mock;
pub use error::GenerationError;
pub use http::HttpGenerationClient;
