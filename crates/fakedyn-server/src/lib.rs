//! fakedyn server and client library.
//!
//! Serves a fakedyn [`Engine`](fakedyn_core::Engine) over a local Unix
//! socket so test suites and tools in other processes can share one store.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::FakedynClient;
pub use server::FakedynServer;
