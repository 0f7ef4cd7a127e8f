//! A WebSocket service that streams lines appended to a file.
//!
//! Every connected client gets its own session: a producer tails the source
//! file into a bounded queue, a write loop forwards those lines interleaved
//! with heartbeat probes, and a read loop keeps the connection alive for as
//! long as probe answers keep arriving. When a second file is configured the
//! session switches over to it after a fixed delay.
//!
//! # Example
//!
//! ```rust,no_run
//! use filewatch::{FileWatchServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         paths: vec!["app.log".into()],
//!         ..ServerConfig::default()
//!     };
//!     let server = FileWatchServer::new(config)?;
//!     let listener = tokio::net::TcpListener::bind(&server.config().addr).await?;
//!     server.serve(listener).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod demo;
mod error;
pub mod heartbeat;
pub mod hint;
pub mod monitor;
pub mod multiplexer;
pub mod page;
pub mod server;
pub mod session;
pub mod source;
pub mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

pub use config::{ServerConfig, SessionConfig, SourcePaths, StartPosition};
pub use error::{Error, Result};
pub use hint::ResumeHint;
pub use server::FileWatchServer;
pub use session::{CloseReason, SessionState, SessionSummary, run_session};
pub use source::{Line, LineOrigin, LineSource, SENTINEL_LINE};
pub use stream::LineStream;
