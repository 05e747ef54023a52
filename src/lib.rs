//! # rom-dl
//!
//! Download and extraction engine for handheld-console game frontends.
//!
//! A frontend hands in a catalog entry (URL, platform, display name). rom-dl fetches
//! it into the platform's ROM folder, optionally unpacks ZIP/RAR archives, and keeps
//! a JSON download history. The UI thread never blocks: it polls task state or
//! subscribes to events.
//!
//! - **Two source kinds** - plain HTTP(S) URLs, and file hosts that hand out one-time
//!   download tokens behind an API key
//! - **Cancellable** - every task carries a cancellation token; cancelled tasks leave
//!   no partial files behind
//! - **Exactly one outcome** - each task ends in one terminal result, recorded once in
//!   the history
//!
//! ## Quick Start
//!
//! ```no_run
//! use rom_dl::{Config, DownloadRequest, Event, RomDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.roms_dir = "/userdata/roms".into();
//!
//!     let downloader = RomDownloader::new(config).await?;
//!
//!     let mut events = downloader.subscribe();
//!     let id = downloader
//!         .start(
//!             DownloadRequest::new("https://example.com/zelda.zip", "snes", "Zelda")
//!                 .with_extract(true),
//!         )
//!         .await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let Event::Finished { id: done, outcome } = event
//!             && done == id
//!         {
//!             println!("{}", outcome.message);
//!             break;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Task engine: start, poll, cancel, shutdown
pub mod downloader;
/// Error types
pub mod error;
/// Per-platform extension allow-list
pub mod extensions;
/// Archive extraction (ZIP, RAR)
pub mod extraction;
/// Persistent download history
pub mod history;
/// Source strategies (direct HTTP, token-gated file host)
pub mod provider;
/// In-memory registry of live tasks
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Shared task state: registry, history and finished outcomes
pub mod store;
/// Streaming HTTP transfer to disk
pub mod transport;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, ExtractionConfig, ProviderConfig, RetryConfig};
pub use downloader::RomDownloader;
pub use error::{Error, ErrorKind, ExtractionError, Result};
pub use registry::TaskSnapshot;
pub use types::{
    DownloadRequest, Event, HistoryEntry, HistoryStatus, Outcome, Phase, ProgressState, TaskId,
    TaskPoll,
};
