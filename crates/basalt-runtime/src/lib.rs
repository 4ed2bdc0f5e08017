//! Basalt Runtime - orchestration layer for the Basalt bot framework.
//!
//! This crate provides:
//! - Layered configuration (`basalt.toml`, profiles, `BASALT_*` variables)
//! - Logging setup over `tracing-subscriber`
//! - [`BasaltRuntime`], which loads module directories, syncs commands when
//!   the gateway is ready and feeds inbound interactions to the dispatcher
//!
//! ```ignore
//! use basalt_runtime::BasaltRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, rx) = basalt_core::interaction_channel(256);
//!     let runtime = BasaltRuntime::builder()
//!         .gateway(MyGateway::new(tx))
//!         .build()?;
//!
//!     // Runs until Ctrl+C
//!     runtime.run(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{BasaltConfig, ConfigError, ConfigLoader, ConfigResult, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{BasaltRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros, for `use basalt_runtime::prelude::*`.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
