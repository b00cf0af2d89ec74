//! Odds Feed Service - Main Library
//!
//! ## Architecture
//!
//! - **bin_common**: Shared utilities for binary executables (CLI, runners)
//! - **oddsfeed**: Core feed pipeline (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use oddsfeed_service::bin_common::{load_config_from_env, ConfigType};
//! use oddsfeed_service::oddsfeed::FeedService;
//! ```

pub use oddsfeed;

pub mod bin_common {
    //! Shared utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use runner::{BinaryRunner, RunConfig};
}
