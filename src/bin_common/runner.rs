//! Binary runner utilities
//!
//! Standard startup and shutdown banners around a binary's main loop.

use tracing::info;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// How often the running service logs a status line
    pub status_interval_secs: u64,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status_interval_secs: 300,
        }
    }

    pub fn with_status_interval(mut self, secs: u64) -> Self {
        self.status_interval_secs = secs;
        self
    }
}

/// A long-running binary with banners around its main loop
pub trait BinaryRunner {
    /// Run until shutdown. Returns an optional summary line.
    async fn run(&mut self) -> anyhow::Result<Option<String>>;

    fn config(&self) -> &RunConfig;

    fn print_banner(&self) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("Starting {}", config.name);
        info!("Press Ctrl+C to stop");
        info!("========================================");
        info!("");
    }

    fn print_shutdown(&self, summary: Option<&str>) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("{} stopped gracefully", config.name);
        if let Some(summary) = summary {
            info!("{}", summary);
        }
        info!("========================================");
    }

    /// Banner, run, shutdown banner. The shutdown banner is skipped when
    /// `run` fails.
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        let summary = self.run().await?;
        self.print_shutdown(summary.as_deref());
        Ok(())
    }
}
