//! Configuration
//!
//! All settings come from flags or their environment-variable twins, so
//! the daemon deploys cleanly from a unit file or container environment.

use crate::review::GerritConfig;
use clap::Parser;

/// Automated submit queue for stacked Gerrit changes
#[derive(Debug, Parser)]
#[command(name = "submit-queue", version, about)]
pub struct Config {
    /// URL of the Gerrit instance
    #[arg(long, env = "GERRIT_URL")]
    pub url: String,

    /// Username to log in to Gerrit
    #[arg(long, env = "GERRIT_USERNAME")]
    pub username: String,

    /// Password to log in to Gerrit
    #[arg(long, env = "GERRIT_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Gerrit project to run the submit queue for
    #[arg(long, env = "GERRIT_PROJECT")]
    pub project: String,

    /// Destination branch
    #[arg(long, env = "GERRIT_BRANCH", default_value = "master")]
    pub branch: String,

    /// Seconds between ticks
    #[arg(long, env = "SUBMIT_QUEUE_TRIGGER_INTERVAL", default_value_t = 600)]
    pub trigger_interval: u64,

    /// Only fetch changes and assemble the queue, never rebase or submit
    #[arg(long, env = "SUBMIT_QUEUE_FETCH_ONLY")]
    pub fetch_only: bool,
}

impl Config {
    /// Connection parameters for the Gerrit adapter
    #[must_use]
    pub fn gerrit(&self) -> GerritConfig {
        GerritConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            project: self.project.clone(),
            branch: self.branch.clone(),
        }
    }
}
