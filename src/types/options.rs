//! Session engine options and configuration
//!
//! This module contains the runtime configuration of the session engine,
//! including a builder pattern for easy configuration.

use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Time-to-live of a pending review (30 minutes)
pub const REVIEW_TTL_SECS: u64 = 30 * 60;

/// Delay between closing scratch documents and tearing the scratch tree down (300 ms)
pub const SETTLE_DELAY_MS: u64 = 300;

/// Number of checkpoints kept per session
pub const DEFAULT_MAX_CHECKPOINTS: usize = 10;

/// Upper bound on model steps per generation
pub const DEFAULT_MAX_STEPS: u32 = 50;

/// Upper bound on output tokens per generation
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

/// How long the abort handler waits for the final response (5 seconds)
pub const ABORT_RESPONSE_TIMEOUT_MS: u64 = 5000;

/// Environment variable switching on test isolation
pub const TEST_ENV_VAR: &str = "AGENT_TEST_ENV";

/// Environment variable overriding the scratch root
pub const SCRATCH_DIR_VAR: &str = "AGENT_SCRATCH_DIR";

/// Directory names never copied into scratch workspaces or checkpoints
const DEFAULT_IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules", ".idea", ".vscode"];

// ============================================================================
// Session Options
// ============================================================================

/// Runtime options of the session engine
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Parent directory of every scratch workspace
    pub scratch_root: PathBuf,
    /// Time-to-live of a pending review
    pub review_ttl: Duration,
    /// Delay between closing scratch documents and teardown
    pub settle_delay: Duration,
    /// Maximum retained checkpoints, oldest dropped first
    pub max_checkpoints: usize,
    /// Test isolation: scratch workspaces are kept and never integrated
    pub test_isolation: bool,
    /// Whether prompts may request plan mode
    pub plan_mode_enabled: bool,
    /// Upper bound on model steps
    pub max_steps: u32,
    /// Upper bound on output tokens
    pub max_output_tokens: u32,
    /// Directory names skipped when copying or snapshotting projects
    pub ignored_dirs: Vec<String>,
    /// How long the abort handler waits for the final response
    pub abort_response_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("kodegen-agent-scratch"),
            review_ttl: Duration::from_secs(REVIEW_TTL_SECS),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
            test_isolation: false,
            plan_mode_enabled: true,
            max_steps: DEFAULT_MAX_STEPS,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|d| (*d).to_string()).collect(),
            abort_response_timeout: Duration::from_millis(ABORT_RESPONSE_TIMEOUT_MS),
        }
    }
}

impl SessionOptions {
    /// Create a new builder for `SessionOptions`
    #[must_use]
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }

    /// Defaults overridden by `AGENT_TEST_ENV` and `AGENT_SCRATCH_DIR`
    #[must_use]
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(value) = std::env::var(TEST_ENV_VAR) {
            options.test_isolation = matches!(value.as_str(), "1" | "true" | "TRUE" | "yes");
        }
        if let Ok(dir) = std::env::var(SCRATCH_DIR_VAR)
            && !dir.is_empty()
        {
            options.scratch_root = PathBuf::from(dir);
        }
        options
    }

    /// Whether scratch workspaces should be torn down after use
    #[must_use]
    pub const fn should_cleanup(&self) -> bool {
        !self.test_isolation
    }

    /// Whether a directory name is excluded from copies and snapshots
    #[must_use]
    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignored_dirs.iter().any(|d| d == name)
    }
}

// ============================================================================
// Builder for SessionOptions
// ============================================================================

/// Builder for `SessionOptions`
#[derive(Debug, Default)]
pub struct SessionOptionsBuilder {
    options: SessionOptions,
}

impl SessionOptionsBuilder {
    /// Set the scratch root directory
    #[must_use]
    pub fn scratch_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.scratch_root = path.into();
        self
    }

    /// Set the pending review time-to-live
    #[must_use]
    pub const fn review_ttl(mut self, ttl: Duration) -> Self {
        self.options.review_ttl = ttl;
        self
    }

    /// Set the settle delay used by accept/decline
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.options.settle_delay = delay;
        self
    }

    /// Set the number of retained checkpoints
    ///
    /// # Panics
    /// Panics if `count` is zero
    #[must_use]
    pub fn max_checkpoints(mut self, count: usize) -> Self {
        assert!(count > 0, "max_checkpoints must be at least 1");
        self.options.max_checkpoints = count;
        self
    }

    /// Enable or disable test isolation
    #[must_use]
    pub const fn test_isolation(mut self, enabled: bool) -> Self {
        self.options.test_isolation = enabled;
        self
    }

    /// Allow or forbid plan mode
    #[must_use]
    pub const fn plan_mode_enabled(mut self, enabled: bool) -> Self {
        self.options.plan_mode_enabled = enabled;
        self
    }

    /// Set the model step limit
    #[must_use]
    pub const fn max_steps(mut self, steps: u32) -> Self {
        self.options.max_steps = steps;
        self
    }

    /// Set the output token limit
    #[must_use]
    pub const fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.options.max_output_tokens = tokens;
        self
    }

    /// Add a directory name to skip when copying projects
    #[must_use]
    pub fn ignore_dir(mut self, name: impl Into<String>) -> Self {
        self.options.ignored_dirs.push(name.into());
        self
    }

    /// Set how long the abort handler waits for the final response
    #[must_use]
    pub const fn abort_response_timeout(mut self, timeout: Duration) -> Self {
        self.options.abort_response_timeout = timeout;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> SessionOptions {
        self.options
    }
}
