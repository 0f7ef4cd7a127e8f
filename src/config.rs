//! Server and per-session configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Where a freshly opened source starts reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// Stream the whole file, existing content included.
    Beginning,
    /// Stream only content appended after the file was opened.
    #[default]
    End,
}

/// Timing and sizing of a single streaming session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time allowed between pongs before the peer is considered gone.
    pub liveness_timeout_ms: u64,
    /// Ping period. Must be less than `liveness_timeout_ms`.
    pub heartbeat_period_ms: u64,
    /// Deadline for each outbound frame.
    pub write_timeout_ms: u64,
    /// Delay before tailing moves to the secondary source.
    pub switchover_delay_ms: u64,
    /// Upper bound on the wait between reads when the source has no new data.
    pub poll_interval_ms: u64,
    /// Capacity of the queue between the line source and the writer.
    pub queue_capacity: usize,
    /// Largest inbound message accepted from the client, in bytes.
    pub max_message_size: usize,
    pub start_position: StartPosition,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            liveness_timeout_ms: 60_000,
            heartbeat_period_ms: 54_000,
            write_timeout_ms: 10_000,
            switchover_delay_ms: 20_000,
            poll_interval_ms: 250,
            queue_capacity: 10,
            max_message_size: 512,
            start_position: StartPosition::End,
        }
    }
}

impl SessionConfig {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn switchover_delay(&self) -> Duration {
        Duration::from_millis(self.switchover_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Rejects settings under which a session could not keep itself alive.
    pub fn validate(&self) -> Result<()> {
        let timings = [
            ("liveness_timeout_ms", self.liveness_timeout_ms),
            ("heartbeat_period_ms", self.heartbeat_period_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        if let Some((name, _)) = timings.iter().find(|(_, value)| *value == 0) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }
        if self.heartbeat_period_ms >= self.liveness_timeout_ms {
            return Err(Error::config(format!(
                "heartbeat period ({}ms) must be less than the liveness timeout ({}ms)",
                self.heartbeat_period_ms, self.liveness_timeout_ms
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be greater than zero"));
        }
        if self.max_message_size == 0 {
            return Err(Error::config("max_message_size must be greater than zero"));
        }
        Ok(())
    }
}

/// The one or two files a session tails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcePaths {
    pub primary: PathBuf,
    /// Switchover target, if any.
    pub secondary: Option<PathBuf>,
}

/// Configuration for the whole service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub addr: String,
    /// Files to tail: the primary, then an optional switchover target.
    pub paths: Vec<PathBuf>,
    /// Append synthetic lines to the sources in the background.
    pub demo: bool,
    pub demo_interval_ms: u64,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".into(),
            paths: Vec::new(),
            demo: false,
            demo_interval_ms: 5_000,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn demo_interval(&self) -> Duration {
        Duration::from_millis(self.demo_interval_ms)
    }

    /// Splits `paths` into the primary source and optional switchover target.
    pub fn sources(&self) -> Result<SourcePaths> {
        match self.paths.as_slice() {
            [primary] => Ok(SourcePaths {
                primary: primary.clone(),
                secondary: None,
            }),
            [primary, secondary] => Ok(SourcePaths {
                primary: primary.clone(),
                secondary: Some(secondary.clone()),
            }),
            [] => Err(Error::config("filename not specified")),
            _ => Err(Error::config(format!(
                "at most two files can be tailed, got {}",
                self.paths.len()
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sources()?;
        if self.demo && self.demo_interval_ms == 0 {
            return Err(Error::config("demo_interval_ms must be greater than zero"));
        }
        self.session.validate()
    }
}
