//! Server configuration
//!
//! `ServerConfig` collects everything `serve` needs. Values come from the
//! command line; missing values take defaults and invalid values fall back
//! to the default with a warning instead of aborting startup.

use crate::io::wire::DEFAULT_MAX_FRAME_BYTES;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7878";
pub const DEFAULT_DATA_DIR: &str = "data";

/// bcrypt accepts costs in this range
pub const MIN_PASSWORD_COST: u32 = 4;
pub const MAX_PASSWORD_COST: u32 = 31;

/// Configuration of a running server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_addr: String,
    /// Directory holding the three store files
    pub data_dir: PathBuf,
    /// Worker threads of the tokio runtime
    pub worker_threads: usize,
    /// bcrypt cost for new password hashes
    pub password_cost: u32,
    /// Largest accepted request frame, in bytes
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            worker_threads: num_cpus::get(),
            password_cost: bcrypt::DEFAULT_COST,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Validate a bcrypt cost, falling back to the default
pub fn password_cost_or_default(cost: u32) -> u32 {
    if (MIN_PASSWORD_COST..=MAX_PASSWORD_COST).contains(&cost) {
        cost
    } else {
        warn!(
            password_cost = cost,
            default = bcrypt::DEFAULT_COST,
            "invalid password cost, using default"
        );
        bcrypt::DEFAULT_COST
    }
}

impl ServerConfig {
    /// Create a ServerConfig with custom values
    pub fn new(
        bind_addr: String,
        data_dir: PathBuf,
        worker_threads: usize,
        password_cost: u32,
        max_frame_bytes: usize,
    ) -> Self {
        let default = Self::default();

        let worker_threads = if worker_threads == 0 {
            warn!(
                worker_threads,
                default = default.worker_threads,
                "invalid worker_threads, using default"
            );
            default.worker_threads
        } else {
            worker_threads
        };

        let max_frame_bytes = if max_frame_bytes == 0 {
            warn!(
                max_frame_bytes,
                default = default.max_frame_bytes,
                "invalid max_frame_bytes, using default"
            );
            default.max_frame_bytes
        } else {
            max_frame_bytes
        };

        Self {
            bind_addr,
            data_dir,
            worker_threads,
            password_cost: password_cost_or_default(password_cost),
            max_frame_bytes,
        }
    }
}
