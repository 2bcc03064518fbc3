//! Common CLI types shared across commands

use clap::Args;
use serde_json::Value;

use crate::error::{ApiError, Result};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty format - human-optimized rich formatting
    Pretty,
    /// Table format - one row per entry (global default)
    #[default]
    Table,
    /// JSON format - structured for scripts/APIs
    Json,
}

/// Payload and delivery flags for create/update
#[derive(Debug, Clone, Args)]
pub struct WriteArgs {
    /// Row data as a JSON object, e.g. '{"name": "School 12"}'
    #[arg(long, short = 'd')]
    pub data: String,

    /// Fail instead of queueing when the platform is unreachable
    #[arg(long)]
    pub no_queue: bool,
}

impl WriteArgs {
    /// Parse `--data`, which must be a JSON object
    pub fn payload(&self) -> Result<Value> {
        let value: Value = serde_json::from_str(&self.data)
            .map_err(|e| ApiError::BadRequest(format!("--data is not valid JSON: {}", e)))?;
        if !value.is_object() {
            return Err(ApiError::BadRequest("--data must be a JSON object".to_string()).into());
        }
        Ok(value)
    }
}
