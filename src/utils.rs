//! # Utility Functions
//!
//! Common helpers shared by the pipeline, the ledger clients and the CLI.

/// Transaction hash formatting utilities
pub mod txid {
    const DISPLAY_PREFIX: usize = 10;
    const DISPLAY_SUFFIX: usize = 8;

    /// Format a transaction hash for display, e.g. `0x5f1c2e9a...be3f40aa`
    pub fn format_short(txid: &str) -> String {
        if txid.len() <= DISPLAY_PREFIX + DISPLAY_SUFFIX + 3 {
            txid.to_string()
        } else {
            format!(
                "{}...{}",
                &txid[..DISPLAY_PREFIX],
                &txid[txid.len() - DISPLAY_SUFFIX..]
            )
        }
    }

    /// Validate transaction hash format (`0x` followed by 64 hex characters)
    pub fn validate(txid: &str) -> Result<(), String> {
        let digits = txid
            .strip_prefix("0x")
            .ok_or_else(|| "Transaction hash must start with 0x".to_string())?;

        if digits.len() != 64 {
            return Err(format!(
                "Transaction hash must have 64 hex digits, got {}",
                digits.len()
            ));
        }

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("Transaction hash must contain only hexadecimal characters".to_string());
        }

        Ok(())
    }
}

/// Payout percentage conversions
pub mod payout {
    use crate::config::ledger::PAYOUT_SCALE;

    /// Map a percentage in [0, 100] onto the contract's fixed-point scale.
    ///
    /// `37.5` becomes `375_000`. Inputs outside the range are clamped first.
    pub fn scale_percentage(percentage: f64) -> u64 {
        let clamped = if percentage.is_nan() {
            0.0
        } else {
            percentage.clamp(0.0, 100.0)
        };
        ((clamped / 100.0) * PAYOUT_SCALE as f64).round() as u64
    }

    /// Round to a fixed number of decimal places for responses
    pub fn round_to(value: f64, decimals: i32) -> f64 {
        let factor = 10f64.powi(decimals);
        (value * factor).round() / factor
    }
}

/// Time and duration utilities
pub mod time {
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    /// Format a timestamp for display
    pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
        timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

/// File system utilities
pub mod fs {
    use crate::error::{ClaimError, ClaimResult};
    use std::fs;
    use std::path::Path;

    /// Ensure directory exists, create if it doesn't
    pub fn ensure_dir_exists(path: &Path) -> ClaimResult<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                ClaimError::storage(format!(
                    "Failed to create directory {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Write through a temp file and rename, so readers never see a torn record
    pub fn write_file_atomic(path: &Path, content: &[u8]) -> ClaimResult<()> {
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)?;
        fs::rename(temp_path, path)?;
        Ok(())
    }
}

/// Retry utilities
pub mod retry {
    use std::future::Future;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Retry an async operation with exponential backoff.
    ///
    /// Only errors for which `should_retry` answers `true` are retried; the
    /// last error is returned once `max_attempts` is reached.
    pub async fn with_backoff<F, Fut, T, E>(
        max_attempts: u32,
        base_delay: Duration,
        should_retry: impl Fn(&E) -> bool,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempts = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    attempts += 1;
                    if attempts >= max_attempts || !should_retry(&error) {
                        return Err(error);
                    }

                    let delay = base_delay * 2_u32.pow(attempts - 1);
                    log::warn!(
                        "Operation failed (attempt {}), retrying in {:?}: {}",
                        attempts,
                        delay,
                        error
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
