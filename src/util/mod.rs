use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use crate::errors::Invariant;

pub mod net;

/// current unix timestamp in seconds
pub fn unix_now() -> Result<i64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Invariant(format!("system clock before unix epoch: {}", e)))?;

    i64::try_from(elapsed.as_secs())
        .map_err(|_| Invariant("unix timestamp overflow".to_owned()).into())
}
