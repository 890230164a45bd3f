use anyhow::{Context, Result};
use signal_hook::{
    consts::{SIGINT, SIGQUIT, SIGTERM, TERM_SIGNALS},
    iterator::Signals,
};

use crate::logging::warn;

/// blocks until one of the termination signals arrives, returns the signal
pub fn wait_for_term() -> Result<i32> {
    let mut sig = Signals::new(TERM_SIGNALS).context("register term signals")?;
    for signal in sig.forever() {
        match signal {
            SIGINT | SIGQUIT | SIGTERM => {
                warn!("captured signal {}", signal);
                return Ok(signal);
            }

            _ => {}
        }
    }

    // the iterator only ends once the handle is closed
    Ok(0)
}
