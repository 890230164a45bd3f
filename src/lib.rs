//! damocles-manager coordinates the sector lifecycle of sealing workers

pub mod b64serde;
pub mod chain;
pub mod config;
pub mod errors;
pub mod logging;
pub mod metadb;
mod metrics;
pub mod objstore;
pub mod piecestore;
pub mod prover;
pub mod rpc;
mod run;
pub mod sealer;
pub mod sector;
mod signal;
pub mod types;
pub mod util;
pub mod version;

pub use config::Config;
pub use run::start_daemon;

/// log panics through tracing, and abort the process if `exit` is set
pub fn set_panic_hook(exit: bool) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        logging::error!("panic occurred: {}", info);
        default_hook(info);
        if exit {
            std::process::exit(1);
        }
    }));
}
