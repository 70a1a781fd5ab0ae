//! Global thread-pool configuration.

use std::env;
use std::sync::OnceLock;

use pm_core::{Error, Result};

static THREAD_POOL_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize the global rayon pool once for the whole process.
///
/// Thread count priority: explicit argument, then the `PMSTEREO_THREADS`
/// environment variable, then rayon's default. Repeated calls are
/// idempotent and return the first initialization result. The worker
/// count does not affect results under a fixed seed, only throughput.
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    THREAD_POOL_INIT
        .get_or_init(|| {
            let configured = match num_threads {
                Some(n) => Some(n),
                None => threads_from_env().map_err(|e| e.to_string())?,
            };
            let mut builder = rayon::ThreadPoolBuilder::new();
            if let Some(n) = configured {
                builder = builder.num_threads(n);
            }
            builder.build_global().map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| Error::InvalidParameters(e.clone()))?;
    Ok(())
}

fn threads_from_env() -> Result<Option<usize>> {
    let raw = match env::var("PMSTEREO_THREADS") {
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(Error::InvalidParameters(format!(
                "failed to read PMSTEREO_THREADS: {e}"
            )))
        }
    };

    let parsed: usize = raw.parse().map_err(|_| {
        Error::InvalidParameters(format!(
            "PMSTEREO_THREADS must be a positive integer, got '{raw}'"
        ))
    })?;
    if parsed == 0 {
        return Err(Error::InvalidParameters(
            "PMSTEREO_THREADS must be >= 1".to_string(),
        ));
    }
    Ok(Some(parsed))
}
