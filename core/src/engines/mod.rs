//! Concrete [`crate::engine::Engine`] implementations and the URL-scheme
//! dispatcher that picks one.

pub mod memory;
pub mod trace;

#[cfg(feature = "sled_engine")]
pub mod sled_backend;

#[cfg(feature = "rocks_engine")]
pub mod rocks_backend;

pub use memory::MemoryEngine;
pub use trace::TraceEngine;

#[cfg(feature = "sled_engine")]
pub use sled_backend::SledEngine;

#[cfg(feature = "rocks_engine")]
pub use rocks_backend::RocksEngine;

use ruc::*;

use crate::engine::{Engine, EngineTxn, EngineUrl};

/// Lets a boxed trait object stand in for a concrete `E: Engine` — needed to
/// wrap an already-dispatched backend in [`TraceEngine`] without `open`
/// having to know the concrete backend type at the call site.
impl Engine for Box<dyn Engine> {
    fn begin(&self, write: bool) -> Result<Box<dyn EngineTxn + '_>> {
        (**self).begin(write)
    }
    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

/// Open a store engine by URL: `mem:/` selects the always-on in-memory
/// backend; `sled:/path` and `rocks:/path` select the feature-gated
/// persistent backends. A `;trace=<path>` parameter (spec §6.1) wraps
/// whichever backend was selected in [`TraceEngine`], duplicating every
/// engine call to a text log at that path.
pub fn open(url: &str) -> Result<Box<dyn Engine>> {
    let parsed = EngineUrl::parse(url).c(d!())?;
    let backend: Box<dyn Engine> = match parsed.scheme.as_str() {
        "mem" | "memory" => Box::new(MemoryEngine::new()),
        #[cfg(feature = "sled_engine")]
        "sled" => Box::new(sled_backend::SledEngine::open(&parsed.path).c(d!())?),
        #[cfg(feature = "rocks_engine")]
        "rocks" | "rocksdb" => Box::new(rocks_backend::RocksEngine::open(&parsed.path).c(d!())?),
        other => return Err(eg!(format!("no engine registered for scheme {other:?}"))),
    };
    match parsed.param("trace") {
        Some(path) => Ok(Box::new(trace::TraceEngine::new(backend, path).c(d!())?)),
        None => Ok(backend),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opens_the_memory_engine_by_scheme() {
        let engine = open("mem:/").unwrap();
        let mut txn = engine.begin(true).unwrap();
        txn.put(b"k", b"v").unwrap();
        txn.commit().unwrap();
        let txn = engine.begin(false).unwrap();
        assert_eq!(txn.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(open("nope:/").is_err());
    }

    #[test]
    fn trace_param_wraps_the_backend_and_logs_calls() {
        let dir = std::env::temp_dir();
        let log_path = dir.join(format!("ordstore-trace-test-{}.log", std::process::id()));
        let url = format!("mem:/;trace={}", log_path.display());

        let engine = open(&url).unwrap();
        let mut txn = engine.begin(true).unwrap();
        txn.put(b"k", b"v").unwrap();
        txn.commit().unwrap();

        let logged = std::fs::read_to_string(&log_path).unwrap();
        assert!(logged.contains("put"));
        assert!(logged.contains("commit"));

        let _ = std::fs::remove_file(&log_path);
    }
}
