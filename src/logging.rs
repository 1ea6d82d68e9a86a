//! Logging setup: `env_logger` for binaries, a bridge into Python's
//! `logging` module for the extension.

use std::sync::Once;

use env_logger::Env;
use log::LevelFilter;

static RUST_LOG_ONCE: Once = Once::new();

/// Level from `CUBE_LOG`, then `RUST_LOG`, defaulting to `info`.
pub fn env_level() -> LevelFilter {
    std::env::var("CUBE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .as_deref()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Install the stderr logger once. Later calls are no-ops.
pub fn init_rust_logging() {
    RUST_LOG_ONCE.call_once(|| {
        let level = env_level();
        let env = Env::default().default_filter_or(level.as_str().to_ascii_lowercase());
        // A logger may already be installed by the host application.
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_target(true)
            .try_init();
    });
}

#[cfg(feature = "python")]
pub use python_bridge::{init_python_logging, set_python_log_level};

#[cfg(feature = "python")]
mod python_bridge {
    use std::collections::HashMap;
    use std::sync::{Mutex, Once};

    use log::{Level, LevelFilter, Log, Metadata, Record};
    use once_cell::sync::OnceCell;
    use pyo3::prelude::*;
    use pyo3::types::PyModule;

    use super::env_level;
    use crate::lock;

    static PY_LOG_ONCE: Once = Once::new();
    static PY_LOGGER: OnceCell<&'static PyLogger> = OnceCell::new();

    /// Forwards records to `logging.getLogger(<target with dots>)`.
    struct PyLogger {
        top_filter: Mutex<LevelFilter>,
        logging: Py<PyModule>,
        loggers: Mutex<HashMap<String, Py<PyAny>>>,
    }

    fn python_level(level: Level) -> u32 {
        match level {
            Level::Error => 40,
            Level::Warn => 30,
            Level::Info => 20,
            Level::Debug => 10,
            Level::Trace => 5,
        }
    }

    impl PyLogger {
        fn logger_for(&self, py: Python<'_>, target: &str) -> PyResult<Py<PyAny>> {
            if let Some(logger) = lock(&self.loggers).get(target) {
                return Ok(logger.clone_ref(py));
            }
            let logger = self
                .logging
                .bind(py)
                .call_method1("getLogger", (target,))?
                .unbind();
            lock(&self.loggers).insert(target.to_string(), logger.clone_ref(py));
            Ok(logger)
        }

        fn forward(&self, record: &Record) -> PyResult<()> {
            let target = record.target().replace("::", ".");
            let level = python_level(record.level());
            let message = record.args().to_string();
            Python::attach(|py| {
                let logger = self.logger_for(py, &target)?;
                let logger = logger.bind(py);
                if logger.call_method1("isEnabledFor", (level,))?.is_truthy()? {
                    logger.call_method1("log", (level, message))?;
                }
                Ok(())
            })
        }
    }

    impl Log for PyLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level().to_level_filter() <= *lock(&self.top_filter)
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            if let Err(e) = self.forward(record) {
                Python::attach(|py| e.restore(py));
            }
        }

        fn flush(&self) {}
    }

    /// Route Rust log records into Python's `logging`. Safe to call more
    /// than once; the bridge is installed on the first call.
    pub fn init_python_logging(py: Python<'_>) -> PyResult<()> {
        let level = env_level();
        let mut result = Ok(());
        PY_LOG_ONCE.call_once(|| match py.import("logging") {
            Ok(logging) => {
                let logger: &'static PyLogger = Box::leak(Box::new(PyLogger {
                    top_filter: Mutex::new(level),
                    logging: logging.unbind(),
                    loggers: Mutex::new(HashMap::new()),
                }));
                if log::set_logger(logger).is_ok() {
                    log::set_max_level(level);
                    let _ = PY_LOGGER.set(logger);
                }
            }
            Err(e) => result = Err(e),
        });
        result
    }

    /// Change the minimum level forwarded to Python. `None` re-reads the
    /// environment.
    pub fn set_python_log_level(py: Python<'_>, level: Option<&str>) -> PyResult<()> {
        init_python_logging(py)?;
        let level = match level {
            Some(name) => name.parse::<LevelFilter>().map_err(|_| {
                pyo3::exceptions::PyValueError::new_err(format!("unknown log level {name:?}"))
            })?,
            None => env_level(),
        };
        if let Some(logger) = PY_LOGGER.get() {
            *lock(&logger.top_filter) = level;
            lock(&logger.loggers).clear();
        }
        log::set_max_level(level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_rust_logging();
        init_rust_logging();
        log::debug!("logging initialised twice without panicking");
    }
}
