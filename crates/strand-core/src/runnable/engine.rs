//! Engines and launch options.
//!
//! An engine is the scheduling vehicle that drives a runnable: a dedicated
//! carrier thread whose designated suspension points are the channel
//! primitives. The engine kind is a configuration choice, not a type:
//! `Fiber` engines are plain cooperative carriers, `Thread` engines
//! additionally pin to CPUs from the launch options' CPU set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::runner::Launcher;

/// The kind of engine backing a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// Cooperative carrier without CPU pinning (default).
    #[default]
    Fiber,
    /// Carrier pinned to a CPU from the launch options' CPU set.
    Thread,
}

/// Options controlling how a runnable is scheduled.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Number of processing elements (parallelism level).
    pub pe_count: usize,
    /// Engines per processing element (fanout).
    pub engines_per_pe: usize,
    /// Engine kind.
    pub kind: EngineKind,
    /// CPUs available for pinning (`Thread` engines only). Engines are
    /// assigned round-robin over this set; empty means no pinning.
    pub cpu_set: Vec<usize>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            pe_count: 1,
            engines_per_pe: 1,
            kind: EngineKind::default(),
            cpu_set: Vec::new(),
        }
    }
}

impl LaunchOptions {
    /// Creates options for `pe_count` processing elements with one engine
    /// each.
    #[must_use]
    pub fn with_pe_count(pe_count: usize) -> Self {
        Self {
            pe_count,
            ..Self::default()
        }
    }

    /// Sets the engines-per-PE fanout.
    #[must_use]
    pub fn engines_per_pe(mut self, engines_per_pe: usize) -> Self {
        self.engines_per_pe = engines_per_pe;
        self
    }

    /// Sets the engine kind.
    #[must_use]
    pub fn kind(mut self, kind: EngineKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the CPU set used by `Thread` engines.
    #[must_use]
    pub fn cpu_set(mut self, cpus: Vec<usize>) -> Self {
        self.cpu_set = cpus;
        self
    }

    /// Total number of engines this launch creates.
    #[must_use]
    pub fn engine_count(&self) -> usize {
        self.pe_count * self.engines_per_pe
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidOptions`] for a zero PE count or
    /// fanout.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.pe_count == 0 {
            return Err(EngineError::InvalidOptions(
                "pe_count must be at least 1".to_string(),
            ));
        }
        if self.engines_per_pe == 0 {
            return Err(EngineError::InvalidOptions(
                "engines_per_pe must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FactoryInner {
    next_engine_id: AtomicU64,
}

/// Hands out process-unique engine ids and builds launchers.
#[derive(Debug, Clone, Default)]
pub struct EngineFactory {
    inner: Arc<FactoryInner>,
}

impl EngineFactory {
    /// Creates a factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next process-unique engine id.
    pub(crate) fn next_engine_id(&self) -> u64 {
        self.inner.next_engine_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Builds a launcher for the given options.
    #[must_use]
    pub fn launcher(&self, options: LaunchOptions) -> Launcher {
        Launcher::new(self.clone(), options)
    }
}

/// Errors raised while launching engines.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The carrier thread could not be spawned.
    #[error("failed to spawn engine {engine_id}: {message}")]
    SpawnFailed {
        /// The engine id that failed to spawn.
        engine_id: u64,
        /// Error message from the OS.
        message: String,
    },

    /// Invalid launch options.
    #[error("invalid launch options: {0}")]
    InvalidOptions(String),
}

/// Pins the current thread to `cpu_id`.
#[cfg(target_os = "linux")]
pub(crate) fn pin_current_thread(cpu_id: usize) -> Result<(), String> {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
    use std::mem;

    // SAFETY: the cpu_set_t is zero-initialized before CPU_ZERO/CPU_SET,
    // and pid 0 addresses the calling thread.
    unsafe {
        let mut set: cpu_set_t = mem::zeroed();
        CPU_ZERO(&mut set);
        CPU_SET(cpu_id, &mut set);

        if sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &raw const set) != 0 {
            return Err(format!(
                "sched_setaffinity({cpu_id}) failed: {}",
                std::io::Error::last_os_error()
            ));
        }
    }
    Ok(())
}

/// Pins the current thread to `cpu_id` (no-op off Linux).
#[cfg(not(target_os = "linux"))]
pub(crate) fn pin_current_thread(_cpu_id: usize) -> Result<(), String> {
    Ok(())
}
