//! Launching and owning runnables.
//!
//! A [`Launcher`] ignites a runnable onto its engines; the returned
//! [`Runner`] owns the lifecycle: `stop()` for cooperative draining,
//! `kill()` for forced termination, `await_join()` to collect the result.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::engine::{pin_current_thread, EngineError, EngineFactory, EngineKind, LaunchOptions};
use super::{Context, RunError, Runnable, RunnableState, StopSource};

struct RunnerShared {
    state: Mutex<RunnableState>,
    stop: StopSource,
    finish: StopSource,
    remaining: AtomicUsize,
}

/// Prepares a runnable for execution on a group of engines.
pub struct Launcher {
    factory: EngineFactory,
    options: LaunchOptions,
}

impl Launcher {
    pub(crate) fn new(factory: EngineFactory, options: LaunchOptions) -> Self {
        Self { factory, options }
    }

    /// Launches the runnable: `Init -> Queued`, then `Running` on engine
    /// pickup.
    ///
    /// The caller keeps its own `Arc` clone when it needs to read counters
    /// or state off the runnable after launch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for invalid options or a failed thread
    /// spawn.
    pub fn ignite(self, runnable: Arc<dyn Runnable>) -> Result<Runner, EngineError> {
        self.options.validate()?;
        let total = self.options.engine_count();
        let shared = Arc::new(RunnerShared {
            state: Mutex::new(RunnableState::Queued),
            stop: StopSource::new(),
            finish: StopSource::new(),
            remaining: AtomicUsize::new(total),
        });

        let mut handles = Vec::with_capacity(total);
        for rank in 0..total {
            let engine_id = self.factory.next_engine_id();
            let ctx = Context::new(
                rank,
                total,
                engine_id,
                shared.stop.token(),
                shared.finish.token(),
            );
            let pin = match self.options.kind {
                EngineKind::Thread if !self.options.cpu_set.is_empty() => {
                    Some(self.options.cpu_set[rank % self.options.cpu_set.len()])
                }
                _ => None,
            };
            let runnable = Arc::clone(&runnable);
            let shared = Arc::clone(&shared);

            let handle = thread::Builder::new()
                .name(format!("strand-engine-{engine_id}"))
                .spawn(move || engine_main(&runnable, &shared, &ctx, pin))
                .map_err(|e| EngineError::SpawnFailed {
                    engine_id,
                    message: e.to_string(),
                })?;
            handles.push((engine_id, handle));
        }

        Ok(Runner {
            shared,
            handles: Mutex::new(handles),
        })
    }
}

/// Carrier-thread entrypoint for one engine.
fn engine_main(
    runnable: &Arc<dyn Runnable>,
    shared: &RunnerShared,
    ctx: &Context,
    pin: Option<usize>,
) -> Result<(), RunError> {
    let result = if let Some(message) = pin.map(pin_current_thread).and_then(Result::err) {
        Err(RunError::Launch(message))
    } else {
        {
            let mut state = shared.state.lock();
            if *state == RunnableState::Queued {
                *state = RunnableState::Running;
            }
        }
        catch_unwind(AssertUnwindSafe(|| runnable.run(ctx)))
            .unwrap_or(Err(RunError::Panicked(ctx.engine_id())))
    };

    // The last engine out releases downstream edges and finalizes state,
    // even when `run` failed or panicked.
    if shared.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        runnable.on_complete();
        *shared.state.lock() = RunnableState::Completed;
    }

    result
}

/// Owns a launched runnable and joins it on shutdown.
pub struct Runner {
    shared: Arc<RunnerShared>,
    handles: Mutex<Vec<(u64, JoinHandle<Result<(), RunError>>)>>,
}

impl Runner {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunnableState {
        *self.shared.state.lock()
    }

    /// Requests cooperative termination.
    ///
    /// The stop token is left untouched: the runnable drains until its
    /// upstream closes. Sources observe the finish signal and stop
    /// emitting.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if matches!(*state, RunnableState::Queued | RunnableState::Running) {
                *state = RunnableState::Stop;
            }
        }
        self.shared.finish.request_stop();
    }

    /// Requests forced termination.
    ///
    /// Trips the stop token; read loops exit on their next poll, dropping
    /// in-flight items on the floor.
    pub fn kill(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.is_terminal() {
                *state = RunnableState::Kill;
            }
        }
        self.shared.finish.request_stop();
        self.shared.stop.request_stop();
    }

    /// Joins every engine and returns the first fatal error, if any.
    ///
    /// Closure and timeout statuses from the read/write loops are expected
    /// control flow and count as a clean join. Calling this a second time
    /// returns `Ok`.
    ///
    /// # Errors
    ///
    /// The first fatal [`RunError`] any engine reported.
    pub fn await_join(&self) -> Result<(), RunError> {
        let handles = std::mem::take(&mut *self.handles.lock());
        let mut first_fatal = None;
        for (engine_id, handle) in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    if error.is_fatal() && first_fatal.is_none() {
                        first_fatal = Some(error);
                    }
                }
                Err(_) => {
                    if first_fatal.is_none() {
                        first_fatal = Some(RunError::Panicked(engine_id));
                    }
                }
            }
        }
        match first_fatal {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
