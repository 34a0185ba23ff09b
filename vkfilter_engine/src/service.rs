/// RenderService - shared, reference-counted source of render workers
///
/// Engines lease the service to spawn their worker. `quit()` refuses new
/// leases and asks every worker to stop; `join()` waits for them to exit.
/// Tests create isolated services; applications can use `global()`.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, InitResource, Result};
use crate::worker::{RenderWorker, TickCadence, WorkerControl};
use crate::{engine_debug, engine_info};

const SOURCE: &str = "vkfilter::RenderService";

#[derive(Default)]
struct ServiceState {
    initialized: bool,
    quitting: bool,
    leases: usize,
    workers: Vec<WorkerControl>,
}

struct ServiceInner {
    name: String,
    state: Mutex<ServiceState>,
}

#[derive(Clone)]
pub struct RenderService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for RenderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RenderService")
            .field("name", &self.inner.name)
            .field("leases", &state.leases)
            .field("quitting", &state.quitting)
            .finish()
    }
}

impl RenderService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                name: name.into(),
                state: Mutex::new(ServiceState::default()),
            }),
        }
    }

    /// Process-wide instance
    pub fn global() -> &'static RenderService {
        static GLOBAL: OnceLock<RenderService> = OnceLock::new();
        GLOBAL.get_or_init(|| RenderService::new("vkfilter"))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Take a lease, initializing the service on first use
    pub fn acquire(&self) -> Result<ServiceLease> {
        let mut state = self.inner.state.lock();
        if state.quitting {
            return Err(Error::init(
                InitResource::Worker,
                format!("render service '{}' has quit", self.inner.name),
            ));
        }
        if !state.initialized {
            state.initialized = true;
            engine_info!(SOURCE, "Render service '{}' initialized", self.inner.name);
        }
        state.leases += 1;
        Ok(ServiceLease {
            service: self.clone(),
        })
    }

    /// Refuse new leases and ask every worker to stop
    pub fn quit(&self) {
        let mut state = self.inner.state.lock();
        if state.quitting {
            return;
        }
        state.quitting = true;
        for worker in &state.workers {
            worker.request_stop();
        }
        engine_info!(SOURCE, "Render service '{}' quitting ({} workers)", self.inner.name, state.workers.len());
    }

    /// Wait for every worker to exit; false when `timeout` elapsed first
    pub fn join(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let workers = self.inner.state.lock().workers.clone();
        let joined = workers.iter().all(|w| w.wait_exit(deadline));
        if joined {
            self.inner.state.lock().workers.clear();
        }
        joined
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().initialized
    }

    pub fn is_quitting(&self) -> bool {
        self.inner.state.lock().quitting
    }

    pub fn active_leases(&self) -> usize {
        self.inner.state.lock().leases
    }

    /// Workers that have not exited yet
    pub fn worker_count(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.workers.retain(|w| !w.has_exited());
        state.workers.len()
    }

    fn release_lease(&self) {
        let mut state = self.inner.state.lock();
        state.leases = state.leases.saturating_sub(1);
        engine_debug!(SOURCE, "Lease released ({} left)", state.leases);
    }
}

/// Proof of use of a `RenderService`; dropping it releases the lease
#[derive(Debug)]
pub struct ServiceLease {
    service: RenderService,
}

impl ServiceLease {
    pub fn service(&self) -> &RenderService {
        &self.service
    }

    /// Spawn a worker tracked by the service
    pub fn spawn_worker<F>(&self, name: &str, cadence: TickCadence, tick: F) -> Result<RenderWorker>
    where
        F: FnMut() + Send + 'static,
    {
        let mut state = self.service.inner.state.lock();
        if state.quitting {
            return Err(Error::init(
                InitResource::Worker,
                format!("render service '{}' has quit", self.service.inner.name),
            ));
        }
        let worker = RenderWorker::spawn(name, cadence, tick)?;
        state.workers.retain(|w| !w.has_exited());
        state.workers.push(worker.control());
        Ok(worker)
    }
}

impl Drop for ServiceLease {
    fn drop(&mut self) {
        self.service.release_lease();
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
