/// RenderWorker - the dedicated thread running one engine's render loop
///
/// Work reaches the thread as tasks over a channel. `call()` runs a closure on
/// the worker and blocks for its result, which is how initialization is done.
/// Ticks are driven either by frame-available signals or by a fixed interval,
/// never both. Stopping is cooperative: the flag is checked between tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{Error, InitResource, Result};
use crate::{engine_debug, engine_info, engine_warn};

const SOURCE: &str = "vkfilter::RenderWorker";

pub(crate) enum Task {
    Call(Box<dyn FnOnce() + Send>),
    FrameAvailable,
    Stop,
}

/// What drives the tick callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickCadence {
    /// Tick once per frame-available signal (signals arriving during a tick coalesce)
    OnSignal,
    /// Tick on a fixed interval; frame-available signals are ignored
    Interval(Duration),
}

/// Cloneable frame-available signal for producers
#[derive(Clone)]
pub struct FrameNotifier {
    sender: Sender<Task>,
    pending: Arc<AtomicBool>,
}

impl std::fmt::Debug for FrameNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameNotifier")
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish()
    }
}

impl FrameNotifier {
    pub fn notify(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            // Worker gone: nothing left to render
            let _ = self.sender.send(Task::FrameAvailable);
        }
    }
}

/// Handle used by the render service to stop and join a worker it did not create
#[derive(Clone)]
pub(crate) struct WorkerControl {
    sender: Sender<Task>,
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
}

impl WorkerControl {
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.sender.send(Task::Stop);
    }

    pub(crate) fn has_exited(&self) -> bool {
        has_exited(&self.done)
    }

    /// Wait until the thread exited or `deadline` passed
    pub(crate) fn wait_exit(&self, deadline: Instant) -> bool {
        matches!(self.done.recv_deadline(deadline), Err(RecvTimeoutError::Disconnected))
    }
}

/// The done channel never carries a message; it disconnects when the thread exits
fn has_exited(done: &Receiver<()>) -> bool {
    matches!(done.try_recv(), Err(crossbeam_channel::TryRecvError::Disconnected))
}

pub struct RenderWorker {
    name: String,
    sender: Sender<Task>,
    stop: Arc<AtomicBool>,
    frame_pending: Arc<AtomicBool>,
    done: Receiver<()>,
    thread_id: ThreadId,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RenderWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderWorker")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl RenderWorker {
    /// Spawn the thread; `tick` renders one frame
    pub fn spawn<F>(name: &str, cadence: TickCadence, tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (sender, receiver) = unbounded();
        let (done_tx, done) = bounded::<()>(0);
        let stop = Arc::new(AtomicBool::new(false));
        let frame_pending = Arc::new(AtomicBool::new(false));

        let loop_stop = Arc::clone(&stop);
        let loop_pending = Arc::clone(&frame_pending);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                run(receiver, cadence, loop_stop, loop_pending, tick);
            })
            .map_err(|e| Error::init(InitResource::Worker, e.to_string()))?;

        engine_info!(SOURCE, "Worker '{}' started ({:?})", name, cadence);
        Ok(Self {
            name: name.to_string(),
            sender,
            stop,
            frame_pending,
            done,
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` on the worker and wait for its result
    ///
    /// Called from the worker itself, `f` runs inline.
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return Ok(f());
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.sender
            .send(Task::Call(Box::new(move || {
                let _ = reply_tx.send(f());
            })))
            .map_err(|_| Error::BackendError(format!("worker '{}' has exited", self.name)))?;
        reply_rx
            .recv()
            .map_err(|_| Error::BackendError(format!("worker '{}' dropped the call", self.name)))
    }

    /// Queue `f` without waiting
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Task::Call(Box::new(f)))
            .map_err(|_| Error::BackendError(format!("worker '{}' has exited", self.name)))
    }

    pub fn notifier(&self) -> FrameNotifier {
        FrameNotifier {
            sender: self.sender.clone(),
            pending: Arc::clone(&self.frame_pending),
        }
    }

    pub(crate) fn control(&self) -> WorkerControl {
        WorkerControl {
            sender: self.sender.clone(),
            stop: Arc::clone(&self.stop),
            done: self.done.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some() && !has_exited(&self.done)
    }

    /// Signal stop and wait up to `timeout` for the thread to exit
    ///
    /// Returns false when the thread is still busy after `timeout`; it is then
    /// detached and left to exit on its own.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let Some(thread) = self.thread.take() else {
            return true;
        };
        self.stop.store(true, Ordering::Release);
        let _ = self.sender.send(Task::Stop);

        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                if thread.join().is_err() {
                    engine_warn!(SOURCE, "Worker '{}' panicked", self.name);
                }
                engine_debug!(SOURCE, "Worker '{}' joined", self.name);
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                engine_warn!(
                    SOURCE,
                    "Worker '{}' did not stop within {:?}, detaching it",
                    self.name,
                    timeout
                );
                false
            }
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop(Duration::from_secs(1));
        }
    }
}

fn run<F: FnMut()>(
    receiver: Receiver<Task>,
    cadence: TickCadence,
    stop: Arc<AtomicBool>,
    frame_pending: Arc<AtomicBool>,
    mut tick: F,
) {
    let mut next_tick = match cadence {
        TickCadence::Interval(interval) => Some((interval, Instant::now() + interval)),
        TickCadence::OnSignal => None,
    };

    while !stop.load(Ordering::Acquire) {
        let task = match &mut next_tick {
            Some((interval, deadline)) => match receiver.recv_deadline(*deadline) {
                Ok(task) => Some(task),
                Err(RecvTimeoutError::Timeout) => {
                    *deadline = Instant::now() + *interval;
                    None
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match receiver.recv() {
                Ok(task) => Some(task),
                Err(_) => break,
            },
        };

        match task {
            None => tick(),
            Some(Task::Call(f)) => f(),
            Some(Task::FrameAvailable) => {
                frame_pending.store(false, Ordering::Release);
                if cadence == TickCadence::OnSignal && !stop.load(Ordering::Acquire) {
                    tick();
                }
            }
            Some(Task::Stop) => break,
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
