//! Kernel pressure triggers delivered as a stream of notifications.
//!
//! Each [`TriggerNotifier`] owns its own read-write descriptor and a
//! background thread blocked in `poll(2)` on that descriptor plus a stop
//! eventfd. Every `POLLPRI` wake becomes one [`Notification::Crossed`].

use super::kernel::{PsiFs, StopSignal, TriggerFile, WaitOutcome};
use super::trigger::encode;
use crate::error::PsiError;
use crate::models::pressure::{Resource, Trigger};
use log::{debug, error, warn};
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Retry policy for the background wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierOptions {
    /// Consecutive wait failures tolerated before the notifier gives up.
    pub max_consecutive_failures: u32,
    /// Pause between a failed wait and the next attempt.
    pub retry_delay: Duration,
}

impl Default for NotifierOptions {
    fn default() -> Self {
        Self { max_consecutive_failures: 5, retry_delay: Duration::from_millis(100) }
    }
}

/// One item of a notifier's stream.
#[derive(Debug)]
pub enum Notification {
    /// The trigger's threshold was crossed. Take a snapshot to see the values.
    Crossed,
    /// The wait loop gave up; this is the last item before the stream closes.
    Failed(PsiError),
}

/// Cloneable handle that stops a notifier from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.signal.raise();
    }
}

pub struct TriggerNotifier {
    resource: Resource,
    trigger:  Trigger,
    rx:       Receiver<Notification>,
    stop:     Arc<StopSignal>,
    worker:   Option<JoinHandle<()>>,
}

impl TriggerNotifier {
    /// Open a fresh descriptor on `resource`, write the trigger to it and
    /// start the wait thread. Any failure up to that point is returned here.
    pub fn arm(
        fs: &dyn PsiFs,
        resource: Resource,
        trigger: Trigger,
        options: NotifierOptions,
    ) -> Result<Self, PsiError> {
        let path = fs.report_path(resource);
        let fail = |source: io::Error| PsiError::TriggerRegistration {
            path: path.clone(),
            trigger,
            source,
        };

        let mut file = fs.open_trigger(resource).map_err(fail)?;
        register(file.as_mut(), &trigger).map_err(fail)?;
        debug!("armed {} trigger '{}' on {}", resource, trigger, path.display());

        let stop = Arc::new(StopSignal::new().map_err(fail)?);
        let (tx, rx) = mpsc::channel();

        let wait_loop = WaitLoop {
            path:    path.clone(),
            file,
            stop:    Arc::clone(&stop),
            tx,
            options,
        };
        let worker = std::thread::Builder::new()
            .name(format!("psi-{}-{}", resource, trigger.scope))
            .spawn(move || wait_loop.run())
            .map_err(fail)?;

        Ok(Self { resource, trigger, rx, stop, worker: Some(worker) })
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Block until the next notification. `None` once the stream has closed.
    pub fn recv(&self) -> Option<Notification> {
        self.rx.recv().ok()
    }

    /// `Ok(None)` when nothing is pending; `Err` once the stream has closed.
    pub fn try_recv(&self) -> Result<Option<Notification>, mpsc::RecvError> {
        match self.rx.try_recv() {
            Ok(n)                           => Ok(Some(n)),
            Err(TryRecvError::Empty)        => Ok(None),
            Err(TryRecvError::Disconnected) => Err(mpsc::RecvError),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Notification, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn iter(&self) -> mpsc::Iter<'_, Notification> {
        self.rx.iter()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { signal: Arc::clone(&self.stop) }
    }

    /// Stop the wait thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.raise();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("{} trigger thread panicked", self.resource);
            }
        }
    }
}

impl Drop for TriggerNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// Single write; a short write means the kernel saw a truncated trigger.
fn register(file: &mut dyn TriggerFile, trigger: &Trigger) -> io::Result<()> {
    let line = encode(trigger);
    let written = file.write_once(line.as_bytes())?;
    if written != line.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short trigger write: {} of {} bytes", written, line.len()),
        ));
    }
    Ok(())
}

struct WaitLoop {
    path:    PathBuf,
    file:    Box<dyn TriggerFile>,
    stop:    Arc<StopSignal>,
    tx:      Sender<Notification>,
    options: NotifierOptions,
}

impl WaitLoop {
    fn run(mut self) {
        let mut failures: u32 = 0;

        while !self.stop.is_raised() {
            let reason = match self.file.wait(&self.stop) {
                Ok(WaitOutcome::Fired) => {
                    failures = 0;
                    if self.tx.send(Notification::Crossed).is_err() {
                        debug!("receiver for {} dropped, stopping", self.path.display());
                        return;
                    }
                    continue;
                }
                Ok(WaitOutcome::Stopped) => break,
                Ok(WaitOutcome::Unexpected { ready, revents }) => {
                    format!("poll returned {} ready descriptor(s), events {:?}", ready, revents)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => e.to_string(),
            };

            failures += 1;
            warn!(
                "wait on {} failed ({}/{}): {}",
                self.path.display(), failures, self.options.max_consecutive_failures, reason
            );
            if failures >= self.options.max_consecutive_failures {
                error!("giving up on {} after {} failed waits", self.path.display(), failures);
                let _ = self.tx.send(Notification::Failed(PsiError::Wait {
                    path:     self.path.clone(),
                    attempts: failures,
                    reason,
                }));
                return;
            }
            if self.stop.sleep(self.options.retry_delay) {
                break;
            }
        }
        debug!("trigger on {} stopped", self.path.display());
    }
}
