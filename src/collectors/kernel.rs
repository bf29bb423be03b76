//! Access to the kernel's pressure files.
//!
//! Monitors and notifiers never touch paths directly; they go through a
//! [`PsiFs`], so the real `/proc/pressure` tree can be swapped for a cgroup
//! directory or an in-memory fake.

use crate::models::pressure::Resource;
use log::warn;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub const DEFAULT_ROOT: &str = "/proc/pressure";

/// A readable, rewindable pressure report.
pub trait ReportFile: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReportFile for T {}

/// A writable descriptor with a trigger armed on it.
pub trait TriggerFile: Send {
    /// Issue exactly one write and return how many bytes the kernel took.
    fn write_once(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Block until the trigger fires, `stop` is raised, or something odd happens.
    fn wait(&mut self, stop: &StopSignal) -> io::Result<WaitOutcome>;
}

/// Open/read/write/poll a named pressure resource.
pub trait PsiFs: Send + Sync {
    fn report_path(&self, resource: Resource) -> PathBuf;

    /// Read-only handle used for snapshots.
    fn open_report(&self, resource: Resource) -> io::Result<Box<dyn ReportFile>>;

    /// Fresh read-write, non-blocking handle, one per trigger.
    fn open_trigger(&self, resource: Resource) -> io::Result<Box<dyn TriggerFile>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Exactly one descriptor was ready and it reported the expected event.
    Fired,
    /// The stop signal was raised.
    Stopped,
    /// poll returned but not in the way a trigger crossing looks.
    Unexpected { ready: i32, revents: PollFlags },
}

/// One-shot cancellation flag that can also sit in a poll set.
///
/// Once raised the eventfd stays readable, so every later wait returns
/// [`WaitOutcome::Stopped`] immediately.
pub struct StopSignal {
    raised: AtomicBool,
    fd:     EventFd,
}

impl StopSignal {
    pub fn new() -> io::Result<Self> {
        let fd = EventFd::from_value_and_flags(0, EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)?;
        Ok(Self { raised: AtomicBool::new(false), fd })
    }

    pub fn raise(&self) {
        if self.raised.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.fd.write(1) {
            warn!("failed to wake stop eventfd: {}", e);
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// Sleep for `dur`, waking early if raised. Returns `true` when raised.
    ///
    /// Interrupted polls resume until the deadline.
    pub fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        loop {
            if self.is_raised() {
                return true;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            let millis = u16::try_from(left.as_millis().max(1)).unwrap_or(u16::MAX);
            let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(millis)) {
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => {
                    warn!("stop signal poll failed, cutting sleep short: {}", e);
                    return self.is_raised();
                }
            }
        }
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSignal").field("raised", &self.is_raised()).finish()
    }
}

/// Poll `fd` for `interest` together with the stop signal, with no timeout.
///
/// The stop signal wins over everything else. `Fired` requires exactly one
/// ready descriptor whose events include `interest` and no error bits.
pub fn wait_for_event(fd: BorrowedFd<'_>, interest: PollFlags, stop: &StopSignal) -> io::Result<WaitOutcome> {
    if stop.is_raised() {
        return Ok(WaitOutcome::Stopped);
    }

    let mut fds = [
        PollFd::new(fd, interest),
        PollFd::new(stop.as_fd(), PollFlags::POLLIN),
    ];
    let ready = poll(&mut fds, PollTimeout::NONE)?;

    let stop_ready = fds[1].revents().map_or(false, |r| r.contains(PollFlags::POLLIN));
    if stop_ready || stop.is_raised() {
        return Ok(WaitOutcome::Stopped);
    }

    let revents = fds[0].revents().unwrap_or(PollFlags::empty());
    let broken = PollFlags::POLLERR | PollFlags::POLLNVAL | PollFlags::POLLHUP;
    if ready == 1 && revents.contains(interest) && !revents.intersects(broken) {
        Ok(WaitOutcome::Fired)
    } else {
        Ok(WaitOutcome::Unexpected { ready, revents })
    }
}

// ── Real kernel files ────────────────────────────────────────────────

/// Pressure files on disk: `/proc/pressure/<resource>` or, for a cgroup v2
/// directory, `<dir>/<resource>.pressure`.
#[derive(Debug, Clone)]
pub struct ProcPressure {
    root:   PathBuf,
    suffix: &'static str,
}

impl ProcPressure {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), suffix: "" }
    }

    pub fn cgroup(dir: impl Into<PathBuf>) -> Self {
        Self { root: dir.into(), suffix: ".pressure" }
    }
}

impl Default for ProcPressure {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl PsiFs for ProcPressure {
    fn report_path(&self, resource: Resource) -> PathBuf {
        self.root.join(format!("{}{}", resource.name(), self.suffix))
    }

    fn open_report(&self, resource: Resource) -> io::Result<Box<dyn ReportFile>> {
        let file = File::open(self.report_path(resource))?;
        Ok(Box::new(file))
    }

    fn open_trigger(&self, resource: Resource) -> io::Result<Box<dyn TriggerFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(self.report_path(resource))?;
        Ok(Box::new(ProcTrigger { file }))
    }
}

struct ProcTrigger {
    file: File,
}

impl TriggerFile for ProcTrigger {
    fn write_once(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn wait(&mut self, stop: &StopSignal) -> io::Result<WaitOutcome> {
        wait_for_event(self.file.as_fd(), PollFlags::POLLPRI, stop)
    }
}
