//! In-memory stand-in for `/proc/pressure`, used by unit tests.
//!
//! Reports are plain strings that tests can rewrite between snapshots.
//! Trigger writes are validated with the kernel's rules, and every armed
//! descriptor gets its own semaphore eventfd so tests can fire it.

use super::kernel::{wait_for_event, PsiFs, ReportFile, StopSignal, TriggerFile, WaitOutcome};
use crate::models::pressure::Resource;
use nix::poll::PollFlags;
use nix::sys::eventfd::{EfdFlags, EventFd};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

const WINDOW_MIN_US: u64 = 500_000;
const WINDOW_MAX_US: u64 = 10_000_000;
// Without CAP_SYS_RESOURCE the window must be a whole number of these.
const UNPRIV_WINDOW_US: u64 = 2_000_000;

#[derive(Default)]
struct State {
    reports:            HashMap<Resource, String>,
    failing_reads:      HashSet<Resource>,
    triggers:           Vec<Arc<FakeDescriptor>>,
    max_triggers:       Option<usize>,
    short_writes:       bool,
    unprivileged:       bool,
    next_wait_failures: u32,
    next_unexpected:    u32,
}

/// One armed trigger descriptor.
pub struct FakeDescriptor {
    pub resource:   Resource,
    pub line:       String,
    ready:          EventFd,
    pub fail_waits: AtomicU32,
    pub unexpected: AtomicU32,
}

impl FakeDescriptor {
    pub fn fire(&self) {
        self.ready.write(1).expect("fake eventfd write");
    }
}

#[derive(Clone, Default)]
pub struct FakePsiFs {
    state: Arc<Mutex<State>>,
}

impl FakePsiFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_report(&self, resource: Resource, text: &str) {
        self.state.lock().unwrap().reports.insert(resource, text.to_string());
    }

    pub fn fail_reads(&self, resource: Resource) {
        self.state.lock().unwrap().failing_reads.insert(resource);
    }

    pub fn limit_triggers(&self, max: usize) {
        self.state.lock().unwrap().max_triggers = Some(max);
    }

    pub fn short_writes(&self) {
        self.state.lock().unwrap().short_writes = true;
    }

    /// The next armed descriptor fails its first `n` waits.
    pub fn fail_next_waits(&self, n: u32) {
        self.state.lock().unwrap().next_wait_failures = n;
    }

    /// The next armed descriptor wakes with POLLERR instead of firing on its
    /// first `n` waits.
    pub fn unexpected_next_waits(&self, n: u32) {
        self.state.lock().unwrap().next_unexpected = n;
    }

    /// Apply the window rule the kernel enforces on unprivileged writers.
    pub fn unprivileged(&self) {
        self.state.lock().unwrap().unprivileged = true;
    }

    pub fn descriptors(&self) -> Vec<Arc<FakeDescriptor>> {
        self.state.lock().unwrap().triggers.clone()
    }

    pub fn fire(&self, index: usize) {
        self.descriptors()[index].fire();
    }
}

impl PsiFs for FakePsiFs {
    fn report_path(&self, resource: Resource) -> PathBuf {
        PathBuf::from("/fake/pressure").join(resource.name())
    }

    fn open_report(&self, resource: Resource) -> io::Result<Box<dyn ReportFile>> {
        if !self.state.lock().unwrap().reports.contains_key(&resource) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(Box::new(FakeReport { state: Arc::clone(&self.state), resource, pos: 0 }))
    }

    fn open_trigger(&self, resource: Resource) -> io::Result<Box<dyn TriggerFile>> {
        if !self.state.lock().unwrap().reports.contains_key(&resource) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(Box::new(FakeTrigger { state: Arc::clone(&self.state), resource, armed: None }))
    }
}

struct FakeReport {
    state:    Arc<Mutex<State>>,
    resource: Resource,
    pos:      usize,
}

impl Read for FakeReport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.lock().unwrap();
        if state.failing_reads.contains(&self.resource) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
        }
        let text = state.reports.get(&self.resource).map(String::as_bytes).unwrap_or_default();
        let rest = text.get(self.pos..).unwrap_or_default();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for FakeReport {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(off) => self.pos = off as usize,
            _ => return Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
        Ok(self.pos as u64)
    }
}

struct FakeTrigger {
    state:    Arc<Mutex<State>>,
    resource: Resource,
    armed:    Option<Arc<FakeDescriptor>>,
}

// Mirrors psi_trigger_create(): "<some|full> <threshold_us> <window_us>".
fn validate(line: &str, privileged: bool) -> io::Result<()> {
    let einval = || io::Error::from_raw_os_error(libc::EINVAL);
    let mut parts = line.trim_end_matches(['\n', '\0']).split(' ');
    match parts.next() {
        Some("some") | Some("full") => {}
        _ => return Err(einval()),
    }
    let threshold: u64 = parts.next().and_then(|v| v.parse().ok()).ok_or_else(einval)?;
    let window: u64 = parts.next().and_then(|v| v.parse().ok()).ok_or_else(einval)?;
    if parts.next().is_some() {
        return Err(einval());
    }
    if !(WINDOW_MIN_US..=WINDOW_MAX_US).contains(&window) || threshold == 0 || threshold > window {
        return Err(einval());
    }
    if !privileged && window % UNPRIV_WINDOW_US != 0 {
        return Err(einval());
    }
    Ok(())
}

impl TriggerFile for FakeTrigger {
    fn write_once(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.armed.is_some() {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        let line = std::str::from_utf8(buf).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        let mut state = self.state.lock().unwrap();
        validate(line, !state.unprivileged)?;
        let in_use = state.triggers.iter().filter(|d| d.resource == self.resource).count();
        if state.max_triggers.map_or(false, |max| in_use >= max) {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        if state.short_writes {
            return Ok(buf.len().saturating_sub(1));
        }

        let ready = EventFd::from_value_and_flags(
            0,
            EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK | EfdFlags::EFD_SEMAPHORE,
        )?;
        let desc = Arc::new(FakeDescriptor {
            resource:   self.resource,
            line:       line.to_string(),
            ready,
            fail_waits: AtomicU32::new(std::mem::take(&mut state.next_wait_failures)),
            unexpected: AtomicU32::new(std::mem::take(&mut state.next_unexpected)),
        });
        state.triggers.push(Arc::clone(&desc));
        self.armed = Some(desc);
        Ok(buf.len())
    }

    fn wait(&mut self, stop: &StopSignal) -> io::Result<WaitOutcome> {
        let desc = self.armed.as_ref().ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;
        if !stop.is_raised() {
            if take_one(&desc.fail_waits) {
                return Err(io::Error::new(io::ErrorKind::Other, "injected wait failure"));
            }
            if take_one(&desc.unexpected) {
                return Ok(WaitOutcome::Unexpected { ready: 1, revents: PollFlags::POLLERR });
            }
        }
        let outcome = wait_for_event(desc.ready.as_fd(), PollFlags::POLLIN, stop)?;
        if outcome == WaitOutcome::Fired {
            // semaphore mode: one read consumes one fire
            desc.ready.read()?;
        }
        Ok(outcome)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_like_the_kernel() {
        assert!(validate("some 100000 1000000\n", true).is_ok());
        assert!(validate("full 500000 500000\n", true).is_ok());
        assert!(validate("some 2000000 1000000\n", true).is_err());
        assert!(validate("some 0 1000000\n", true).is_err());
        assert!(validate("some 1000 100000\n", true).is_err());
        assert!(validate("both 1000 1000000\n", true).is_err());
        assert!(validate("some 1000\n", true).is_err());
    }

    #[test]
    fn unprivileged_windows_are_whole_two_seconds() {
        assert!(validate("some 100000 1000000\n", false).is_err());
        assert!(validate("some 100000 2000000\n", false).is_ok());
        assert!(validate("some 100000 4000000\n", false).is_ok());
        assert!(validate("some 100000 3000000\n", false).is_err());
    }
}
