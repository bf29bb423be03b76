use super::kernel::{ProcPressure, PsiFs, ReportFile};
use super::notifier::{NotifierOptions, TriggerNotifier};
use super::pressure::{parse_report, parse_report_lenient};
use crate::error::PsiError;
use crate::models::pressure::{PressureRecord, Resource, Trigger};
use log::debug;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reports are a few short lines; one read of this size covers all of them.
pub const SNAPSHOT_BUF_SIZE: usize = 1024;

/// Pressure for one resource class, read through a descriptor held open
/// for the monitor's lifetime.
pub struct PressureMonitor {
    resource: Resource,
    path:     PathBuf,
    fs:       Arc<dyn PsiFs>,
    report:   Box<dyn ReportFile>,
    options:  NotifierOptions,
}

impl PressureMonitor {
    /// Open `/proc/pressure/<resource>` read-only.
    pub fn open(resource: Resource) -> Result<Self, PsiError> {
        Self::with_fs(Arc::new(ProcPressure::default()), resource)
    }

    pub fn with_fs(fs: Arc<dyn PsiFs>, resource: Resource) -> Result<Self, PsiError> {
        let path = fs.report_path(resource);
        let report = fs
            .open_report(resource)
            .map_err(|source| PsiError::Open { path: path.clone(), source })?;
        debug!("opened {} pressure at {}", resource, path.display());
        Ok(Self { resource, path, fs, report, options: NotifierOptions::default() })
    }

    /// Retry policy for triggers registered after this call.
    pub fn with_options(mut self, options: NotifierOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current pressure, one record per line of the report in file order.
    /// A malformed line fails the whole snapshot.
    pub fn snapshot(&mut self) -> Result<Vec<PressureRecord>, PsiError> {
        let text = self.read_report()?;
        parse_report(&text)
    }

    /// Like [`snapshot`](Self::snapshot) but skips malformed lines.
    pub fn snapshot_lenient(&mut self) -> Result<Vec<PressureRecord>, PsiError> {
        let text = self.read_report()?;
        Ok(parse_report_lenient(&text))
    }

    /// Arm a kernel trigger on a new descriptor for this resource.
    pub fn register_trigger(&self, trigger: Trigger) -> Result<TriggerNotifier, PsiError> {
        TriggerNotifier::arm(self.fs.as_ref(), self.resource, trigger, self.options)
    }

    // The file is snapshot-on-read: read once, then rewind for the next call.
    fn read_report(&mut self) -> Result<String, PsiError> {
        let mut buf = [0u8; SNAPSHOT_BUF_SIZE];
        let read_err = |source| PsiError::Read { path: self.path.clone(), source };

        let n = self.report.read(&mut buf).map_err(read_err)?;
        self.report.seek(SeekFrom::Start(0)).map_err(read_err)?;
        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }
}
