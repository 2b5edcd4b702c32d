//! Process-introspection backend.
//!
//! Reads the live memory counters of the current PID through `sysinfo` at
//! call time. `sysinfo` has no notion of a peak, so on Linux the high-water
//! mark is taken from `VmHWM` in `/proc/self/status`; elsewhere it stays
//! `None`. The same file supplies the RSS breakdown (anonymous, file-backed,
//! shared) and segment sizes as counters.

use sysinfo::{Pid, System};
use tracing::debug;

use crate::backend::MemoryBackend;
use crate::error::{ProbeError, Result};
use crate::types::{BackendKind, MemorySample};

/// Resident and virtual size of the current process.
pub struct ProcessBackend {
    system: System,
    pid: Option<Pid>,
}

impl std::fmt::Debug for ProcessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBackend")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl Default for ProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessBackend {
    /// Resolve the current PID; sampling reports the failure if this cannot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl MemoryBackend for ProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    fn sample(&mut self) -> Result<MemorySample> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::unsupported(
                BackendKind::Process,
                "sysinfo does not support this operating system",
            ));
        }
        let pid = self.pid.ok_or_else(|| {
            ProbeError::unsupported(BackendKind::Process, "cannot resolve the current pid")
        })?;
        if !self.system.refresh_process(pid) {
            return Err(ProbeError::unsupported(
                BackendKind::Process,
                format!("process {pid} not visible in the process table"),
            ));
        }
        let proc_ = self.system.process(pid).ok_or_else(|| {
            ProbeError::unsupported(BackendKind::Process, format!("process {pid} vanished"))
        })?;

        let mut sample = MemorySample::empty(BackendKind::Process)
            .with_resident(proc_.memory())
            .with_virtual(proc_.virtual_memory());
        if let Some(status) = status::read_self() {
            if let Some(peak) = status::parse_kib(&status, "VmHWM") {
                sample = sample.with_peak(peak);
            }
            for (field, name) in status::COUNTERS {
                if let Some(bytes) = status::parse_kib(&status, field) {
                    sample = sample.with_counter(name, bytes);
                }
            }
        }
        debug!(
            %pid,
            resident = ?sample.resident_bytes,
            peak = ?sample.peak_bytes,
            "process sample"
        );
        Ok(sample)
    }
}

mod status {
    /// `/proc/<pid>/status` fields reported as counters, with their names.
    pub(super) const COUNTERS: [(&str, &str); 7] = [
        ("VmPeak", "virtual_peak_bytes"),
        ("RssAnon", "rss_anon_bytes"),
        ("RssFile", "rss_file_bytes"),
        ("RssShmem", "rss_shmem_bytes"),
        ("VmData", "data_bytes"),
        ("VmStk", "stack_bytes"),
        ("VmExe", "text_bytes"),
    ];

    /// Value of a `Field:   12345 kB` line, in bytes.
    pub(super) fn parse_kib(status: &str, field: &str) -> Option<u64> {
        status.lines().find_map(|line| {
            let rest = line.strip_prefix(field)?.strip_prefix(':')?;
            let kib = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            Some(kib.saturating_mul(1024))
        })
    }

    #[cfg(target_os = "linux")]
    pub(super) fn read_self() -> Option<String> {
        match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!(error = %e, "reading /proc/self/status");
                None
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub(super) fn read_self() -> Option<String> {
        None
    }
}
