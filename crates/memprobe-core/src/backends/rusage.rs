//! OS resource-usage backend.
//!
//! `getrusage(RUSAGE_SELF)` only exposes the peak resident size (`ru_maxrss`),
//! so samples from this backend have `peak_bytes` set and `resident_bytes`
//! left as `None`. The rest of the struct (faults, CPU time, block I/O,
//! context switches) is carried as counters.

use tracing::debug;

use crate::backend::MemoryBackend;
use crate::error::{ProbeError, Result};
use crate::types::{BackendKind, MemorySample};

/// Peak RSS from the kernel's resource accounting for this process.
#[derive(Clone, Copy, Debug, Default)]
pub struct RusageBackend;

impl MemoryBackend for RusageBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Rusage
    }

    fn sample(&mut self) -> Result<MemorySample> {
        let usage = platform::self_usage()
            .map_err(|reason| ProbeError::unsupported(BackendKind::Rusage, reason))?;
        debug!(peak = usage.max_rss_bytes, "rusage sample");
        Ok(usage.into_sample())
    }
}

/// The fields of `struct rusage` this backend reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Usage {
    max_rss_bytes: u64,
    user_time_us: u64,
    system_time_us: u64,
    minor_faults: u64,
    major_faults: u64,
    block_reads: u64,
    block_writes: u64,
    voluntary_switches: u64,
    involuntary_switches: u64,
}

impl Usage {
    fn into_sample(self) -> MemorySample {
        MemorySample::empty(BackendKind::Rusage)
            .with_peak(self.max_rss_bytes)
            .with_counter("user_time_us", self.user_time_us)
            .with_counter("system_time_us", self.system_time_us)
            .with_counter("minor_faults", self.minor_faults)
            .with_counter("major_faults", self.major_faults)
            .with_counter("block_reads", self.block_reads)
            .with_counter("block_writes", self.block_writes)
            .with_counter("voluntary_switches", self.voluntary_switches)
            .with_counter("involuntary_switches", self.involuntary_switches)
    }
}

#[cfg(unix)]
mod platform {
    use std::io;
    use std::mem::MaybeUninit;

    use super::Usage;

    /// `ru_maxrss` is reported in bytes on Apple platforms and KiB elsewhere.
    const MAXRSS_UNIT: u64 = if cfg!(any(target_os = "macos", target_os = "ios")) {
        1
    } else {
        1024
    };

    fn non_negative<T: TryInto<u64>>(v: T) -> u64 {
        v.try_into().unwrap_or(0)
    }

    fn micros(tv: libc::timeval) -> u64 {
        let us = i64::from(tv.tv_sec)
            .saturating_mul(1_000_000)
            .saturating_add(i64::from(tv.tv_usec));
        non_negative(us)
    }

    #[allow(unsafe_code)]
    pub(super) fn self_usage() -> Result<Usage, String> {
        let mut usage = MaybeUninit::<libc::rusage>::zeroed();
        // SAFETY: getrusage only writes into the struct we pass it.
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
        if rc != 0 {
            return Err(format!("getrusage failed: {}", io::Error::last_os_error()));
        }
        // SAFETY: zero-initialised and filled in by a successful getrusage.
        let ru = unsafe { usage.assume_init() };
        Ok(Usage {
            max_rss_bytes: non_negative(ru.ru_maxrss).saturating_mul(MAXRSS_UNIT),
            user_time_us: micros(ru.ru_utime),
            system_time_us: micros(ru.ru_stime),
            minor_faults: non_negative(ru.ru_minflt),
            major_faults: non_negative(ru.ru_majflt),
            block_reads: non_negative(ru.ru_inblock),
            block_writes: non_negative(ru.ru_oublock),
            voluntary_switches: non_negative(ru.ru_nvcsw),
            involuntary_switches: non_negative(ru.ru_nivcsw),
        })
    }
}

#[cfg(not(unix))]
mod platform {
    use super::Usage;

    pub(super) fn self_usage() -> Result<Usage, String> {
        Err("getrusage is not available on this operating system".to_owned())
    }
}
