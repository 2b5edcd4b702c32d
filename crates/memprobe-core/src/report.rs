//! Rendering of samples and site lists.
//!
//! The reporter is pure formatting over a configurable sink: any
//! `io::Write` (stdout, a file, an in-memory buffer) or the structured log.
//! It never re-sorts what it is given.

use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::types::{AllocationSite, BackendKind, MemorySample};

/// Line format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Where report lines go.
#[derive(Debug)]
pub enum ReportSink<W> {
    /// A byte sink (stdout, file, buffer).
    Writer(W),
    /// `tracing` events at INFO under the `memprobe::report` target.
    Log,
}

/// Writes samples and site lists to a sink.
#[derive(Debug)]
pub struct Reporter<W = io::Stdout> {
    sink: ReportSink<W>,
    format: OutputFormat,
}

impl Reporter<io::Stdout> {
    /// Reporter writing to stdout.
    #[must_use]
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> Reporter<W> {
    /// Reporter writing to `out`.
    #[must_use]
    pub const fn new(out: W, format: OutputFormat) -> Self {
        Self {
            sink: ReportSink::Writer(out),
            format,
        }
    }

    /// Reporter emitting `tracing` events instead of bytes.
    #[must_use]
    pub const fn log(format: OutputFormat) -> Self {
        Self {
            sink: ReportSink::Log,
            format,
        }
    }

    /// Format in use.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Give back the writer (`None` for the log sink).
    pub fn into_inner(self) -> Option<W> {
        match self.sink {
            ReportSink::Writer(w) => Some(w),
            ReportSink::Log => None,
        }
    }

    /// A section title; text format only (JSON output stays one object per line).
    pub fn heading(&mut self, title: &str) -> Result<()> {
        match self.format {
            OutputFormat::Text => self.emit(title),
            OutputFormat::Json => Ok(()),
        }
    }

    /// One line with the sample's resident / peak / virtual figures.
    pub fn report(&mut self, sample: &MemorySample) -> Result<()> {
        let line = match self.format {
            OutputFormat::Text => format_sample(sample),
            OutputFormat::Json => serde_json::to_string(sample)?,
        };
        self.emit(&line)
    }

    /// Up to `limit` lines, one per site, in the order given.
    pub fn report_top(&mut self, sites: &[AllocationSite], limit: usize) -> Result<()> {
        for site in sites.iter().take(limit) {
            let line = match self.format {
                OutputFormat::Text => format_site(site),
                OutputFormat::Json => serde_json::to_string(site)?,
            };
            self.emit(&line)?;
        }
        Ok(())
    }

    /// One line with the signed change between two samples.
    pub fn report_delta(&mut self, before: &MemorySample, after: &MemorySample) -> Result<()> {
        let delta = SampleDelta::between(before, after);
        let line = match self.format {
            OutputFormat::Text => format_delta(&delta),
            OutputFormat::Json => serde_json::to_string(&delta)?,
        };
        self.emit(&line)
    }

    /// Flush the underlying writer, if any.
    pub fn flush(&mut self) -> Result<()> {
        if let ReportSink::Writer(w) = &mut self.sink {
            w.flush()?;
        }
        Ok(())
    }

    fn emit(&mut self, line: &str) -> Result<()> {
        match &mut self.sink {
            ReportSink::Writer(w) => {
                w.write_all(line.as_bytes())?;
                w.write_all(b"\n")?;
            }
            ReportSink::Log => info!(target: "memprobe::report", "{line}"),
        }
        Ok(())
    }
}

/// Signed difference between two samples of the same process.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct SampleDelta {
    /// Backend of the later sample.
    pub backend: BackendKind,
    /// `after.resident - before.resident` when both are known.
    pub resident_delta: Option<i64>,
    /// `after.peak - before.peak` when both are known.
    pub peak_delta: Option<i64>,
}

impl SampleDelta {
    /// Compute `after - before` field by field.
    #[must_use]
    pub fn between(before: &MemorySample, after: &MemorySample) -> Self {
        Self {
            backend: after.backend,
            resident_delta: signed_diff(before.resident_bytes, after.resident_bytes),
            peak_delta: signed_diff(before.peak_bytes, after.peak_bytes),
        }
    }
}

fn signed_diff(before: Option<u64>, after: Option<u64>) -> Option<i64> {
    let (b, a) = (i128::from(before?), i128::from(after?));
    i64::try_from(a - b).ok()
}

/* ---------------- Text formatting ---------------- */

/// `12.3 MiB`-style rendering with binary units.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if n < 1024 {
        return format!("{n} B");
    }
    let mut value = n as f64 / 1024.0;
    let mut unit = UNITS[0];
    for &next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.1} {unit}")
}

fn figure(bytes: Option<u64>) -> String {
    bytes.map_or_else(
        || "n/a".to_owned(),
        |n| format!("{} ({n} bytes)", human_bytes(n)),
    )
}

fn signed_figure(delta: Option<i64>) -> String {
    delta.map_or_else(
        || "n/a".to_owned(),
        |d| {
            let sign = if d < 0 { '-' } else { '+' };
            format!("{sign}{} ({d:+} bytes)", human_bytes(d.unsigned_abs()))
        },
    )
}

/// Text line for a sample; counters follow as `name=value`, sizes humanised.
#[must_use]
pub fn format_sample(sample: &MemorySample) -> String {
    let mut line = format!(
        "[{}] resident={} peak={} virtual={}",
        sample.backend,
        figure(sample.resident_bytes),
        figure(sample.peak_bytes),
        figure(sample.virtual_bytes),
    );
    for (name, &value) in &sample.counters {
        if name.ends_with("_bytes") {
            line.push_str(&format!(" {name}={}", human_bytes(value)));
        } else {
            line.push_str(&format!(" {name}={value}"));
        }
    }
    line
}

/// Text line for a site: `key: size=…, count=…, average=…`.
#[must_use]
pub fn format_site(site: &AllocationSite) -> String {
    format!(
        "{}: size={}, count={}, average={}",
        site.key,
        human_bytes(site.size_bytes),
        site.count,
        human_bytes(site.average_bytes()),
    )
}

/// Text line for a delta.
#[must_use]
pub fn format_delta(delta: &SampleDelta) -> String {
    format!(
        "[{}] resident {} peak {}",
        delta.backend,
        signed_figure(delta.resident_delta),
        signed_figure(delta.peak_delta),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SiteKey;

    fn sites(sizes: &[u64]) -> Vec<AllocationSite> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| AllocationSite {
                key: SiteKey::Line {
                    file: "src/work.rs".into(),
                    line: u32::try_from(i).unwrap() + 1,
                },
                size_bytes: size,
                count: 2,
            })
            .collect()
    }

    fn lines(rep: Reporter<Vec<u8>>) -> Vec<String> {
        String::from_utf8(rep.into_inner().unwrap())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1024), "1.0 KiB");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(human_bytes(3 << 30), "3.0 GiB");
    }

    #[test]
    fn report_sample_shows_absent_figures() {
        let mut rep = Reporter::new(Vec::new(), OutputFormat::Text);
        rep.report(&MemorySample::empty(BackendKind::Rusage).with_peak(2048))
            .unwrap();
        let out = lines(rep);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0],
            "[rusage] resident=n/a peak=2.0 KiB (2048 bytes) virtual=n/a"
        );
    }

    #[test]
    fn counters_follow_the_fixed_figures() {
        let sample = MemorySample::empty(BackendKind::Process)
            .with_resident(1024)
            .with_counter("rss_anon_bytes", 2048)
            .with_counter("minor_faults", 12);
        assert_eq!(
            format_sample(&sample),
            "[process] resident=1.0 KiB (1024 bytes) peak=n/a virtual=n/a \
             minor_faults=12 rss_anon_bytes=2.0 KiB"
        );
    }

    #[test]
    fn report_top_caps_at_input_length_and_keeps_order() {
        let input = sites(&[5, 500, 50]);
        let mut rep = Reporter::new(Vec::new(), OutputFormat::Text);
        rep.report_top(&input, 10).unwrap();
        let out = lines(rep);
        assert_eq!(out.len(), 3);
        assert!(out[0].starts_with("src/work.rs:1: size=5 B"));
        assert!(out[1].starts_with("src/work.rs:2: size=500 B"));
        assert!(out[2].starts_with("src/work.rs:3: size=50 B"));
        assert!(out[1].ends_with("count=2, average=250 B"));
    }

    #[test]
    fn report_top_respects_limit() {
        let input = sites(&[9, 8, 7, 6]);
        let mut rep = Reporter::new(Vec::new(), OutputFormat::Text);
        rep.report_top(&input, 2).unwrap();
        assert_eq!(lines(rep).len(), 2);

        let mut rep = Reporter::new(Vec::new(), OutputFormat::Text);
        rep.report_top(&input, 0).unwrap();
        assert!(lines(rep).is_empty());
    }

    #[test]
    fn json_lines_parse_back() {
        let mut rep = Reporter::new(Vec::new(), OutputFormat::Json);
        let sample = MemorySample::empty(BackendKind::Process)
            .with_resident(10)
            .with_virtual(20);
        rep.report(&sample).unwrap();
        rep.report_top(&sites(&[3, 1]), 5).unwrap();
        let out = lines(rep);
        assert_eq!(out.len(), 3);
        let back: MemorySample = serde_json::from_str(&out[0]).unwrap();
        assert_eq!(back, sample);
        let site: AllocationSite = serde_json::from_str(&out[1]).unwrap();
        assert_eq!(site.size_bytes, 3);
    }

    #[test]
    fn heading_is_text_only() {
        let mut rep = Reporter::new(Vec::new(), OutputFormat::Text);
        rep.heading("[ Top 10 ]").unwrap();
        assert_eq!(lines(rep), ["[ Top 10 ]"]);

        let mut rep = Reporter::new(Vec::new(), OutputFormat::Json);
        rep.heading("[ Top 10 ]").unwrap();
        assert!(lines(rep).is_empty());
    }

    #[test]
    fn delta_signs() {
        let before = MemorySample::empty(BackendKind::Process)
            .with_resident(4096)
            .with_peak(8192);
        let after = MemorySample::empty(BackendKind::Process)
            .with_resident(1024)
            .with_peak(10240);
        let d = SampleDelta::between(&before, &after);
        assert_eq!(d.resident_delta, Some(-3072));
        assert_eq!(d.peak_delta, Some(2048));
        assert_eq!(
            format_delta(&d),
            "[process] resident -3.0 KiB (-3072 bytes) peak +2.0 KiB (+2048 bytes)"
        );

        let partial = SampleDelta::between(&MemorySample::empty(BackendKind::Rusage), &after);
        assert_eq!(partial.resident_delta, None);
    }

    #[test]
    fn log_sink_has_no_writer() {
        let mut rep = Reporter::<Vec<u8>>::log(OutputFormat::Text);
        rep.report(&MemorySample::empty(BackendKind::Rusage)).unwrap();
        rep.flush().unwrap();
        assert!(rep.into_inner().is_none());
    }
}
