//! Heap-census and allocation-tracing backends over a live tracking allocator.
//!
//! Invariants tested:
//! 1) the census aggregate grows while tagged data is alive and its
//!    breakdown is sorted descending;
//! 2) tracing has a two-state lifecycle and no retroactive visibility;
//! 3) two tracers keep independent windows;
//! 4) frees of blocks allocated before `start` never offset later ones;
//! 5) a started census only counts what was allocated after `start`.

#![deny(rust_2018_idioms)]

use memprobe_alloc::{SiteTag, TrackingAllocator, TypeTag};
use memprobe_core::{AllocationSite, BackendKind, MemoryProbe, ProbeError, SiteKey};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::system();

struct CensusBlob;
struct RelativeBlob;

fn alloc_at(site: SiteTag, bytes: usize) -> Vec<u8> {
    let _s = site.enter();
    vec![1u8; bytes]
}

#[test]
fn census_reports_tagged_types() {
    let ty = TypeTag::of::<CensusBlob>();
    let mut probe = MemoryProbe::new(BackendKind::HeapCensus);

    let before = probe.sample().expect("census sample");
    assert!(before.resident_bytes.is_some());
    assert!(before.peak_bytes >= before.resident_bytes);

    let blob = {
        let _t = ty.enter();
        vec![0u8; 256 * 1024]
    };
    let sites = probe.snapshot_sites().expect("census sites");
    let entry = sites
        .iter()
        .find(|s| s.key == SiteKey::Type { name: ty.name().to_owned() })
        .expect("type entry present");
    assert_eq!(entry.size_bytes, 256 * 1024);
    assert_eq!(entry.count, 1);
    assert!(sites.windows(2).all(|w| w[0].size_bytes >= w[1].size_bytes));

    let after = probe.sample().expect("census sample");
    assert!(after.peak_bytes.unwrap() >= 256 * 1024);
    drop(blob);
}

#[test]
fn tracing_lifecycle() {
    let mut probe = MemoryProbe::new(BackendKind::AllocTracing);
    assert!(matches!(probe.snapshot_sites(), Err(ProbeError::TracingNotStarted)));

    let site_before = SiteTag::here();
    let early = alloc_at(site_before, 4096);

    probe.start().expect("start tracing");
    let site_after = SiteTag::here();
    let small = alloc_at(site_after, 1000);
    let big_site = SiteTag::here();
    let big = alloc_at(big_site, 64 * 1024);

    let sites = probe.snapshot_sites().expect("snapshot");
    let key_of = |t: SiteTag| SiteKey::from(t.key());

    assert!(
        !sites.iter().any(|s| s.key == key_of(site_before)),
        "allocations made before start must be invisible"
    );
    let pos_big = sites.iter().position(|s| s.key == key_of(big_site)).expect("big site");
    let pos_small = sites.iter().position(|s| s.key == key_of(site_after)).expect("small site");
    assert!(pos_big < pos_small);
    assert_eq!(sites[pos_big].size_bytes, 64 * 1024);
    assert_eq!(sites[pos_big].count, 1);
    assert_eq!(sites[pos_small].size_bytes, 1000);

    // Sorted descending; the head bounds everything else.
    assert!(sites.windows(2).all(|w| w[0].size_bytes >= w[1].size_bytes));
    let top = sites[0].size_bytes;
    assert!(sites.iter().all(|s| s.size_bytes <= top));

    // Snapshots can be repeated; restarting keeps the original window.
    probe.start().expect("second start");
    let again = probe.snapshot_sites().expect("snapshot again");
    assert!(again.iter().any(|s| s.key == key_of(big_site)));

    let sample = probe.sample().expect("tracing sample");
    assert!(sample.resident_bytes.unwrap() >= 64 * 1024 + 1000);

    drop((early, small, big));
}

#[test]
fn freed_sites_drop_out_of_snapshots() {
    let mut probe = MemoryProbe::new(BackendKind::AllocTracing);
    probe.start().expect("start");
    let site = SiteTag::here();
    let buf = alloc_at(site, 2048);
    let key = SiteKey::from(site.key());
    assert!(probe.snapshot_sites().unwrap().iter().any(|s| s.key == key));
    drop(buf);
    assert!(!probe.snapshot_sites().unwrap().iter().any(|s| s.key == key));
}

#[test]
fn tracers_have_independent_windows() {
    let site = SiteTag::here();

    let mut first = MemoryProbe::new(BackendKind::AllocTracing);
    first.start().expect("start first");
    let a = alloc_at(site, 3000);

    let mut second = MemoryProbe::new(BackendKind::AllocTracing);
    second.start().expect("start second");
    let b = alloc_at(site, 5000);

    let key = SiteKey::from(site.key());
    let seen = |p: &mut MemoryProbe| {
        p.snapshot_sites()
            .unwrap()
            .into_iter()
            .find(|s| s.key == key)
            .map(|s| s.size_bytes)
    };
    assert_eq!(seen(&mut first), Some(8000));
    assert_eq!(seen(&mut second), Some(5000));

    let mut never_started = MemoryProbe::new(BackendKind::AllocTracing);
    assert!(matches!(never_started.sample(), Err(ProbeError::TracingNotStarted)));
    drop((a, b));
}

fn site_entry(probe: &mut MemoryProbe, site: SiteTag) -> Option<AllocationSite> {
    let key = SiteKey::from(site.key());
    probe
        .snapshot_sites()
        .expect("snapshot")
        .into_iter()
        .find(|s| s.key == key)
}

#[test]
fn pre_start_free_does_not_hide_new_allocation() {
    let site = SiteTag::here();
    let old = alloc_at(site, 4096);

    let mut probe = MemoryProbe::new(BackendKind::AllocTracing);
    probe.start().expect("start");
    drop(old);
    let fresh = alloc_at(site, 1000);

    let entry = site_entry(&mut probe, site).expect("post-start block is visible");
    assert_eq!((entry.size_bytes, entry.count), (1000, 1));
    drop(fresh);
}

#[test]
fn site_count_follows_site_bytes() {
    let site = SiteTag::here();
    let blocks: Vec<Vec<u8>> = (0..10).map(|_| alloc_at(site, 10)).collect();

    let mut probe = MemoryProbe::new(BackendKind::AllocTracing);
    probe.start().expect("start");
    drop(blocks);
    let one = alloc_at(site, 500);

    let entry = site_entry(&mut probe, site).expect("post-start block is visible");
    assert_eq!((entry.size_bytes, entry.count), (500, 1));
    assert_eq!(entry.average_bytes(), 500);
    drop(one);
    assert!(site_entry(&mut probe, site).is_none());
}

#[test]
fn started_census_is_relative() {
    let ty = TypeTag::of::<RelativeBlob>();
    let type_key = SiteKey::Type { name: ty.name().to_owned() };
    let alloc_typed = |bytes: usize| {
        let _t = ty.enter();
        vec![1u8; bytes]
    };

    let old = alloc_typed(64 * 1024);
    let mut absolute = MemoryProbe::new(BackendKind::HeapCensus);
    let mut relative = MemoryProbe::new(BackendKind::HeapCensus);
    relative.start().expect("start census");
    relative.start().expect("second start keeps the window");

    let new = alloc_typed(16 * 1024);
    let entry = |p: &mut MemoryProbe| {
        p.snapshot_sites()
            .expect("census sites")
            .into_iter()
            .find(|s| s.key == type_key)
            .map(|s| (s.size_bytes, s.count))
    };
    assert_eq!(entry(&mut absolute), Some((80 * 1024, 2)));
    assert_eq!(entry(&mut relative), Some((16 * 1024, 1)));

    drop(old);
    assert_eq!(entry(&mut relative), Some((16 * 1024, 1)));
    assert_eq!(entry(&mut absolute), Some((16 * 1024, 1)));

    let abs = absolute.sample().expect("absolute sample");
    let rel = relative.sample().expect("relative sample");
    assert!(rel.resident_bytes.unwrap() >= 16 * 1024);
    assert!(rel.peak_bytes >= rel.resident_bytes);
    assert!(abs.peak_bytes >= abs.resident_bytes);

    drop(new);
    assert_eq!(entry(&mut relative), None);
}
