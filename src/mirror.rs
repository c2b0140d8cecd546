use crate::{
  CapturePlan, CaptureResource, DisplaySource, Error, Framebuffer, MirrorConfig, MirrorTarget,
  PixelFormat, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-cycle failures are reported on first occurrence and then once every
/// this many occurrences, so a persistently failing subsystem does not
/// flood the log at the loop cadence.
const FAILURE_LOG_INTERVAL: u64 = 256;

#[inline]
fn should_log(count: u64) -> bool {
  count == 1 || count % FAILURE_LOG_INTERVAL == 0
}

/// Counters accumulated by the steady-state loop and reported at shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStats {
  pub cycles: u64,
  pub snapshot_failures: u64,
  pub readback_failures: u64,
}

/// The steady-state controller: owns the capture resource and the mapped
/// device memory, and copies one frame per cycle from the primary display
/// into the mapping.
pub struct Mirror<S: DisplaySource, T: MirrorTarget> {
  source: S,
  resource: S::Resource,
  mapping: T::Mapping,
  plan: CapturePlan,
  interval: Duration,
  stats: MirrorStats,
}

impl<S: DisplaySource, T: MirrorTarget> std::fmt::Debug for Mirror<S, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Mirror")
      .field("plan", &self.plan)
      .field("interval", &self.interval)
      .field("stats", &self.stats)
      .finish_non_exhaustive()
  }
}

impl<S: DisplaySource, T: MirrorTarget> Mirror<S, T> {
  /// Bring the mirror path up: derive the capture encoding from the
  /// target's pixel depth, negotiate the capture geometry, create the
  /// capture resource and map the device memory.
  ///
  /// Acquisition order is fixed: geometry first, then the resource, then
  /// the mapping. A failure releases whatever was already acquired in
  /// reverse order before returning.
  pub fn new(source: S, target: &T, config: &MirrorConfig) -> Result<Self> {
    let device = target.geometry();
    let format = PixelFormat::from_bits_per_pixel(device.bits_per_pixel).ok_or(
      Error::UnsupportedPixelDepth {
        bits_per_pixel: device.bits_per_pixel,
      },
    )?;
    let plan = CapturePlan::negotiate(&device, config.width_divisor);

    let resource = source.create_resource(format, plan.width, plan.height)?;
    debug!(
      "capture resource ready ({}x{})",
      resource.width(),
      resource.height()
    );

    let mapping = target.map()?;
    debug!("mapped {} bytes of device memory", target.mem_len());
    if mapping.len() < plan.dest_len() {
      return Err(Error::InvalidBufferLength);
    }

    let primary = source.geometry();
    info!(
      "mirroring {}x{} primary into {}x{} window, {} bytes/row",
      primary.width, primary.height, plan.width, plan.height, plan.pitch
    );

    Ok(Self {
      source,
      resource,
      mapping,
      plan,
      interval: config.frame_interval,
      stats: MirrorStats::default(),
    })
  }

  #[inline]
  pub const fn plan(&self) -> &CapturePlan {
    &self.plan
  }

  /// The mapped device memory.
  #[inline]
  pub fn mapped(&self) -> &[u8] {
    &self.mapping
  }

  /// Run the capture-convert-write loop until `cancel` is set.
  ///
  /// Each cycle snapshots the primary display into the capture resource,
  /// reads the capture rect back into the mapped device memory and then
  /// sleeps for the configured interval. Per-cycle failures are counted
  /// and logged but never stop the loop.
  pub fn run(&mut self, cancel: &AtomicBool) -> MirrorStats {
    let dest_len = self.plan.dest_len();
    debug!("mirror loop running, {} bytes per cycle", dest_len);

    while !cancel.load(Ordering::Relaxed) {
      self.stats.cycles += 1;

      if let Err(err) = self.source.snapshot(&mut self.resource) {
        self.stats.snapshot_failures += 1;
        if should_log(self.stats.snapshot_failures) {
          warn!(
            "snapshot failed ({} so far): {err}",
            self.stats.snapshot_failures
          );
        }
      }

      // the resource still holds the previous frame after a failed
      // snapshot, so the readback is attempted regardless
      if let Err(err) = self.source.read_rect(
        &self.resource,
        &self.plan.rect,
        &mut self.mapping[..dest_len],
        self.plan.pitch,
      ) {
        self.stats.readback_failures += 1;
        if should_log(self.stats.readback_failures) {
          warn!(
            "readback failed ({} so far): {err}",
            self.stats.readback_failures
          );
        }
      }

      thread::sleep(self.interval);
    }

    info!("mirror loop cancelled after {} cycles", self.stats.cycles);
    self.stats
  }
}

/// Open the secondary device, bring up a [`Mirror`] over it and run the
/// loop until `cancel` is set.
///
/// `open_source` opens the primary display; it runs first so that no
/// device-side resource exists if the primary display is unavailable, and
/// no capture resource is created if the device cannot be opened.
pub fn run_mirror<S, F>(
  open_source: F,
  config: &MirrorConfig,
  cancel: &AtomicBool,
) -> Result<MirrorStats>
where
  S: DisplaySource,
  F: FnOnce() -> Result<S>,
{
  let source = open_source()?;
  let target = Framebuffer::open(&config.device_path)?;
  let mut mirror = Mirror::new(source, &target, config)?;
  Ok(mirror.run(cancel))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{CaptureRect, DisplayGeometry};
  use serial_test::serial;
  use std::io;
  use std::sync::atomic::AtomicUsize;
  use std::sync::Arc;
  use std::time::Instant;

  struct MockResource {
    width: u32,
    height: u32,
    released: Arc<AtomicUsize>,
  }

  impl CaptureResource for MockResource {
    fn width(&self) -> u32 {
      self.width
    }
    fn height(&self) -> u32 {
      self.height
    }
  }

  impl Drop for MockResource {
    fn drop(&mut self) {
      self.released.fetch_add(1, Ordering::Relaxed);
    }
  }

  #[derive(Clone)]
  struct MockSource {
    geometry: DisplayGeometry,
    created: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    snapshots: Arc<AtomicUsize>,
    fail_snapshot: bool,
    fill: u8,
    // set the flag once this many snapshots have been taken
    cancel_after: Option<(usize, Arc<AtomicBool>)>,
  }

  impl MockSource {
    fn new() -> Self {
      Self {
        geometry: DisplayGeometry {
          width: 1920,
          height: 1080,
          bits_per_pixel: 32,
          stride: 1920 * 4,
        },
        created: Arc::new(AtomicUsize::new(0)),
        released: Arc::new(AtomicUsize::new(0)),
        snapshots: Arc::new(AtomicUsize::new(0)),
        fail_snapshot: false,
        fill: 0xa5,
        cancel_after: None,
      }
    }

    fn cancel_after(mut self, cycles: usize, flag: Arc<AtomicBool>) -> Self {
      self.cancel_after = Some((cycles, flag));
      self
    }
  }

  impl DisplaySource for MockSource {
    type Resource = MockResource;

    fn geometry(&self) -> DisplayGeometry {
      self.geometry
    }

    fn create_resource(
      &self,
      _format: PixelFormat,
      width: u32,
      height: u32,
    ) -> Result<Self::Resource> {
      self.created.fetch_add(1, Ordering::Relaxed);
      Ok(MockResource {
        width,
        height,
        released: self.released.clone(),
      })
    }

    fn snapshot(&self, _resource: &mut Self::Resource) -> Result<()> {
      let taken = self.snapshots.fetch_add(1, Ordering::Relaxed) + 1;
      if let Some((cycles, flag)) = &self.cancel_after {
        if taken >= *cycles {
          flag.store(true, Ordering::Relaxed);
        }
      }
      if self.fail_snapshot {
        Err(Error::SnapshotFailed { code: -1 })
      } else {
        Ok(())
      }
    }

    fn read_rect(
      &self,
      _resource: &Self::Resource,
      rect: &CaptureRect,
      dest: &mut [u8],
      pitch: usize,
    ) -> Result<()> {
      assert!(dest.len() >= pitch * rect.height as usize);
      for row in 0..rect.height as usize {
        dest[row * pitch..(row + 1) * pitch].fill(self.fill);
      }
      Ok(())
    }
  }

  struct MockTarget {
    geometry: DisplayGeometry,
    mem_len: usize,
    fail_map: bool,
  }

  impl MockTarget {
    fn panel(width: u32, height: u32, bits_per_pixel: u32) -> Self {
      let stride = width * bits_per_pixel / 8;
      Self {
        geometry: DisplayGeometry {
          width,
          height,
          bits_per_pixel,
          stride,
        },
        mem_len: (stride * height) as usize,
        fail_map: false,
      }
    }
  }

  impl MirrorTarget for MockTarget {
    type Mapping = Vec<u8>;

    fn geometry(&self) -> DisplayGeometry {
      self.geometry
    }

    fn mem_len(&self) -> usize {
      self.mem_len
    }

    fn map(&self) -> Result<Vec<u8>> {
      if self.fail_map {
        Err(Error::MemoryMapFailed {
          len: self.mem_len,
          source: io::Error::from_raw_os_error(libc::ENOMEM),
        })
      } else {
        Ok(vec![0u8; self.mem_len])
      }
    }
  }

  fn config() -> MirrorConfig {
    MirrorConfig {
      frame_interval: Duration::from_millis(1),
      ..MirrorConfig::default()
    }
  }

  #[test]
  fn sizes_resource_from_target_geometry() {
    let source = MockSource::new();
    let created = source.created.clone();
    let mirror = Mirror::new(source, &MockTarget::panel(320, 240, 16), &config()).unwrap();

    assert_eq!(mirror.plan().width, 160);
    assert_eq!(mirror.plan().height, 240);
    assert_eq!(mirror.plan().pitch, 160);
    assert_eq!(created.load(Ordering::Relaxed), 1);
  }

  #[test]
  fn unsupported_depth_creates_no_resource() {
    let source = MockSource::new();
    let created = source.created.clone();
    let err = Mirror::new(source, &MockTarget::panel(320, 240, 12), &config()).unwrap_err();

    assert!(matches!(
      err,
      Error::UnsupportedPixelDepth { bits_per_pixel: 12 }
    ));
    assert_eq!(created.load(Ordering::Relaxed), 0);
  }

  #[test]
  fn map_failure_releases_resource() {
    let source = MockSource::new();
    let created = source.created.clone();
    let released = source.released.clone();

    let mut target = MockTarget::panel(320, 240, 16);
    target.fail_map = true;
    let err = Mirror::new(source, &target, &config()).unwrap_err();

    assert!(matches!(err, Error::MemoryMapFailed { .. }));
    assert_eq!(created.load(Ordering::Relaxed), 1);
    assert_eq!(released.load(Ordering::Relaxed), 1);
  }

  #[test]
  fn short_mapping_rejected() {
    let source = MockSource::new();
    let released = source.released.clone();

    let mut target = MockTarget::panel(320, 240, 16);
    target.mem_len = 100; // well below pitch * height
    let err = Mirror::new(source, &target, &config()).unwrap_err();

    assert!(matches!(err, Error::InvalidBufferLength));
    assert_eq!(released.load(Ordering::Relaxed), 1);
  }

  #[test]
  fn device_open_failure_creates_no_resource() {
    let source = MockSource::new();
    let created = source.created.clone();
    let cfg = MirrorConfig {
      device_path: "/dev/fb-does-not-exist".into(),
      ..config()
    };

    let err = run_mirror(|| Ok(source), &cfg, &AtomicBool::new(false)).unwrap_err();

    assert!(matches!(err, Error::DeviceUnavailable { .. }));
    assert_eq!(created.load(Ordering::Relaxed), 0);
  }

  #[test]
  fn primary_open_failure_runs_nothing() {
    let cfg = config();
    let err = run_mirror(
      || -> Result<MockSource> { Err(Error::DisplayUnavailable { index: 0 }) },
      &cfg,
      &AtomicBool::new(false),
    )
    .unwrap_err();

    assert!(matches!(err, Error::DisplayUnavailable { index: 0 }));
  }

  #[test]
  fn loop_writes_stay_inside_dest_len() {
    let cancel = Arc::new(AtomicBool::new(false));
    let source = MockSource::new().cancel_after(3, cancel.clone());
    let fill = source.fill;

    // leave slack beyond the written region to prove it stays untouched
    let mut target = MockTarget::panel(320, 240, 16);
    target.mem_len += 64;

    let mut mirror = Mirror::new(source, &target, &config()).unwrap();
    let stats = mirror.run(&cancel);
    assert_eq!(stats.cycles, 3);

    let dest_len = mirror.plan().dest_len();
    let mapped = mirror.mapped();
    assert!(mapped[..dest_len].iter().all(|&b| b == fill));
    assert!(mapped[dest_len..].iter().all(|&b| b == 0));
  }

  #[test]
  fn failures_are_counted_without_stopping() {
    let cancel = Arc::new(AtomicBool::new(false));
    let mut source = MockSource::new().cancel_after(5, cancel.clone());
    source.fail_snapshot = true;

    let mut mirror = Mirror::new(source, &MockTarget::panel(320, 240, 16), &config()).unwrap();
    let stats = mirror.run(&cancel);

    assert_eq!(stats.cycles, 5);
    assert_eq!(stats.snapshot_failures, 5);
    assert_eq!(stats.readback_failures, 0);
  }

  #[test]
  fn preset_cancel_runs_no_cycles() {
    let source = MockSource::new();
    let snapshots = source.snapshots.clone();

    let mut mirror = Mirror::new(source, &MockTarget::panel(320, 240, 16), &config()).unwrap();
    let stats = mirror.run(&AtomicBool::new(true));

    assert_eq!(stats, MirrorStats::default());
    assert_eq!(snapshots.load(Ordering::Relaxed), 0);
  }

  #[test]
  #[serial]
  fn loop_paces_with_fixed_interval() {
    const CYCLES: usize = 8;
    let interval = Duration::from_millis(5);

    let cancel = Arc::new(AtomicBool::new(false));
    let source = MockSource::new().cancel_after(CYCLES, cancel.clone());
    let cfg = MirrorConfig {
      frame_interval: interval,
      ..MirrorConfig::default()
    };

    let mut mirror = Mirror::new(source, &MockTarget::panel(320, 240, 16), &cfg).unwrap();
    let start = Instant::now();
    let stats = mirror.run(&cancel);
    let elapsed = start.elapsed();

    assert_eq!(stats.cycles, CYCLES as u64);
    // the sleep is appended unconditionally, so the lower bound is exact;
    // the upper bound is generous to tolerate scheduler jitter
    assert!(elapsed >= interval * CYCLES as u32);
    assert!(elapsed < interval * CYCLES as u32 + Duration::from_millis(200));
  }
}
