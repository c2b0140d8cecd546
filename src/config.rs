use std::path::PathBuf;
use std::time::Duration;

/// Fixed parameters of the mirror process.
///
/// There are no CLI flags, config files or environment variables; callers
/// construct this directly, usually via [`Default`].
#[derive(Debug, Clone)]
pub struct MirrorConfig {
  /// Index of the primary display to snapshot. Defaults to `0`.
  pub display_index: u32,
  /// Device node backing the secondary panel. Defaults to `/dev/fb1`.
  pub device_path: PathBuf,
  /// Delay appended after every capture cycle. Defaults to 25 ms, for a
  /// target cadence near 40 cycles per second.
  pub frame_interval: Duration,
  /// Divisor applied to the panel width when sizing the capture window.
  /// The default of `2` mirrors onto only the left half of the panel's
  /// native width.
  pub width_divisor: u32,
}

impl Default for MirrorConfig {
  fn default() -> Self {
    Self {
      display_index: 0,
      device_path: PathBuf::from("/dev/fb1"),
      frame_interval: Duration::from_millis(25),
      width_divisor: 2,
    }
  }
}
