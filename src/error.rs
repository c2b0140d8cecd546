use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised while bringing the mirror path up, plus the per-cycle
/// snapshot/readback codes the steady-state loop counts instead of
/// propagating.
#[derive(Debug, Error)]
pub enum Error {
  #[error("unable to open primary display {index}")]
  DisplayUnavailable { index: u32 },

  #[error("unable to read primary display info (code {code})")]
  DisplayInfoUnavailable { code: i32 },

  #[error("unable to open secondary device {}: {source}", path.display())]
  DeviceUnavailable { path: PathBuf, source: io::Error },

  #[error("{op} failed on secondary device: {source}")]
  DeviceInfoUnavailable { op: &'static str, source: io::Error },

  #[error("unsupported secondary pixel depth: {bits_per_pixel}bpp")]
  UnsupportedPixelDepth { bits_per_pixel: u32 },

  #[error("unable to create {width}x{height} capture resource")]
  ResourceCreateFailed { width: u32, height: u32 },

  #[error("unable to map {len} bytes of device memory: {source}")]
  MemoryMapFailed { len: usize, source: io::Error },

  #[error("invalid buffer length")]
  InvalidBufferLength,

  #[error("snapshot failed (code {code})")]
  SnapshotFailed { code: i32 },

  #[error("readback failed (code {code})")]
  ReadbackFailed { code: i32 },
}

impl Error {
  /// Create a new [`Error::DeviceInfoUnavailable`] from a failed ioctl.
  #[inline]
  pub(crate) fn device_info(op: &'static str, errno: nix::errno::Errno) -> Self {
    Self::DeviceInfoUnavailable {
      op,
      source: io::Error::from_raw_os_error(errno as i32),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::Error;
  use std::io;
  use std::path::PathBuf;

  #[test]
  fn format_error() {
    assert_eq!(
      format!("{}", Error::DisplayUnavailable { index: 0 }),
      "unable to open primary display 0"
    );

    assert_eq!(
      format!(
        "{}",
        Error::DeviceUnavailable {
          path: PathBuf::from("/dev/fb1"),
          source: io::Error::from_raw_os_error(libc::ENOENT),
        }
      ),
      "unable to open secondary device /dev/fb1: No such file or directory (os error 2)"
    );

    assert_eq!(
      format!("{}", Error::UnsupportedPixelDepth { bits_per_pixel: 12 }),
      "unsupported secondary pixel depth: 12bpp"
    );

    assert_eq!(
      format!("{}", Error::InvalidBufferLength),
      "invalid buffer length"
    );
  }
}
