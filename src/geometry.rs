/// Pixel encodings the capture path can produce.
///
/// The encoding is chosen to match the secondary device's bit depth, so the
/// readback needs no conversion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
  Rgb565,
  Rgb888,
  Xrgb8888,
}

impl PixelFormat {
  /// Map a framebuffer bit depth to the encoding with the same layout.
  /// Returns [`None`] for depths the mirror path cannot produce.
  #[inline]
  pub const fn from_bits_per_pixel(bits: u32) -> Option<Self> {
    match bits {
      16 => Some(Self::Rgb565),
      24 => Some(Self::Rgb888),
      32 => Some(Self::Xrgb8888),
      _ => None,
    }
  }

  #[inline]
  pub const fn bits_per_pixel(self) -> u32 {
    match self {
      Self::Rgb565 => 16,
      Self::Rgb888 => 24,
      Self::Xrgb8888 => 32,
    }
  }
}

/// Width, height and pixel layout of one display, fixed at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGeometry {
  pub width: u32,
  pub height: u32,
  pub bits_per_pixel: u32,
  /// Bytes per row.
  pub stride: u32,
}

/// Sub-region of the capture resource read back each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// Geometry negotiated between the two displays at startup: the capture
/// resource dimensions, the readback rectangle and the destination row
/// pitch. Never changes once computed.
///
/// A pitch that does not match the device's row layout shows up as skewed
/// output rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePlan {
  pub width: u32,
  pub height: u32,
  pub rect: CaptureRect,
  /// Bytes between row starts in the destination buffer.
  pub pitch: usize,
}

impl CapturePlan {
  /// Size the capture window from the secondary display's geometry: the
  /// width is divided by `width_divisor` (flooring), the height is kept.
  pub fn negotiate(device: &DisplayGeometry, width_divisor: u32) -> Self {
    let width = device.width / width_divisor.max(1);
    let height = device.height;
    // fractional halves truncate, matching the destination row layout
    let pitch = ((width as f64 / 2.0) * device.bits_per_pixel as f64 / 8.0) as usize;
    Self {
      width,
      height,
      rect: CaptureRect {
        x: 0,
        y: 0,
        width,
        height,
      },
      pitch,
    }
  }

  /// Bytes written into the destination per cycle.
  #[inline]
  pub const fn dest_len(&self) -> usize {
    self.pitch * self.height as usize
  }
}
