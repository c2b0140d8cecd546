use crate::{CaptureRect, DisplayGeometry, PixelFormat, Result};
use std::ops::DerefMut;

/// An off-screen pixel buffer living in the capture subsystem's memory
/// domain. Dropping the resource releases its backing storage.
pub trait CaptureResource {
  fn width(&self) -> u32;
  fn height(&self) -> u32;
}

/// The subsystem that owns the primary display: it can snapshot the
/// display's current contents into a [`CaptureResource`] and copy pixel
/// data back out into host memory.
pub trait DisplaySource {
  type Resource: CaptureResource;

  /// Geometry of the primary display as reported at open time.
  fn geometry(&self) -> DisplayGeometry;

  /// Allocate an off-screen buffer of `width` x `height` pixels in the
  /// source's memory domain.
  fn create_resource(&self, format: PixelFormat, width: u32, height: u32)
    -> Result<Self::Resource>;

  /// Render the display's current contents into `resource`, with no
  /// transform applied. The previous contents are overwritten.
  fn snapshot(&self, resource: &mut Self::Resource) -> Result<()>;

  /// Copy the pixels inside `rect` from `resource` into `dest`, writing
  /// rows `pitch` bytes apart. A row writes at most `pitch` bytes, so the
  /// copy never touches more than `pitch * rect.height` bytes of `dest`.
  fn read_rect(
    &self,
    resource: &Self::Resource,
    rect: &CaptureRect,
    dest: &mut [u8],
    pitch: usize,
  ) -> Result<()>;
}

/// The secondary pixel-buffer device receiving mirrored frames. Its backing
/// memory can be mapped into the process once and written for the lifetime
/// of the mirror loop.
pub trait MirrorTarget {
  type Mapping: DerefMut<Target = [u8]>;

  /// Geometry of the device as reported at open time.
  fn geometry(&self) -> DisplayGeometry;

  /// Length in bytes of the device's backing memory.
  fn mem_len(&self) -> usize;

  /// Establish a shared read/write mapping of the backing memory. The
  /// mapping stays valid independently of `self` and is released when
  /// dropped.
  fn map(&self) -> Result<Self::Mapping>;
}
