use crate::{
  CaptureRect, CaptureResource, DisplayGeometry, DisplaySource, Error, PixelFormat, Result,
};
use std::sync::Once;
use tracing::info;

#[allow(non_camel_case_types)]
mod ffi {
  use libc::{c_int, c_uint, c_void};

  pub type DISPMANX_DISPLAY_HANDLE_T = u32;
  pub type DISPMANX_RESOURCE_HANDLE_T = u32;

  pub const VC_IMAGE_RGB565: c_uint = 1;
  pub const VC_IMAGE_RGB888: c_uint = 5;
  pub const VC_IMAGE_RGBA32: c_uint = 15;

  #[repr(C)]
  pub struct VC_RECT_T {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
  }

  #[repr(C)]
  pub struct DISPMANX_MODEINFO_T {
    pub width: i32,
    pub height: i32,
    pub transform: c_uint,
    pub input_format: c_uint,
    pub display_num: u32,
  }

  #[link(name = "bcm_host")]
  extern "C" {
    pub fn bcm_host_init();
    pub fn vc_dispmanx_display_open(device: u32) -> DISPMANX_DISPLAY_HANDLE_T;
    pub fn vc_dispmanx_display_close(display: DISPMANX_DISPLAY_HANDLE_T) -> c_int;
    pub fn vc_dispmanx_display_get_info(
      display: DISPMANX_DISPLAY_HANDLE_T,
      pinfo: *mut DISPMANX_MODEINFO_T,
    ) -> c_int;
    pub fn vc_dispmanx_resource_create(
      type_: c_uint,
      width: u32,
      height: u32,
      native_image_handle: *mut u32,
    ) -> DISPMANX_RESOURCE_HANDLE_T;
    pub fn vc_dispmanx_resource_delete(res: DISPMANX_RESOURCE_HANDLE_T) -> c_int;
    pub fn vc_dispmanx_snapshot(
      display: DISPMANX_DISPLAY_HANDLE_T,
      snapshot_resource: DISPMANX_RESOURCE_HANDLE_T,
      transform: c_uint,
    ) -> c_int;
    pub fn vc_dispmanx_resource_read_data(
      res: DISPMANX_RESOURCE_HANDLE_T,
      rect: *const VC_RECT_T,
      dst_address: *mut c_void,
      dst_pitch: u32,
    ) -> c_int;
  }
}

static HOST_INIT: Once = Once::new();

const fn vc_image_type(format: PixelFormat) -> libc::c_uint {
  match format {
    PixelFormat::Rgb565 => ffi::VC_IMAGE_RGB565,
    PixelFormat::Rgb888 => ffi::VC_IMAGE_RGB888,
    PixelFormat::Xrgb8888 => ffi::VC_IMAGE_RGBA32,
  }
}

/// An off-screen buffer in VideoCore memory. Deleted on drop.
pub struct DispmanxResource {
  handle: ffi::DISPMANX_RESOURCE_HANDLE_T,
  width: u32,
  height: u32,
}

impl CaptureResource for DispmanxResource {
  #[inline]
  fn width(&self) -> u32 {
    self.width
  }

  #[inline]
  fn height(&self) -> u32 {
    self.height
  }
}

impl Drop for DispmanxResource {
  fn drop(&mut self) {
    unsafe { ffi::vc_dispmanx_resource_delete(self.handle) };
  }
}

/// Handle to the primary display, opened through the VideoCore display
/// stack. Closed on drop.
pub struct DispmanxDisplay {
  handle: ffi::DISPMANX_DISPLAY_HANDLE_T,
  geometry: DisplayGeometry,
}

impl DispmanxDisplay {
  /// Open display `index` and query its mode. Logs the geometry on
  /// success.
  pub fn open(index: u32) -> Result<Self> {
    HOST_INIT.call_once(|| unsafe { ffi::bcm_host_init() });

    let handle = unsafe { ffi::vc_dispmanx_display_open(index) };
    if handle == 0 {
      return Err(Error::DisplayUnavailable { index });
    }

    let mut info: ffi::DISPMANX_MODEINFO_T = unsafe { std::mem::zeroed() };
    let code = unsafe { ffi::vc_dispmanx_display_get_info(handle, &mut info) };
    if code != 0 {
      unsafe { ffi::vc_dispmanx_display_close(handle) };
      return Err(Error::DisplayInfoUnavailable { code });
    }

    info!("primary display is {} x {}", info.width, info.height);

    Ok(Self {
      handle,
      geometry: DisplayGeometry {
        width: info.width as u32,
        height: info.height as u32,
        // nominal scanout format; the mode query does not report depth
        bits_per_pixel: 32,
        stride: info.width as u32 * 4,
      },
    })
  }
}

impl DisplaySource for DispmanxDisplay {
  type Resource = DispmanxResource;

  #[inline]
  fn geometry(&self) -> DisplayGeometry {
    self.geometry
  }

  fn create_resource(
    &self,
    format: PixelFormat,
    width: u32,
    height: u32,
  ) -> Result<DispmanxResource> {
    let mut native_image_handle = 0u32;
    let handle = unsafe {
      ffi::vc_dispmanx_resource_create(
        vc_image_type(format),
        width,
        height,
        &mut native_image_handle,
      )
    };
    if handle == 0 {
      return Err(Error::ResourceCreateFailed { width, height });
    }
    Ok(DispmanxResource {
      handle,
      width,
      height,
    })
  }

  fn snapshot(&self, resource: &mut DispmanxResource) -> Result<()> {
    // transform 0: the capture is written as-is
    let code = unsafe { ffi::vc_dispmanx_snapshot(self.handle, resource.handle, 0) };
    if code != 0 {
      return Err(Error::SnapshotFailed { code });
    }
    Ok(())
  }

  fn read_rect(
    &self,
    resource: &DispmanxResource,
    rect: &CaptureRect,
    dest: &mut [u8],
    pitch: usize,
  ) -> Result<()> {
    let vc_rect = ffi::VC_RECT_T {
      x: rect.x as i32,
      y: rect.y as i32,
      width: rect.width as i32,
      height: rect.height as i32,
    };
    let code = unsafe {
      ffi::vc_dispmanx_resource_read_data(
        resource.handle,
        &vc_rect,
        dest.as_mut_ptr() as *mut libc::c_void,
        pitch as u32,
      )
    };
    if code != 0 {
      return Err(Error::ReadbackFailed { code });
    }
    Ok(())
  }
}

impl Drop for DispmanxDisplay {
  fn drop(&mut self) {
    unsafe { ffi::vc_dispmanx_display_close(self.handle) };
  }
}
