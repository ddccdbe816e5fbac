use crate::error::PlatformError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoBackend {
    #[default]
    Software,
    OpenGL,
}

/// A rendering context bound to the window.
pub trait VideoContext: Send {
    fn backend(&self) -> VideoBackend;

    /// Adapts the context to a new client size.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), PlatformError>;

    /// Shows the finished frame. With vsync on, this waits for the next
    /// refresh.
    fn present(&mut self) -> Result<(), PlatformError>;

    fn vsync(&self) -> bool;
    fn set_vsync(&mut self, enabled: bool) -> Result<(), PlatformError>;

    /// CPU-side pixels, for contexts that have them.
    fn backbuffer_mut(&mut self) -> Option<&mut BackBuffer>;
}

/// 32-bit pixels (0xAARRGGBB), row-major, `stride` bytes per row.
#[derive(Clone, Debug)]
pub struct BackBuffer {
    pixels: Vec<u32>,
    width: u32,
    height: u32,
    stride: usize,
}

impl BackBuffer {
    pub fn new(width: u32, height: u32) -> Result<Self, PlatformError> {
        let len = Self::pixel_count(width, height)?;
        Ok(Self { pixels: vec![0; len], width, height, stride: width as usize * 4 })
    }

    fn pixel_count(width: u32, height: u32) -> Result<usize, PlatformError> {
        if width == 0 || height == 0 {
            return Err(PlatformError::InvalidConfiguration(format!(
                "backbuffer {}x{} must be non-zero",
                width, height
            )));
        }
        (width as usize)
            .checked_mul(height as usize)
            .filter(|n| n.checked_mul(4).is_some())
            .ok_or(PlatformError::OutOfMemory { requested: usize::MAX })
    }

    /// Reallocates to the new size. Contents are cleared.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), PlatformError> {
        let len = Self::pixel_count(width, height)?;
        self.pixels.clear();
        self.pixels.resize(len, 0);
        self.width = width;
        self.height = height;
        self.stride = width as usize * 4;
        debug!("Backbuffer resized to {}x{}", width, height);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u32]> {
        if y >= self.height {
            return None;
        }
        let w = self.width as usize;
        let start = y as usize * w;
        Some(&mut self.pixels[start..start + w])
    }

    pub fn clear(&mut self, color: u32) {
        self.pixels.fill(color);
    }
}

/// Refresh interval the software context paces to when vsync is on.
pub const SOFTWARE_REFRESH: Duration = Duration::from_micros(16_667);

/// CPU-rendered context: the application draws into the backbuffer and
/// `present` hands it to the window.
#[derive(Debug)]
pub struct SoftwareContext {
    buffer: BackBuffer,
    frames_presented: u64,
    vsync: bool,
    last_present: Option<Instant>,
}

impl SoftwareContext {
    pub fn new(width: u32, height: u32) -> Result<Self, PlatformError> {
        Ok(Self { buffer: BackBuffer::new(width, height)?, frames_presented: 0, vsync: false, last_present: None })
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn backbuffer(&self) -> &BackBuffer {
        &self.buffer
    }
}

impl VideoContext for SoftwareContext {
    fn backend(&self) -> VideoBackend {
        VideoBackend::Software
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), PlatformError> {
        self.buffer.resize(width, height)
    }

    fn present(&mut self) -> Result<(), PlatformError> {
        if self.vsync {
            if let Some(next) = self.last_present.map(|at| at + SOFTWARE_REFRESH) {
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                }
            }
        }
        self.last_present = Some(Instant::now());
        self.frames_presented += 1;
        Ok(())
    }

    fn vsync(&self) -> bool {
        self.vsync
    }

    fn set_vsync(&mut self, enabled: bool) -> Result<(), PlatformError> {
        debug!("Software video: vsync {}", if enabled { "on" } else { "off" });
        self.vsync = enabled;
        Ok(())
    }

    fn backbuffer_mut(&mut self) -> Option<&mut BackBuffer> {
        Some(&mut self.buffer)
    }
}
