use crate::buffer::Buffer;
use crate::types::VideoFormat;

/// Planes of a planar pixel format. Also used to index plane offset and
/// stride tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoPlane {
    Y = 0,
    U = 1,
    V = 2,
}

pub const MAX_PLANES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorRange {
    Invalid,
    Limited,
    Full,
    Derived,
}

/// Color descriptor per ISO 23001-8:2016 section 7; value 2 means
/// "unspecified".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorSpace {
    pub primaries: u8,
    pub transfer: u8,
    pub matrix: u8,
    pub range: ColorRange,
}

impl Default for ColorSpace {
    fn default() -> Self {
        Self {
            primaries: 2,
            transfer: 2,
            matrix: 2,
            range: ColorRange::Invalid,
        }
    }
}

/// A decoded video frame. Pure data holder: real pixel interpretation is
/// the media pipeline's business, this type just carries the layout the
/// engine reported alongside the frame buffer.
#[derive(Default)]
pub struct VideoFrame {
    format: VideoFormat,
    width: u32,
    height: u32,
    buffer: Option<Box<dyn Buffer>>,
    plane_offsets: [u32; MAX_PLANES],
    strides: [u32; MAX_PLANES],
    timestamp: i64,
    color_space: ColorSpace,
}

impl VideoFrame {
    pub fn set_format(&mut self, format: VideoFormat) {
        self.format = format;
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn set_frame_buffer(&mut self, buffer: Box<dyn Buffer>) {
        self.buffer = Some(buffer);
    }

    pub fn frame_buffer(&self) -> Option<&dyn Buffer> {
        self.buffer.as_deref()
    }

    pub fn take_frame_buffer(&mut self) -> Option<Box<dyn Buffer>> {
        self.buffer.take()
    }

    pub fn set_plane_offset(&mut self, plane: VideoPlane, offset: u32) {
        self.plane_offsets[plane as usize] = offset;
    }

    pub fn plane_offset(&self, plane: VideoPlane) -> u32 {
        self.plane_offsets[plane as usize]
    }

    pub fn set_stride(&mut self, plane: VideoPlane, stride: u32) {
        self.strides[plane as usize] = stride;
    }

    pub fn stride(&self, plane: VideoPlane) -> u32 {
        self.strides[plane as usize]
    }

    /// Presentation timestamp in microseconds.
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn set_color_space(&mut self, color_space: ColorSpace) {
        self.color_space = color_space;
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }
}
