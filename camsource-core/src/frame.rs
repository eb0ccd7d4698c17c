use std::sync::Arc;
use std::time::Instant;

use crate::error::{Result, SourceError};
use crate::pixel_format::PixelFormat;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// 帧几何信息：宽、高、位深
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u16,
}

impl FrameGeometry {
    pub const fn new(width: u32, height: u32, bit_depth: u16) -> Self {
        Self {
            width,
            height,
            bit_depth,
        }
    }

    /// 紧密排列时的图像字节数：w * h * bpp / 8
    pub fn image_size(&self) -> usize {
        self.width as usize * self.height as usize * usize::from(self.bit_depth) / 8
    }

    pub fn stride(&self) -> usize {
        self.width as usize * usize::from(self.bit_depth) / 8
    }
}

/// 核心帧结构体
///
/// 交付后不可变。像素数据以 `Arc<[u8]>` 共享，clone 即快照，
/// Pump 拿到的快照与 SDK 回调线程随后写入的新帧互不影响。
#[derive(Debug, Clone)]
pub struct Frame {
    /// 图像宽度 (Pixels)
    pub width: u32,

    /// 图像高度 (Pixels)
    pub height: u32,

    /// 跨距 (Bytes per line)
    pub stride: usize,

    pub format: PixelFormat,

    /// 帧序号，由 SessionController 在到达时分配
    pub sequence: u64,

    /// 到达用户态的时刻
    pub arrived_at: Instant,

    data: Arc<[u8]>,
}

impl Frame {
    /// 以紧密排列 (stride = width * bpp / 8) 创建帧
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let stride = width as usize * format.bytes_per_pixel();
        Self::with_stride(width, height, stride, format, data)
    }

    pub fn with_stride(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<Self> {
        let data = data.into();
        if width == 0 || height == 0 {
            return Err(SourceError::InvalidFrame(format!(
                "empty geometry {}x{}",
                width, height
            )));
        }
        let min_stride = width as usize * format.bytes_per_pixel();
        if stride < min_stride {
            return Err(SourceError::InvalidFrame(format!(
                "stride {} shorter than a {}-pixel row ({} bytes)",
                stride, width, min_stride
            )));
        }
        let required = stride * height as usize;
        if data.len() < required {
            return Err(SourceError::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} {} needs {}",
                data.len(),
                width,
                height,
                format,
                required
            )));
        }

        Ok(Self {
            width,
            height,
            stride,
            format,
            sequence: 0,
            arrived_at: Instant::now(),
            data,
        })
    }

    /// 由强类型像素 (如 `[u8; 4]`、`u32`) 构造，经 bytemuck 转为字节
    pub fn from_pixels<P: bytemuck::Pod>(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: &[P],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(pixels);
        Self::new(width, height, format, bytes)
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_arrival(mut self, at: Instant) -> Self {
        self.arrived_at = at;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bit_depth(&self) -> u16 {
        self.format.bits_per_pixel()
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height, self.bit_depth())
    }

    /// 图像有效字节数 (stride * height)
    pub fn image_size(&self) -> usize {
        self.stride * self.height as usize
    }
}

/// SDK 帧回调交付的原始图像
#[derive(Debug, Clone)]
pub enum RawImage {
    /// 编码后的 Live View 图像 (JPEG / PNG / BMP)
    Encoded(Arc<[u8]>),
    /// 已解码的位图
    Decoded(Frame),
}
