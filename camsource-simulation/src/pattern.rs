use camsource_core::error::Result;
use camsource_core::frame::{Frame, RawImage};
use camsource_core::pixel_format::PixelFormat;

/// 图像内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// 单色 (B, G, R, A)
    Solid([u8; 4]),
    /// 8 条竖直彩条
    ColorBars,
    /// 水平灰度渐变
    Gradient,
}

const BARS: [[u8; 4]; 8] = [
    [255, 255, 255, 255],
    [0, 255, 255, 255],
    [255, 255, 0, 255],
    [0, 255, 0, 255],
    [255, 0, 255, 255],
    [0, 0, 255, 255],
    [255, 0, 0, 255],
    [0, 0, 0, 255],
];

/// 合成帧生成器
///
/// 每帧第一个像素的第一个字节写入帧序号的低 8 位 (见 [`frame_tag`])，
/// 方便测试分辨样本里装的是哪一帧。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePattern {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pattern: Pattern,
}

impl FramePattern {
    /// 32 位彩条
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgb32,
            pattern: Pattern::ColorBars,
        }
    }

    pub fn format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    fn pixel(&self, x: u32) -> [u8; 4] {
        match self.pattern {
            Pattern::Solid(px) => px,
            Pattern::ColorBars => {
                let bar = (x as usize * BARS.len()) / self.width.max(1) as usize;
                BARS[bar.min(BARS.len() - 1)]
            }
            Pattern::Gradient => {
                let v = ((x as u64 * 255) / u64::from(self.width.saturating_sub(1).max(1))) as u8;
                [v, v, v, 255]
            }
        }
    }

    /// 第 `index` 帧
    pub fn frame(&self, index: u64) -> Result<Frame> {
        let row: Vec<[u8; 4]> = (0..self.width).map(|x| self.pixel(x)).collect();
        let tag = index as u8;

        let frame = match self.format {
            PixelFormat::Rgb32 => {
                let mut pixels = row.repeat(self.height as usize);
                if let Some(first) = pixels.first_mut() {
                    first[0] = tag;
                }
                Frame::from_pixels(self.width, self.height, self.format, &pixels)?
            }
            PixelFormat::Rgb24 => {
                let row: Vec<[u8; 3]> = row.iter().map(|p| [p[0], p[1], p[2]]).collect();
                let mut pixels = row.repeat(self.height as usize);
                if let Some(first) = pixels.first_mut() {
                    first[0] = tag;
                }
                Frame::from_pixels(self.width, self.height, self.format, &pixels)?
            }
        };
        Ok(frame.with_sequence(index))
    }

    /// 第 `index` 帧，以 SDK 回调的形式
    pub fn raw(&self, index: u64) -> Result<RawImage> {
        self.frame(index).map(RawImage::Decoded)
    }
}

/// 读出 [`FramePattern`] 写进去的帧序号标记
pub fn frame_tag(data: &[u8]) -> Option<u8> {
    data.first().copied()
}
