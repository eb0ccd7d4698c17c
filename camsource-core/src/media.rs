use crate::error::{Result, SourceError};
use crate::frame::FrameGeometry;
use crate::pixel_format::PixelFormat;
use crate::time::MediaTime;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// 输出端的媒体类型 (未压缩视频)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct MediaType {
    pub subtype: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// 标称帧间隔 (100ns)
    pub avg_time_per_frame: MediaTime,
    /// 每个样本的字节数，至少等于图像大小
    pub sample_size: usize,
    pub fixed_size_samples: bool,
    pub temporal_compression: bool,
}

impl MediaType {
    /// 由几何信息和帧间隔构造；位深决定 subtype
    pub fn video(geometry: FrameGeometry, avg_time_per_frame: MediaTime) -> Result<Self> {
        let subtype = PixelFormat::from_bit_depth(geometry.bit_depth).ok_or_else(|| {
            SourceError::InvalidMediaType(format!(
                "unsupported bit depth {}",
                geometry.bit_depth
            ))
        })?;

        Ok(Self {
            subtype,
            width: geometry.width,
            height: geometry.height,
            avg_time_per_frame,
            sample_size: geometry.image_size(),
            fixed_size_samples: true,
            temporal_compression: false,
        })
    }

    pub fn bit_count(&self) -> u16 {
        self.subtype.bits_per_pixel()
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height, self.bit_count())
    }

    pub fn image_size(&self) -> usize {
        self.geometry().image_size()
    }

    pub fn fps(&self) -> f64 {
        self.avg_time_per_frame.as_fps()
    }

    /// 标称码率 (bit/s)
    pub fn bitrate(&self) -> u64 {
        (self.image_size() as f64 * 8.0 * self.fps()) as u64
    }
}

/// 输出能力范围 (IAMStreamConfig 的 caps)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct StreamCaps {
    pub min_output_size: (u32, u32),
    pub max_output_size: (u32, u32),
    pub output_granularity: (u32, u32),
    pub min_frame_interval: MediaTime,
    pub max_frame_interval: MediaTime,
    pub bit_depth: u16,
}

impl StreamCaps {
    /// 第 `index` 个候选尺寸 (从 0 起)
    pub fn size_at(&self, index: u32) -> (u32, u32) {
        (
            self.min_output_size.0 + self.output_granularity.0 * index,
            self.min_output_size.1 + self.output_granularity.1 * index,
        )
    }

    pub fn contains_size(&self, width: u32, height: u32) -> bool {
        (self.min_output_size.0..=self.max_output_size.0).contains(&width)
            && (self.min_output_size.1..=self.max_output_size.1).contains(&height)
    }

    pub fn contains_interval(&self, interval: MediaTime) -> bool {
        (self.min_frame_interval..=self.max_frame_interval).contains(&interval)
    }

    pub fn min_bitrate(&self) -> u64 {
        let (w, h) = self.min_output_size;
        let fps = self.max_frame_interval.as_fps();
        (f64::from(w) * f64::from(h) * f64::from(self.bit_depth) * fps) as u64
    }

    pub fn max_bitrate(&self) -> u64 {
        let (w, h) = self.max_output_size;
        let fps = self.min_frame_interval.as_fps();
        (f64::from(w) * f64::from(h) * f64::from(self.bit_depth) * fps) as u64
    }

    /// 校验一个媒体类型是否落在能力范围内
    ///
    /// 只接受 RGB24 / RGB32；尺寸、帧间隔必须在范围内；样本不得小于图像。
    pub fn validate(&self, mt: &MediaType) -> Result<()> {
        if !self.contains_size(mt.width, mt.height) {
            return Err(SourceError::InvalidMediaType(format!(
                "{}x{} outside {:?}..={:?}",
                mt.width, mt.height, self.min_output_size, self.max_output_size
            )));
        }
        if !self.contains_interval(mt.avg_time_per_frame) {
            return Err(SourceError::InvalidMediaType(format!(
                "frame interval {:?} outside {:?}..={:?}",
                mt.avg_time_per_frame, self.min_frame_interval, self.max_frame_interval
            )));
        }
        if mt.sample_size < mt.image_size() {
            return Err(SourceError::InvalidMediaType(format!(
                "sample size {} below image size {}",
                mt.sample_size,
                mt.image_size()
            )));
        }
        if mt.temporal_compression {
            return Err(SourceError::InvalidMediaType(
                "compressed output is not supported".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> StreamCaps {
        StreamCaps {
            min_output_size: (320, 240),
            max_output_size: (1440, 1080),
            output_granularity: (160, 120),
            min_frame_interval: MediaTime(MediaTime::UNITS / 30),
            max_frame_interval: MediaTime(MediaTime::UNITS),
            bit_depth: 32,
        }
    }

    #[test]
    fn test_video_type_from_geometry() {
        let mt = MediaType::video(FrameGeometry::new(640, 480, 24), MediaTime(400_000)).unwrap();
        assert_eq!(mt.subtype, PixelFormat::Rgb24);
        assert_eq!(mt.sample_size, 640 * 480 * 3);
        assert!((mt.fps() - 25.0).abs() < 1e-9);
        assert!(MediaType::video(FrameGeometry::new(640, 480, 16), MediaTime(400_000)).is_err());
    }

    #[test]
    fn test_caps_candidates_and_validation() {
        let caps = caps();
        assert_eq!(caps.size_at(0), (320, 240));
        assert_eq!(caps.size_at(7), (1440, 1080));

        let ok = MediaType::video(FrameGeometry::new(1024, 756, 32), MediaTime(500_000)).unwrap();
        assert!(caps.validate(&ok).is_ok());

        let too_fast = MediaType {
            avg_time_per_frame: MediaTime(MediaTime::UNITS / 60),
            ..ok
        };
        assert!(caps.validate(&too_fast).is_err());

        let too_small = MediaType { sample_size: 10, ..ok };
        assert!(caps.validate(&too_small).is_err());

        let tiny = MediaType::video(FrameGeometry::new(160, 120, 32), MediaTime(500_000)).unwrap();
        assert!(caps.validate(&tiny).is_err());
    }

    #[test]
    fn test_caps_bitrates() {
        let caps = caps();
        assert_eq!(caps.min_bitrate(), 320 * 240 * 32);
        assert!(caps.max_bitrate() > caps.min_bitrate());
    }
}
