use camsource_core::config::SourceConfig;
use camsource_core::error::Result;
use camsource_core::frame::FrameGeometry;
use camsource_core::media::{MediaType, StreamCaps};
use camsource_core::time::MediaTime;

/// 候选媒体类型目录
///
/// 第 0 项为自然格式 (实时几何 + 测得帧率)，之后是按 granularity 递增的固定尺寸。
#[derive(Debug, Clone)]
pub struct MediaCatalog {
    caps: StreamCaps,
    default_geometry: FrameGeometry,
    fallback_interval: MediaTime,
    format_count: u32,
}

impl MediaCatalog {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            caps: config.stream_caps(),
            default_geometry: config.default_geometry,
            fallback_interval: config.fallback_interval(),
            format_count: config.format_count,
        }
    }

    pub fn caps(&self) -> StreamCaps {
        self.caps
    }

    /// 候选总数 (含第 0 项)
    pub fn count(&self) -> usize {
        self.format_count as usize + 1
    }

    /// 自然格式：还没有帧时用默认几何；FPS 为 0 时用回退帧率；帧间隔钳制到 caps 范围
    pub fn natural(&self, live: Option<FrameGeometry>, measured_fps: f64) -> Result<MediaType> {
        let geometry = live.unwrap_or(self.default_geometry);
        let interval = MediaTime::per_frame(measured_fps)
            .unwrap_or(self.fallback_interval)
            .clamp(self.caps.min_frame_interval, self.caps.max_frame_interval);
        MediaType::video(geometry, interval)
    }

    /// 第 `position` 个候选；`first` 为第 0 项
    pub fn candidate(&self, position: usize, first: MediaType) -> Result<Option<MediaType>> {
        if position == 0 {
            return Ok(Some(first));
        }
        if position >= self.count() {
            return Ok(None);
        }
        let (width, height) = self.caps.size_at(position as u32 - 1);
        let geometry = FrameGeometry::new(width, height, first.bit_count());
        MediaType::video(geometry, first.avg_time_per_frame).map(Some)
    }

    /// 校验；与实时几何一致的尺寸总是可接受
    pub fn check(&self, mt: &MediaType, live: Option<FrameGeometry>) -> Result<()> {
        if live == Some(mt.geometry()) {
            let exact = StreamCaps {
                min_output_size: (mt.width, mt.height),
                max_output_size: (mt.width, mt.height),
                ..self.caps
            };
            return exact.validate(mt);
        }
        self.caps.validate(mt)
    }
}
