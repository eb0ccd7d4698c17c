use std::time::Duration;

use crate::frame::FrameGeometry;
use crate::media::StreamCaps;
use crate::time::MediaTime;
use crate::traits::CameraInfo;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// 打开会话时选择哪台相机
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum CameraSelector {
    /// 枚举结果中的第一台
    #[default]
    First,
    /// 按枚举顺序索引
    Index(usize),
    /// 按显示名称精确匹配
    Name(String),
}

impl CameraSelector {
    pub fn pick(&self, cameras: &[CameraInfo]) -> Option<CameraInfo> {
        match self {
            Self::First => cameras.first().cloned(),
            Self::Index(i) => cameras.get(*i).cloned(),
            Self::Name(name) => cameras.iter().find(|c| &c.name == name).cloned(),
        }
    }
}

/// 源的全部可调参数
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SourceConfig {
    pub camera: CameraSelector,
    /// 尚未收到任何帧时使用的几何信息
    pub default_geometry: FrameGeometry,
    /// 测得的 FPS 为 0 时使用的帧率
    pub fallback_fps: u32,
    pub min_fps: u32,
    pub max_fps: u32,
    /// 候选格式数量 (按 granularity 递增)
    pub format_count: u32,
    pub min_size: (u32, u32),
    pub granularity: (u32, u32),
    /// 单个样本时长超过 `latency * max_interval_multiple` 时钳制为一个 latency
    pub max_interval_multiple: i64,
    /// FPS 统计 tick 周期
    pub stats_interval: Duration,
    /// SDK 亲和线程的名称
    pub worker_name: String,
    /// 同时发生多少个错误后改为汇总提示
    pub error_notice_threshold: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceConfig {
    pub fn new() -> Self {
        Self {
            camera: CameraSelector::First,
            default_geometry: FrameGeometry::new(1024, 756, 32),
            fallback_fps: 15,
            min_fps: 1,
            max_fps: 30,
            format_count: 8,
            min_size: (320, 240),
            granularity: (160, 120),
            max_interval_multiple: 3,
            stats_interval: Duration::from_secs(1),
            worker_name: "camsource-sdk".to_string(),
            error_notice_threshold: 4,
        }
    }

    pub fn camera(mut self, selector: CameraSelector) -> Self {
        self.camera = selector;
        self
    }

    /// 设置默认几何信息
    pub fn default_geometry(mut self, width: u32, height: u32, bit_depth: u16) -> Self {
        self.default_geometry = FrameGeometry::new(width, height, bit_depth);
        self
    }

    pub fn fallback_fps(mut self, fps: u32) -> Self {
        self.fallback_fps = fps.max(1);
        self
    }

    /// 设置帧率范围 (闭区间)
    pub fn fps_range(mut self, min: u32, max: u32) -> Self {
        self.min_fps = min.max(1);
        self.max_fps = max.max(self.min_fps);
        self
    }

    pub fn format_steps(mut self, min_size: (u32, u32), granularity: (u32, u32), count: u32) -> Self {
        self.min_size = min_size;
        self.granularity = granularity;
        self.format_count = count;
        self
    }

    pub fn max_interval_multiple(mut self, multiple: i64) -> Self {
        self.max_interval_multiple = multiple.max(1);
        self
    }

    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    pub fn error_notice_threshold(mut self, threshold: u32) -> Self {
        self.error_notice_threshold = threshold;
        self
    }

    /// 由配置推导输出能力范围
    pub fn stream_caps(&self) -> StreamCaps {
        let last = self.format_count.saturating_sub(1);
        StreamCaps {
            min_output_size: self.min_size,
            max_output_size: (
                self.min_size.0 + self.granularity.0 * last,
                self.min_size.1 + self.granularity.1 * last,
            ),
            output_granularity: self.granularity,
            min_frame_interval: MediaTime(MediaTime::UNITS / i64::from(self.max_fps.max(1))),
            max_frame_interval: MediaTime(MediaTime::UNITS / i64::from(self.min_fps.max(1))),
            bit_depth: self.default_geometry.bit_depth,
        }
    }

    /// 回退帧率对应的帧间隔
    pub fn fallback_interval(&self) -> MediaTime {
        MediaTime(MediaTime::UNITS / i64::from(self.fallback_fps.max(1)))
    }
}
