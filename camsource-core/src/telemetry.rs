use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::frame::FrameGeometry;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Live View 帧统计
///
/// - `record`：每帧到达时调用
/// - `tick`：周期 (通常 1 秒) 调用，刷新瞬时 FPS
///
/// 瞬时 FPS = 上一个 tick 窗口内的帧数 / 窗口时长。第一个窗口从第一帧开始计时。
/// 平均 FPS = 总帧数 / 自第一帧起的时长，码率 = 平均每帧字节 * 平均 FPS。
#[derive(Clone, Default)]
pub struct FrameStats {
    frames: u64,
    bytes: u64,
    first_frame: Option<Instant>,
    window_start: Option<Instant>,
    window_frames: u32,
    fps: f64,
    geometry: Option<FrameGeometry>,
}

impl fmt::Debug for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameStats")
            .field("frames", &self.frames)
            .field("bytes", &self.bytes)
            .field("fps", &self.fps)
            .field("geometry", &self.geometry)
            .finish()
    }
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一帧
    pub fn record(&mut self, geometry: FrameGeometry, bytes: usize, at: Instant) {
        if self.first_frame.is_none() {
            self.first_frame = Some(at);
            self.window_start = Some(at);
        }
        self.frames += 1;
        self.bytes += bytes as u64;
        self.window_frames += 1;
        self.geometry = Some(geometry);
    }

    /// 关闭当前窗口并刷新瞬时 FPS
    pub fn tick(&mut self, now: Instant) {
        let Some(start) = self.window_start else {
            return;
        };
        let elapsed = now.saturating_duration_since(start);
        if elapsed.is_zero() {
            return;
        }
        self.fps = f64::from(self.window_frames) / elapsed.as_secs_f64();
        self.window_frames = 0;
        self.window_start = Some(now);
    }

    /// 瞬时 FPS (最近一个 tick 窗口)
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// 自第一帧以来的时长
    pub fn duration(&self, now: Instant) -> Duration {
        self.first_frame
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default()
    }

    pub fn average_fps(&self, now: Instant) -> f64 {
        let secs = self.duration(now).as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    /// 码率 (byte/s)
    pub fn bitrate(&self, now: Instant) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        (self.bytes as f64 / self.frames as f64) * self.average_fps(now)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    pub fn snapshot(&self, now: Instant) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames,
            bytes: self.bytes,
            fps: self.fps,
            average_fps: self.average_fps(now),
            bitrate: self.bitrate(now),
            duration_secs: self.duration(now).as_secs_f64(),
            width: self.geometry.map(|g| g.width),
            height: self.geometry.map(|g| g.height),
            bit_depth: self.geometry.map(|g| g.bit_depth),
        }
    }
}

/// 统计快照，可序列化导出
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct StatsSnapshot {
    pub frames: u64,
    pub bytes: u64,
    pub fps: f64,
    pub average_fps: f64,
    /// byte/s
    pub bitrate: f64,
    pub duration_secs: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bit_depth: Option<u16>,
}

#[cfg(feature = "serialize")]
impl StatsSnapshot {
    /// 导出为 JSON，用于诊断面板
    pub fn export_state(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// 错误上报的呈现决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorNotice {
    /// 正常展示这条错误
    Show,
    /// 同时发生的错误达到阈值，只展示一次 "many errors"
    ManyErrors,
    /// 超过阈值，静默
    Suppressed,
}

/// 错误节流器
///
/// 统计 "同时在处理" 的错误数。前 `threshold - 1` 个正常展示，第 `threshold` 个
/// 给出一次汇总提示，其余静默。`report` 返回的 guard 析构时计数回落。
#[derive(Debug)]
pub struct ErrorReporter {
    in_flight: AtomicU32,
    total: AtomicU64,
    threshold: u32,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl ErrorReporter {
    pub fn new(threshold: u32) -> Self {
        Self {
            in_flight: AtomicU32::new(0),
            total: AtomicU64::new(0),
            threshold: threshold.max(1),
        }
    }

    pub fn report(&self) -> ErrorReport<'_> {
        self.total.fetch_add(1, Ordering::Relaxed);
        let count = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        let notice = if count < self.threshold {
            ErrorNotice::Show
        } else if count == self.threshold {
            ErrorNotice::ManyErrors
        } else {
            ErrorNotice::Suppressed
        };
        ErrorReport {
            reporter: self,
            notice,
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// 一次错误上报；drop 时结束
#[derive(Debug)]
pub struct ErrorReport<'a> {
    reporter: &'a ErrorReporter,
    notice: ErrorNotice,
}

impl ErrorReport<'_> {
    pub fn notice(&self) -> ErrorNotice {
        self.notice
    }
}

impl Drop for ErrorReport<'_> {
    fn drop(&mut self) {
        self.reporter.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
