use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camsource_core::frame::{Frame, FrameGeometry};
use camsource_core::traits::FrameSource;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 由测试直接喂帧的 [`FrameSource`]
///
/// 与会话控制器的约定一致：未开启转发时推进来的帧只更新几何信息，不进入最新帧槽位；
/// 关闭转发时清空槽位。
#[derive(Debug, Default)]
pub struct ScriptedSource {
    latest: Mutex<Option<Frame>>,
    geometry: Mutex<Option<FrameGeometry>>,
    fps: Mutex<f64>,
    streaming: AtomicBool,
}

impl ScriptedSource {
    /// 还没有任何帧
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 已知几何与帧率，像是相机已经在出图
    pub fn with_feed(geometry: FrameGeometry, fps: f64) -> Arc<Self> {
        let source = Self::default();
        *lock(&source.geometry) = Some(geometry);
        *lock(&source.fps) = fps;
        Arc::new(source)
    }

    /// 推入一帧；返回是否进入了最新帧槽位
    pub fn push(&self, frame: Frame) -> bool {
        *lock(&self.geometry) = Some(frame.geometry());
        if !self.is_streaming() {
            return false;
        }
        *lock(&self.latest) = Some(frame);
        true
    }

    pub fn set_fps(&self, fps: f64) {
        *lock(&self.fps) = fps;
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// 槽位里是否有尚未被取走的帧
    pub fn has_pending(&self) -> bool {
        lock(&self.latest).is_some()
    }
}

impl FrameSource for ScriptedSource {
    fn take_latest(&self) -> Option<Frame> {
        lock(&self.latest).take()
    }

    fn geometry(&self) -> Option<FrameGeometry> {
        *lock(&self.geometry)
    }

    fn measured_fps(&self) -> f64 {
        *lock(&self.fps)
    }

    fn set_streaming(&self, on: bool) {
        self.streaming.store(on, Ordering::Release);
        if !on {
            lock(&self.latest).take();
        }
    }
}
