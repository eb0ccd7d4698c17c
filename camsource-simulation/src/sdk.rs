use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use camsource_core::error::{Result, SourceError};
use camsource_core::frame::RawImage;
use camsource_core::traits::{CameraInfo, CameraSdk, SdkEvent, SdkObserver, SubscriptionId};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::pattern::FramePattern;

/// 模拟 SDK 的错误码
pub mod codes {
    pub const DEVICE_NOT_FOUND: u32 = 0x0000_0080;
    pub const SESSION_NOT_OPEN: u32 = 0x0000_2003;
    /// 从非亲和线程调用
    pub const WRONG_THREAD: u32 = 0x0000_00A1;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 一次受亲和约束的 SDK 调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkCall {
    pub op: &'static str,
    pub thread: ThreadId,
}

#[derive(Debug, Default)]
struct SimState {
    cameras: Vec<CameraInfo>,
    /// 第一次调用所在的线程
    affinity: Option<ThreadId>,
    session: Option<CameraInfo>,
    live_view: bool,
    calls: Vec<SdkCall>,
    /// 一次性错误注入：op -> code
    failures: HashMap<&'static str, u32>,
    violations: u64,
    /// 当前未关闭的会话数，及其历史最大值
    open_sessions: u32,
    max_open_sessions: u32,
    list_delay: Duration,
}

/// 线程亲和的模拟相机 SDK
///
/// 第一次受约束的调用绑定线程；之后从其他线程发出的调用返回
/// [`codes::WRONG_THREAD`]。事件从调用 `emit` / `push_frame` 的线程同步派发，
/// 模拟 SDK 自己的回调线程。
pub struct SimulatedSdk {
    state: Mutex<SimState>,
    observers: Mutex<Vec<(SubscriptionId, SdkObserver)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for SimulatedSdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedSdk")
            .field("state", &*lock(&self.state))
            .field("observers", &lock(&self.observers).len())
            .finish()
    }
}

impl Default for SimulatedSdk {
    fn default() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl SimulatedSdk {
    /// 没有任何相机
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 预先接好若干相机
    pub fn with_cameras<I, S>(names: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sdk = Self::default();
        {
            let mut state = lock(&sdk.state);
            for name in names {
                let port = format!("usb:{:03}", state.cameras.len() + 1);
                state.cameras.push(CameraInfo {
                    name: name.into(),
                    port,
                });
            }
        }
        Arc::new(sdk)
    }

    // --- 测试控制 ---

    /// 插入一台相机并派发 `DeviceAdded`
    pub fn attach_camera(&self, name: impl Into<String>) -> CameraInfo {
        let camera = {
            let mut state = lock(&self.state);
            let camera = CameraInfo {
                name: name.into(),
                port: format!("usb:{:03}", state.cameras.len() + 1),
            };
            state.cameras.push(camera.clone());
            camera
        };
        tracing::debug!(target: "camsource::sim", "Camera attached: {}", camera.name);
        self.emit(SdkEvent::DeviceAdded);
        camera
    }

    /// 拔掉当前会话的相机并派发 `DeviceShutdown`
    pub fn shutdown_camera(&self) {
        {
            let mut state = lock(&self.state);
            if let Some(camera) = state.session.clone() {
                state.cameras.retain(|c| c != &camera);
            }
            state.live_view = false;
        }
        tracing::debug!(target: "camsource::sim", "Camera shut down");
        self.emit(SdkEvent::DeviceShutdown);
    }

    /// 之后每次 `list_cameras` 先睡 `delay`，拉大调用之间的竞争窗口
    pub fn slow_listing(&self, delay: Duration) {
        lock(&self.state).list_delay = delay;
    }

    /// 让下一次 `op` 调用失败
    pub fn fail_next(&self, op: &'static str, code: u32) {
        lock(&self.state).failures.insert(op, code);
    }

    /// 向所有观察者同步派发事件
    pub fn emit(&self, event: SdkEvent) {
        // 复制一份，派发时不持锁 (观察者可能回调 SDK)
        let observers: Vec<SdkObserver> = lock(&self.observers)
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer(event.clone());
        }
    }

    /// Live View 开启时派发一帧；返回是否派发
    pub fn push_frame(&self, image: RawImage) -> bool {
        if !lock(&self.state).live_view {
            return false;
        }
        self.emit(SdkEvent::FrameUpdated(image));
        true
    }

    /// 在独立的回调线程上按 `interval` 推送 `count` 帧
    ///
    /// `stop` 通道断开或收到消息时提前结束。返回实际派发的帧数。
    pub fn spawn_feed(
        self: &Arc<Self>,
        pattern: FramePattern,
        interval: Duration,
        count: u64,
    ) -> std::io::Result<(JoinHandle<u64>, Sender<()>)> {
        let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = bounded(1);
        let sdk = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("camsource-sim-feed".into())
            .spawn(move || {
                let mut delivered = 0;
                for index in 0..count {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    match pattern.raw(index) {
                        Ok(raw) => {
                            if sdk.push_frame(raw) {
                                delivered += 1;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(target: "camsource::sim", "Pattern failed: {}", e);
                            break;
                        }
                    }
                }
                delivered
            })?;
        Ok((handle, stop_tx))
    }

    // --- 观察 ---

    pub fn calls(&self) -> Vec<SdkCall> {
        lock(&self.state).calls.clone()
    }

    /// 非亲和线程上发生的调用次数
    pub fn affinity_violations(&self) -> u64 {
        lock(&self.state).violations
    }

    pub fn bound_thread(&self) -> Option<ThreadId> {
        lock(&self.state).affinity
    }

    pub fn session(&self) -> Option<CameraInfo> {
        lock(&self.state).session.clone()
    }

    /// 尚未关闭的 `open_session` 次数
    pub fn open_sessions(&self) -> u32 {
        lock(&self.state).open_sessions
    }

    /// 同时打开的会话数的历史最大值；正确的调用方不会超过 1
    pub fn max_open_sessions(&self) -> u32 {
        lock(&self.state).max_open_sessions
    }

    /// 不受亲和约束地查看 Live View 状态
    pub fn live_view_active(&self) -> bool {
        lock(&self.state).live_view
    }

    pub fn cameras(&self) -> Vec<CameraInfo> {
        lock(&self.state).cameras.clone()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// 记录调用并检查线程亲和与错误注入
    fn enter<'a>(&'a self, op: &'static str) -> (MutexGuard<'a, SimState>, Result<()>) {
        let mut state = lock(&self.state);
        let current = thread::current().id();
        state.calls.push(SdkCall {
            op,
            thread: current,
        });

        let bound = *state.affinity.get_or_insert(current);
        if bound != current {
            state.violations += 1;
            tracing::error!(target: "camsource::sim", "{} called off the affine thread", op);
            return (state, Err(SourceError::sdk(op, codes::WRONG_THREAD)));
        }
        if let Some(code) = state.failures.remove(op) {
            return (state, Err(SourceError::sdk(op, code)));
        }
        (state, Ok(()))
    }
}

impl CameraSdk for SimulatedSdk {
    fn list_cameras(&self) -> Result<Vec<CameraInfo>> {
        let delay = lock(&self.state).list_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let (state, entered) = self.enter("list_cameras");
        entered?;
        Ok(state.cameras.clone())
    }

    fn open_session(&self, camera: &CameraInfo) -> Result<()> {
        let (mut state, entered) = self.enter("open_session");
        entered?;
        if !state.cameras.contains(camera) {
            return Err(SourceError::sdk("open_session", codes::DEVICE_NOT_FOUND));
        }
        state.session = Some(camera.clone());
        state.open_sessions += 1;
        state.max_open_sessions = state.max_open_sessions.max(state.open_sessions);
        Ok(())
    }

    fn close_session(&self) -> Result<()> {
        let (mut state, entered) = self.enter("close_session");
        entered?;
        state.session = None;
        state.live_view = false;
        state.open_sessions = state.open_sessions.saturating_sub(1);
        Ok(())
    }

    fn start_live_view(&self) -> Result<()> {
        let (mut state, entered) = self.enter("start_live_view");
        entered?;
        if state.session.is_none() {
            return Err(SourceError::sdk("start_live_view", codes::SESSION_NOT_OPEN));
        }
        state.live_view = true;
        Ok(())
    }

    fn stop_live_view(&self) -> Result<()> {
        let (mut state, entered) = self.enter("stop_live_view");
        entered?;
        state.live_view = false;
        Ok(())
    }

    fn is_live_view_on(&self) -> bool {
        let (state, _) = self.enter("is_live_view_on");
        state.live_view
    }

    fn subscribe(&self, observer: SdkObserver) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.observers).push((id, observer));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.observers).retain(|(existing, _)| *existing != id);
    }
}
