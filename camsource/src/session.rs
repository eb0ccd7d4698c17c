//! 相机会话管理
//!
//! `SessionController` 是会话的唯一所有者：通过 CommandSerializer 打开/关闭会话，
//! 处理 SDK 回调 (热插拔、关机、新帧)，维护帧统计和 "最新帧" 槽位。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camsource_core::config::{CameraSelector, SourceConfig};
use camsource_core::error::{Result, SourceError};
use camsource_core::frame::{Frame, FrameGeometry, RawImage};
use camsource_core::pixel_format::PixelFormat;
use camsource_core::telemetry::{ErrorNotice, ErrorReporter, FrameStats, StatsSnapshot};
use camsource_core::traits::{CameraInfo, CameraSdk, FrameSource, SdkEvent, SubscriptionId};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

use crate::apartment::CommandSerializer;

/// 每个帧订阅者的通道容量；订阅者跟不上时丢帧
const SUBSCRIBER_CAPACITY: usize = 2;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct ControllerInner {
    sdk: Arc<dyn CameraSdk>,
    serializer: Arc<CommandSerializer>,
    config: SourceConfig,

    /// 最新帧槽位：回调路径写，Pump 拉取路径读并清空
    latest: Mutex<Option<Frame>>,
    stats: Mutex<FrameStats>,
    streaming: AtomicBool,
    sequence: AtomicU64,
    subscribers: Mutex<Vec<Sender<Frame>>>,

    camera: Mutex<Option<CameraInfo>>,
    subscription: Mutex<Option<SubscriptionId>>,

    errors: ErrorReporter,
    last_error: Mutex<Option<String>>,
}

impl ControllerInner {
    /// 关旧会话与开新会话是同一条命令，其他打开者插不进中间
    fn open_session(&self, selector: CameraSelector) -> Result<Option<CameraInfo>> {
        let sdk = Arc::clone(&self.sdk);
        // 外层错误：旧会话没关掉，状态不变
        let opened = self.serializer.run(move || {
            shut_down(&*sdk)?;
            Ok(start_up(&*sdk, &selector))
        })?;

        self.forget_session();
        let opened = opened?;
        if let Some(camera) = &opened {
            tracing::info!(
                target: "camsource::session",
                "Session opened: {} ({})",
                camera.name,
                camera.port
            );
        }
        *lock(&self.camera) = opened.clone();
        Ok(opened)
    }

    fn close_session(&self) -> Result<()> {
        let sdk = Arc::clone(&self.sdk);
        self.serializer.run(move || shut_down(&*sdk))?;
        self.forget_session();
        Ok(())
    }

    fn forget_session(&self) {
        if let Some(camera) = lock(&self.camera).take() {
            tracing::info!(target: "camsource::session", "Session closed: {}", camera.name);
        }
        lock(&self.latest).take();
    }

    fn on_sdk_event(&self, event: SdkEvent) {
        match event {
            SdkEvent::FrameUpdated(raw) => self.on_frame(raw),
            SdkEvent::DeviceAdded => {
                tracing::info!(target: "camsource::session", "Camera added, reopening session");
                if let Err(e) = self.open_session(self.config.camera.clone()) {
                    self.record_failure("reopen after device added", &e);
                }
            }
            SdkEvent::DeviceShutdown => {
                tracing::info!(target: "camsource::session", "Camera shut down, closing session");
                if let Err(e) = self.close_session() {
                    self.record_failure("close after device shutdown", &e);
                }
            }
            SdkEvent::ProgressChanged(p) => {
                tracing::debug!(target: "camsource::session", "SDK progress {}%", p);
            }
        }
    }

    fn on_frame(&self, raw: RawImage) {
        let frame = match decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.record_failure("frame decode", &e);
                return;
            }
        };

        let now = Instant::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = frame.with_sequence(seq).with_arrival(now);
        lock(&self.stats).record(frame.geometry(), frame.image_size(), now);

        // 持槽位锁判断，set_streaming(false) 之后不会再有帧落进来
        let mut latest = lock(&self.latest);
        // 未激活：只计数，不转发
        if !self.streaming.load(Ordering::Acquire) {
            tracing::trace!(target: "camsource::session", "Frame #{} dropped, not streaming", seq);
            return;
        }

        lock(&self.subscribers).retain(|tx| match tx.try_send(frame.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        *latest = Some(frame);
    }

    fn record_failure(&self, context: &'static str, err: &SourceError) {
        *lock(&self.last_error) = Some(format!("{}: {}", context, err));

        let report = self.errors.report();
        match report.notice() {
            ErrorNotice::Show => {
                tracing::error!(target: "camsource::session", "{} failed: {}", context, err)
            }
            ErrorNotice::ManyErrors => tracing::error!(
                target: "camsource::session",
                "{} failed: {}; many errors happened, suppressing the rest",
                context,
                err
            ),
            ErrorNotice::Suppressed => {
                tracing::debug!(target: "camsource::session", "{} failed: {}", context, err)
            }
        }
    }

    fn tick_stats(&self, now: Instant) {
        lock(&self.stats).tick(now);
    }
}

/// 停 Live View 并关会话；只在 Worker 线程上调用
fn shut_down(sdk: &dyn CameraSdk) -> Result<()> {
    if sdk.is_live_view_on() {
        sdk.stop_live_view()?;
    }
    sdk.close_session()
}

/// 枚举、挑选、打开并开始 Live View；只在 Worker 线程上调用
fn start_up(sdk: &dyn CameraSdk, selector: &CameraSelector) -> Result<Option<CameraInfo>> {
    let cameras = sdk.list_cameras()?;
    let Some(camera) = selector.pick(&cameras) else {
        tracing::info!(
            target: "camsource::session",
            "No camera matches {:?} ({} found)",
            selector,
            cameras.len()
        );
        return Ok(None);
    };

    sdk.open_session(&camera)?;
    if let Err(e) = sdk.start_live_view() {
        // 不留下半开的会话
        let _ = sdk.close_session();
        return Err(e);
    }
    Ok(Some(camera))
}

/// 把 SDK 给的原始图像变成 32 位 BGRA 帧
fn decode(raw: RawImage) -> Result<Frame> {
    match raw {
        RawImage::Decoded(frame) => Ok(frame),
        RawImage::Encoded(bytes) => {
            let img = image::load_from_memory(&bytes)
                .map_err(|e| SourceError::Decode(e.to_string()))?;
            let mut bgra = img.to_rgba8();
            let (width, height) = bgra.dimensions();
            for px in bgra.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
            Frame::new(width, height, PixelFormat::Rgb32, bgra.into_raw())
        }
    }
}

/// 周期刷新瞬时 FPS 的后台线程
#[derive(Debug)]
struct StatsTicker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatsTicker {
    fn spawn(inner: Weak<ControllerInner>, interval: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let ticks = crossbeam_channel::tick(interval.max(Duration::from_millis(1)));

        let handle = thread::Builder::new()
            .name("camsource-stats".into())
            .spawn(move || loop {
                select! {
                    recv(ticks) -> _ => match inner.upgrade() {
                        Some(inner) => inner.tick_stats(Instant::now()),
                        None => break,
                    },
                    recv(shutdown_rx) -> _ => break,
                }
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for StatsTicker {
    fn drop(&mut self) {
        // 断开通道即通知线程退出
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// 相机会话控制器
#[derive(Debug)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
    _ticker: StatsTicker,
}

impl SessionController {
    pub fn new(
        sdk: Arc<dyn CameraSdk>,
        serializer: Arc<CommandSerializer>,
        config: SourceConfig,
    ) -> Result<Self> {
        let inner = Arc::new(ControllerInner {
            sdk,
            serializer,
            errors: ErrorReporter::new(config.error_notice_threshold),
            latest: Mutex::new(None),
            stats: Mutex::new(FrameStats::new()),
            streaming: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
            camera: Mutex::new(None),
            subscription: Mutex::new(None),
            last_error: Mutex::new(None),
            config,
        });
        let ticker = StatsTicker::spawn(Arc::downgrade(&inner), inner.config.stats_interval)?;

        Ok(Self {
            inner,
            _ticker: ticker,
        })
    }

    /// 注册 SDK 观察者并打开会话；重复调用不会重复注册
    pub fn initialize(&self) -> Result<Option<CameraInfo>> {
        {
            let mut subscription = lock(&self.inner.subscription);
            if subscription.is_none() {
                let weak = Arc::downgrade(&self.inner);
                let id = self.inner.sdk.subscribe(Arc::new(move |event| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_sdk_event(event);
                    }
                }));
                *subscription = Some(id);
            }
        }
        self.open_session()
    }

    /// 注销观察者并关闭会话
    pub fn terminate(&self) -> Result<()> {
        if let Some(id) = lock(&self.inner.subscription).take() {
            self.inner.sdk.unsubscribe(id);
        }
        self.stop_streaming();
        self.inner.close_session()
    }

    /// 关闭已有会话，按配置选择相机打开新会话并开启 Live View
    ///
    /// 没有相机时返回 `Ok(None)`。
    pub fn open_session(&self) -> Result<Option<CameraInfo>> {
        self.inner.open_session(self.inner.config.camera.clone())
    }

    pub fn open_session_with(&self, selector: CameraSelector) -> Result<Option<CameraInfo>> {
        self.inner.open_session(selector)
    }

    pub fn close_session(&self) -> Result<()> {
        self.inner.close_session()
    }

    /// SDK 事件入口 (观察者回调也走这里)
    pub fn on_sdk_event(&self, event: SdkEvent) {
        self.inner.on_sdk_event(event);
    }

    pub fn start_streaming(&self) {
        self.set_streaming(true);
    }

    pub fn stop_streaming(&self) {
        self.set_streaming(false);
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.streaming.load(Ordering::Acquire)
    }

    /// 订阅转发出去的帧
    pub fn subscribe(&self) -> Receiver<Frame> {
        let (tx, rx) = bounded(SUBSCRIBER_CAPACITY);
        lock(&self.inner.subscribers).push(tx);
        rx
    }

    /// 手动刷新 FPS 窗口 (后台 ticker 也会周期调用)
    pub fn tick_stats(&self, now: Instant) {
        self.inner.tick_stats(now);
    }

    pub fn fps(&self) -> f64 {
        lock(&self.inner.stats).fps()
    }

    pub fn average_fps(&self) -> f64 {
        lock(&self.inner.stats).average_fps(Instant::now())
    }

    /// 码率 (byte/s)
    pub fn bitrate(&self) -> f64 {
        lock(&self.inner.stats).bitrate(Instant::now())
    }

    pub fn stats(&self) -> StatsSnapshot {
        lock(&self.inner.stats).snapshot(Instant::now())
    }

    pub fn current_camera(&self) -> Option<CameraInfo> {
        lock(&self.inner.camera).clone()
    }

    pub fn config(&self) -> &SourceConfig {
        &self.inner.config
    }

    /// 事件处理中发生过的错误总数
    pub fn error_count(&self) -> u64 {
        self.inner.errors.total()
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }
}

impl FrameSource for SessionController {
    fn take_latest(&self) -> Option<Frame> {
        lock(&self.inner.latest).take()
    }

    fn geometry(&self) -> Option<FrameGeometry> {
        lock(&self.inner.stats).geometry()
    }

    fn measured_fps(&self) -> f64 {
        self.fps()
    }

    fn set_streaming(&self, on: bool) {
        let was = {
            let mut latest = lock(&self.inner.latest);
            if !on {
                latest.take();
            }
            self.inner.streaming.swap(on, Ordering::AcqRel)
        };
        if was != on {
            tracing::info!(
                target: "camsource::session",
                "Frame forwarding {}",
                if on { "started" } else { "stopped" }
            );
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if lock(&self.inner.subscription).is_some() {
            if let Err(e) = self.terminate() {
                tracing::debug!(target: "camsource::session", "Teardown close failed: {}", e);
            }
        }
    }
}
