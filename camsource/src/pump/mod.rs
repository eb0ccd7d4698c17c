//! 推流源：按参考时钟节拍把最新帧填进消费方的样本
//!
//! 每次拉取：
//! 1. 第一次拉取建立周期通知 (锚点 now + latency)，之后每次等待一个节拍
//! 2. 取最新帧快照拷入样本；没有新帧时重复旧帧，从未有帧时填零
//! 3. 用时钟流逝时间给样本打 `[start, stop)`；单样本时长超过 3 倍 latency 时钳制为 1 个 latency
//! 4. 减去 Stream Offset，负时间的样本丢弃重来
//! 5. start-at / stop-at 流控，通知各发一次

pub mod catalog;
pub mod cue;
pub mod negotiator;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camsource_core::config::SourceConfig;
use camsource_core::error::{Result, SourceError};
use camsource_core::frame::Frame;
use camsource_core::media::{MediaType, StreamCaps};
use camsource_core::sample::{
    AllocatorProperties, AllocatorRequest, MediaSample, MemAllocator, SampleFlags,
};
use camsource_core::stream::{FillOutcome, PushSourceFlags, StreamEvent, StreamInfo};
use camsource_core::time::{MediaTime, PeriodicAdvise, ReferenceClock};
use camsource_core::traits::{
    BufferNegotiation, FrameSource, MediaTypeProvider, SampleSource, StreamCueable,
};
use crossbeam_channel::{unbounded, Receiver, Sender};

use self::catalog::MediaCatalog;
use self::cue::{CueDecision, CueState};
use self::negotiator::BufferNegotiator;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 连接状态与当前格式
#[derive(Debug, Default)]
struct LinkState {
    /// connect / set_format 确定的格式；None 时使用自然格式
    format: Option<MediaType>,
    connected: bool,
}

/// 只有拉取线程使用的计时状态
#[derive(Debug, Default)]
struct TimingState {
    /// 上一个样本结束时的时钟读数
    clock_start: MediaTime,
    /// 最近一次拿到的帧，用于重复
    last_frame: Option<Frame>,
    geometry_warned: bool,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    stale: AtomicU64,
    zero_filled: AtomicU64,
    discarded: AtomicU64,
}

/// 拉取计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub delivered: u64,
    /// 没有新帧、重复上一帧的次数
    pub stale_repeats: u64,
    /// 从未收到帧、样本填零的次数
    pub zero_filled: u64,
    /// 因偏移或 start-at 被丢弃的样本数
    pub discarded: u64,
}

/// 推流源
pub struct StreamPump {
    source: Arc<dyn FrameSource>,
    catalog: MediaCatalog,
    max_interval_multiple: i64,

    link: Mutex<LinkState>,
    cues: Mutex<CueState>,
    negotiator: Mutex<BufferNegotiator>,

    clock: Mutex<Option<Arc<dyn ReferenceClock>>>,
    advise: Mutex<Option<Arc<dyn PeriodicAdvise>>>,
    timing: Mutex<TimingState>,
    /// 流位置：下一个样本的起始时间 (未减偏移)
    position: AtomicI64,
    active: AtomicBool,

    listeners: Mutex<Vec<Sender<StreamEvent>>>,
    counters: Counters,
}

impl std::fmt::Debug for StreamPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPump")
            .field("link", &*lock(&self.link))
            .field("active", &self.active.load(Ordering::Relaxed))
            .field("position", &MediaTime(self.position.load(Ordering::Relaxed)))
            .field("stats", &self.stats())
            .finish()
    }
}

impl StreamPump {
    pub fn new(source: Arc<dyn FrameSource>, config: &SourceConfig) -> Self {
        Self {
            source,
            catalog: MediaCatalog::new(config),
            max_interval_multiple: config.max_interval_multiple,
            link: Mutex::new(LinkState::default()),
            cues: Mutex::new(CueState::new()),
            negotiator: Mutex::new(BufferNegotiator::new()),
            clock: Mutex::new(None),
            advise: Mutex::new(None),
            timing: Mutex::new(TimingState::default()),
            position: AtomicI64::new(0),
            active: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    // --- 生命周期 ---

    /// 下游接入：确定输出格式
    pub fn connect(&self, mt: MediaType) -> Result<()> {
        self.check_media_type(&mt)?;

        let mut link = lock(&self.link);
        if link.connected {
            return Err(SourceError::AlreadyConnected);
        }
        // 连接前给出的分配建议必须对新格式仍然成立
        let natural = BufferNegotiator::natural_properties(&mt);
        lock(&self.negotiator).revalidate(&natural)?;

        link.format = Some(mt);
        link.connected = true;
        tracing::info!(
            target: "camsource::pump",
            "Connected: {}x{} {} @ {:.2} fps",
            mt.width,
            mt.height,
            mt.subtype,
            mt.fps()
        );
        Ok(())
    }

    pub fn disconnect(&self) {
        self.deactivate();
        let mut link = lock(&self.link);
        if link.connected {
            link.connected = false;
            lock(&self.negotiator).clear_granted();
            tracing::info!(target: "camsource::pump", "Disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).connected
    }

    /// 开始推流：绑定参考时钟，重置流位置与通知标记，打开帧转发
    pub fn activate(&self, clock: Arc<dyn ReferenceClock>) -> Result<()> {
        if !self.is_connected() {
            return Err(SourceError::NotConnected);
        }
        if self.active.load(Ordering::Acquire) {
            return Ok(());
        }

        *lock(&self.timing) = TimingState::default();
        self.position.store(0, Ordering::Release);
        lock(&self.cues).rearm();
        *lock(&self.clock) = Some(clock);

        self.source.set_streaming(true);
        self.active.store(true, Ordering::Release);
        tracing::info!(target: "camsource::pump", "Activated, latency {:?}", self.latency());
        Ok(())
    }

    /// 停止推流：取消时钟订阅 (唤醒阻塞中的拉取)，释放时钟，关闭帧转发
    pub fn deactivate(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(advise) = lock(&self.advise).take() {
            advise.cancel();
        }
        lock(&self.clock).take();
        self.source.set_streaming(false);

        // 等正在进行的拉取退出
        *lock(&self.timing) = TimingState::default();
        tracing::info!(target: "camsource::pump", "Deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 订阅流控事件
    pub fn subscribe_events(&self) -> Receiver<StreamEvent> {
        let (tx, rx) = unbounded();
        lock(&self.listeners).push(tx);
        rx
    }

    /// 分配器实际授予的属性
    pub fn granted_properties(&self) -> Option<AllocatorProperties> {
        lock(&self.negotiator).granted()
    }

    /// 候选格式数量
    pub fn media_type_count(&self) -> usize {
        self.catalog.count()
    }

    /// 当前流位置 (下一个样本的起始时间，未减偏移)
    pub fn position(&self) -> MediaTime {
        MediaTime(self.position.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> PumpStats {
        PumpStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            stale_repeats: self.counters.stale.load(Ordering::Relaxed),
            zero_filled: self.counters.zero_filled.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }

    // --- 内部 ---

    fn natural_format(&self) -> Result<MediaType> {
        self.catalog
            .natural(self.source.geometry(), self.source.measured_fps())
    }

    fn effective_format(&self, link: &LinkState) -> Result<MediaType> {
        match link.format {
            Some(mt) => Ok(mt),
            None => self.natural_format(),
        }
    }

    fn publish(&self, events: &[StreamEvent]) {
        if events.is_empty() {
            return;
        }
        let mut listeners = lock(&self.listeners);
        for event in events {
            tracing::debug!(target: "camsource::pump", "Stream event {:?}", event);
            listeners.retain(|tx| tx.send(*event).is_ok());
        }
    }

    /// 等待下一个节拍；第一次调用建立订阅并立即返回
    fn await_tick(
        &self,
        clock: &dyn ReferenceClock,
        timing: &mut TimingState,
        latency: MediaTime,
    ) -> Result<()> {
        let advise = {
            let mut slot = lock(&self.advise);
            if !self.active.load(Ordering::Acquire) {
                return Err(SourceError::Cancelled);
            }
            match slot.as_ref() {
                Some(advise) => Arc::clone(advise),
                None => {
                    timing.clock_start = clock.now();
                    *slot = Some(clock.advise_periodic(timing.clock_start + latency, latency)?);
                    return Ok(());
                }
            }
        };
        advise.wait()
    }

    /// 把最新帧 (或旧帧、或零) 写进样本数据区
    fn copy_frame(&self, timing: &mut TimingState, data: &mut [u8]) {
        match self.source.take_latest() {
            Some(frame) => timing.last_frame = Some(frame),
            None if timing.last_frame.is_some() => {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }

        let Some(frame) = timing.last_frame.as_ref() else {
            self.counters.zero_filled.fetch_add(1, Ordering::Relaxed);
            data.fill(0);
            return;
        };

        let n = frame.image_size().min(data.len());
        if n != data.len() && !timing.geometry_warned {
            timing.geometry_warned = true;
            tracing::warn!(
                target: "camsource::pump",
                "Frame #{} is {} bytes, sample holds {}; padding/truncating",
                frame.sequence,
                frame.image_size(),
                data.len()
            );
        }
        data[..n].copy_from_slice(&frame.data()[..n]);
        data[n..].fill(0);
    }
}

impl Drop for StreamPump {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl MediaTypeProvider for StreamPump {
    fn media_type(&self, position: usize) -> Result<Option<MediaType>> {
        let first = self.effective_format(&lock(&self.link))?;
        self.catalog.candidate(position, first)
    }

    fn check_media_type(&self, mt: &MediaType) -> Result<()> {
        self.catalog.check(mt, self.source.geometry())
    }

    fn set_format(&self, mt: MediaType) -> Result<()> {
        if self.is_active() {
            return Err(SourceError::WrongState("cannot change format while streaming"));
        }
        self.check_media_type(&mt)?;

        lock(&self.link).format = Some(mt);
        lock(&self.negotiator).reset();
        tracing::info!(
            target: "camsource::pump",
            "Format set to {}x{} {} @ {:.2} fps",
            mt.width,
            mt.height,
            mt.subtype,
            mt.fps()
        );
        Ok(())
    }

    fn latency(&self) -> MediaTime {
        let link = lock(&self.link);
        self.effective_format(&link)
            .map(|mt| mt.avg_time_per_frame)
            .ok()
            .filter(|l| *l > MediaTime::ZERO)
            .unwrap_or(MediaTime(MediaTime::UNITS / 30))
    }

    fn stream_caps(&self) -> StreamCaps {
        self.catalog.caps()
    }
}

impl BufferNegotiation for StreamPump {
    fn suggest_allocator_properties(&self, request: AllocatorRequest) -> Result<()> {
        let link = lock(&self.link);
        if link.connected {
            return Err(SourceError::AlreadyConnected);
        }
        let natural = BufferNegotiator::natural_properties(&self.effective_format(&link)?);
        let effective = lock(&self.negotiator).suggest(request, &natural)?;
        tracing::debug!(target: "camsource::pump", "Allocator suggestion accepted: {:?}", effective);
        Ok(())
    }

    fn allocator_properties(&self) -> Result<AllocatorProperties> {
        let link = lock(&self.link);
        let natural = BufferNegotiator::natural_properties(&self.effective_format(&link)?);
        Ok(lock(&self.negotiator).properties(&natural))
    }

    fn decide_buffer_size(
        &self,
        allocator: &dyn MemAllocator,
        requested: AllocatorRequest,
    ) -> Result<AllocatorProperties> {
        let format = {
            let link = lock(&self.link);
            match (link.connected, link.format) {
                (true, Some(mt)) => mt,
                _ => return Err(SourceError::NotConnected),
            }
        };
        let natural = BufferNegotiator::natural_properties(&format);

        let mut negotiator = lock(&self.negotiator);
        let request = negotiator.reconcile(requested, &natural);
        let granted = allocator.set_properties(&request)?;
        let granted = negotiator.verify(granted, &request)?;

        tracing::info!(
            target: "camsource::pump",
            "Buffers decided: {} x {} bytes (align {}, prefix {})",
            granted.buffers,
            granted.buffer_size,
            granted.align,
            granted.prefix
        );
        Ok(granted)
    }
}

impl SampleSource for StreamPump {
    fn fill_buffer(&self, sample: &mut MediaSample) -> Result<FillOutcome> {
        if !self.is_active() {
            return Err(SourceError::WrongState("pump is not active"));
        }

        let mut timing = lock(&self.timing);
        let clock = lock(&self.clock)
            .clone()
            .ok_or(SourceError::WrongState("no reference clock"))?;
        let latency = self.latency();
        let mut events = Vec::new();

        loop {
            // 1. 节拍
            self.await_tick(clock.as_ref(), &mut timing, latency)?;

            // 2. 拷贝帧
            self.copy_frame(&mut timing, sample.data_mut());

            // 3. 打时间戳：样本时长 = 时钟流逝，过长时钳制
            let mut clock_stop = clock.now();
            if latency > MediaTime::ZERO
                && clock_stop - timing.clock_start > latency * self.max_interval_multiple
            {
                tracing::debug!(
                    target: "camsource::pump",
                    "Stall of {:?} clamped to one latency",
                    clock_stop - timing.clock_start
                );
                clock_stop = timing.clock_start + latency;
            }
            let mut start = self.position();
            let mut stop = start + (clock_stop - timing.clock_start);
            self.position.store(stop.units(), Ordering::Release);
            timing.clock_start = clock_stop;

            // 4. 减去偏移
            let decision = {
                let mut cues = lock(&self.cues);
                start -= cues.offset();
                stop -= cues.offset();
                if start.is_negative() || stop.is_negative() {
                    CueDecision::Discard
                } else {
                    // 5. 流控
                    cues.evaluate(start, &mut events)
                }
            };
            self.publish(&events);
            events.clear();

            let final_sample = match decision {
                CueDecision::Deliver => false,
                CueDecision::DeliverFinal => true,
                CueDecision::Discard => {
                    self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                CueDecision::EndOfStream => {
                    tracing::debug!(target: "camsource::pump", "End of stream at {:?}", start);
                    return Ok(FillOutcome::EndOfStream);
                }
            };

            let mut flags = SampleFlags::SYNC_POINT;
            if final_sample {
                flags |= SampleFlags::FINAL;
            }
            sample.set_time(Some((start, stop)));
            sample.set_flags(flags);
            sample.set_actual_data_length(sample.size())?;
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            return Ok(FillOutcome::Delivered);
        }
    }
}

impl StreamCueable for StreamPump {
    fn start_at(&self, at: Option<MediaTime>, cookie: u32) {
        lock(&self.cues).set_start(at, cookie);
    }

    fn stop_at(&self, at: Option<MediaTime>, send_extra: bool, cookie: u32) {
        lock(&self.cues).set_stop(at, send_extra, cookie);
    }

    fn stream_info(&self) -> StreamInfo {
        lock(&self.cues).info(self.position())
    }

    fn stream_offset(&self) -> MediaTime {
        lock(&self.cues).offset()
    }

    fn set_stream_offset(&self, offset: MediaTime) {
        lock(&self.cues).set_offset(offset);
    }

    fn max_stream_offset(&self) -> MediaTime {
        let latency = self.latency();
        lock(&self.cues).max_offset(latency)
    }

    fn set_max_stream_offset(&self, max: MediaTime) -> Result<()> {
        lock(&self.cues).set_max_offset(max)
    }

    fn push_source_flags(&self) -> PushSourceFlags {
        PushSourceFlags::empty()
    }

    fn set_push_source_flags(&self, _flags: PushSourceFlags) -> Result<()> {
        Err(SourceError::Unsupported("push source flags"))
    }
}
