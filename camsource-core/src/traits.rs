use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::frame::{Frame, FrameGeometry, RawImage};
use crate::media::{MediaType, StreamCaps};
use crate::sample::{AllocatorProperties, AllocatorRequest, MediaSample, MemAllocator};
use crate::stream::{FillOutcome, PushSourceFlags, StreamInfo};
use crate::time::MediaTime;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// 相机基本信息
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct CameraInfo {
    /// 对用户友好的显示名称 (e.g. "Canon EOS R6")
    pub name: String,

    /// SDK 报告的端口/设备 ID
    pub port: String,
}

/// SDK 回调事件
///
/// 事件在 SDK 自己的回调线程上到达，不在亲和线程上。
#[derive(Debug, Clone)]
pub enum SdkEvent {
    /// Live View 有新图像
    FrameUpdated(RawImage),
    /// 有相机接入 (热插拔)
    DeviceAdded,
    /// 当前相机断开或关机
    DeviceShutdown,
    /// 长操作进度 (0-100)
    ProgressChanged(u8),
}

/// SDK 事件观察者
pub type SdkObserver = Arc<dyn Fn(SdkEvent) + Send + Sync>;

/// 观察者注册句柄，用于注销
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

// --- 上游：厂商 SDK ---

/// 厂商相机 SDK (外部协作者)
///
/// 线程亲和：除 `subscribe` / `unsubscribe` 外的所有调用都必须在同一个
/// 线程上发出，调用方通过 CommandSerializer 保证这一点。
pub trait CameraSdk: Send + Sync + fmt::Debug {
    fn list_cameras(&self) -> Result<Vec<CameraInfo>>;

    fn open_session(&self, camera: &CameraInfo) -> Result<()>;

    /// 关闭会话；没有打开的会话时应返回 Ok
    fn close_session(&self) -> Result<()>;

    fn start_live_view(&self) -> Result<()>;

    fn stop_live_view(&self) -> Result<()>;

    fn is_live_view_on(&self) -> bool;

    /// 注册事件观察者
    fn subscribe(&self, observer: SdkObserver) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Pump 读取最新帧的来源
///
/// "最新帧" 槽位只由 SDK 回调路径写入，只由 Pump 的拉取路径读取并清空。
pub trait FrameSource: Send + Sync {
    /// 取走最新帧 (读后清空)；没有新帧时返回 None
    fn take_latest(&self) -> Option<Frame>;

    /// 最近一帧的几何信息
    fn geometry(&self) -> Option<FrameGeometry>;

    /// 测得的瞬时 FPS，未知时为 0
    fn measured_fps(&self) -> f64;

    /// 开关帧转发 (Pump 激活/停用时调用)
    fn set_streaming(&self, on: bool);
}

// --- 下游：四个能力接口 ---

/// 媒体类型协商
pub trait MediaTypeProvider {
    /// 第 `position` 个候选格式；越界返回 `Ok(None)`
    fn media_type(&self, position: usize) -> Result<Option<MediaType>>;

    fn check_media_type(&self, mt: &MediaType) -> Result<()>;

    /// 替换输出格式 (停用状态下)
    fn set_format(&self, mt: MediaType) -> Result<()>;

    /// 当前格式的标称帧间隔
    fn latency(&self) -> MediaTime;

    fn stream_caps(&self) -> StreamCaps;
}

/// 分配器协商
pub trait BufferNegotiation {
    /// 连接前提出分配建议
    fn suggest_allocator_properties(&self, request: AllocatorRequest) -> Result<()>;

    /// 已接受的建议，否则为自然需求
    fn allocator_properties(&self) -> Result<AllocatorProperties>;

    /// 与下游分配器确定最终属性
    fn decide_buffer_size(
        &self,
        allocator: &dyn MemAllocator,
        requested: AllocatorRequest,
    ) -> Result<AllocatorProperties>;
}

/// 拉取样本
pub trait SampleSource {
    fn fill_buffer(&self, sample: &mut MediaSample) -> Result<FillOutcome>;
}

/// 流控与 Stream Offset
pub trait StreamCueable {
    /// `None` 清除 start-at
    fn start_at(&self, at: Option<MediaTime>, cookie: u32);

    /// `None` 清除 stop-at；`send_extra` 为 true 时到点后再投递一个样本
    fn stop_at(&self, at: Option<MediaTime>, send_extra: bool, cookie: u32);

    fn stream_info(&self) -> StreamInfo;

    fn stream_offset(&self) -> MediaTime;

    fn set_stream_offset(&self, offset: MediaTime);

    fn max_stream_offset(&self) -> MediaTime;

    fn set_max_stream_offset(&self, max: MediaTime) -> Result<()>;

    fn push_source_flags(&self) -> PushSourceFlags;

    fn set_push_source_flags(&self, flags: PushSourceFlags) -> Result<()>;
}
