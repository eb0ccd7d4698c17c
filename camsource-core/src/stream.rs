use bitflags::bitflags;

use crate::time::MediaTime;

bitflags! {
    /// AM_STREAM_INFO 标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamInfoFlags: u32 {
        const START_DEFINED   = 1 << 0;
        const STOP_DEFINED    = 1 << 1;
        /// 当前位置尚未到达 start-at，样本被丢弃
        const DISCARDING      = 1 << 2;
        /// stop-at 后额外发送一个样本
        const STOP_SEND_EXTRA = 1 << 4;
    }
}

bitflags! {
    /// IAMPushSource 标志；本源不声明任何标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PushSourceFlags: u32 {
        const NOT_LIVE              = 1 << 0;
        const INTERNAL_RM           = 1 << 1;
        const PRIVATE_LENGTH        = 1 << 2;
        const FRAME_TIME_STAMPS     = 1 << 3;
    }
}

/// 流控状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamInfo {
    pub start: Option<MediaTime>,
    pub stop: Option<MediaTime>,
    pub start_cookie: u32,
    pub stop_cookie: u32,
    pub flags: StreamInfoFlags,
}

/// Pump 发给订阅者的流控事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    StreamControlStarted { cookie: u32 },
    StreamControlStopped { cookie: u32 },
}

/// 一次拉取的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// 样本已填充，可以投递
    Delivered,
    /// stop-at 已生效，流结束
    EndOfStream,
}
