//! camsource：把线程亲和的相机 SDK 的 Live View 暴露为按时钟拉取的流媒体源
//!
//! - [`apartment::CommandSerializer`]：所有 SDK 调用都搬到同一个线程执行
//! - [`session::SessionController`]：会话生命周期、SDK 回调、帧统计
//! - [`pump::StreamPump`]：按参考时钟给下游填样本，协商 Buffer，处理流控

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod apartment;
pub mod pump;
pub mod session;

// Re-export 核心 crate，方便下游只依赖 camsource
pub use camsource_core;

/// 预置模块，用户可以通过 `use camsource::prelude::*;` 导入常用项
pub mod prelude {
    pub use crate::apartment::{CommandSerializer, SerializerState};
    pub use crate::pump::{PumpStats, StreamPump};
    pub use crate::session::SessionController;
    pub use camsource_core::prelude::*;
}
