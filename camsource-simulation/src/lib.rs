//! camsource 外部协作者的确定性替身
//!
//! - [`SimulatedSdk`]: 线程亲和的厂商 SDK，记录每次调用的线程，可注入错误
//! - [`ManualClock`] / [`SteppingClock`]: 手动推进的参考时钟
//! - [`FramePattern`]: 合成测试图像
//! - [`CappedAllocator`]: 只肯给出有限大小 Buffer 的分配器
//! - [`ScriptedSource`]: 由测试直接喂帧的帧源

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod allocator;
pub mod clock;
pub mod pattern;
pub mod sdk;
pub mod source;

pub use allocator::CappedAllocator;
pub use clock::{ManualClock, SteppingClock};
pub use pattern::{frame_tag, FramePattern, Pattern};
pub use sdk::{codes, SdkCall, SimulatedSdk};
pub use source::ScriptedSource;
