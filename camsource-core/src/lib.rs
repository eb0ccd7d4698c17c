// 开启一些 Clippy 检查，保证代码质量
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

// 模块定义
pub mod config;
pub mod error;
pub mod frame;
pub mod media;
pub mod pixel_format;
pub mod sample;
pub mod stream;
pub mod telemetry;
pub mod time;
pub mod traits;

// 方便用户使用的 Prelude
pub mod prelude {
    pub use crate::config::{CameraSelector, SourceConfig};
    pub use crate::error::{NegotiationFailure, Result, SourceError};
    pub use crate::frame::{Frame, FrameGeometry, RawImage};
    pub use crate::media::{MediaType, StreamCaps};
    pub use crate::pixel_format::PixelFormat;
    pub use crate::sample::{
        AllocatorProperties, AllocatorRequest, HeapAllocator, MediaSample, MemAllocator,
        SampleFlags,
    };
    pub use crate::stream::{FillOutcome, StreamEvent, StreamInfo, StreamInfoFlags};
    pub use crate::telemetry::{FrameStats, StatsSnapshot};
    pub use crate::time::{MediaTime, ReferenceClock, SystemClock};
    pub use crate::traits::{
        BufferNegotiation, CameraInfo, CameraSdk, FrameSource, MediaTypeProvider, SampleSource,
        SdkEvent, StreamCueable,
    };
}

// 版本与构建信息常量
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
