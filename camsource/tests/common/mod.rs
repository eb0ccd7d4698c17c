#![allow(dead_code)]

use std::sync::Arc;

use camsource::prelude::*;
use camsource_simulation::{FramePattern, ScriptedSource, SteppingClock};

/// VGA 32 位 30 fps
pub const VGA: FrameGeometry = FrameGeometry::new(640, 480, 32);
pub const VGA_BYTES: usize = 1_228_800;
pub const LATENCY: MediaTime = MediaTime(333_333);

pub fn l(n: i64) -> MediaTime {
    LATENCY * n
}

/// 已连接 (自然格式) 的 Pump 及其帧源
pub fn connected_pump() -> (Arc<ScriptedSource>, StreamPump) {
    let source = ScriptedSource::with_feed(VGA, 30.0);
    let pump = StreamPump::new(source.clone(), &SourceConfig::new());
    let natural = pump
        .media_type(0)
        .expect("natural media type")
        .expect("position 0 exists");
    pump.connect(natural).expect("connect");
    (source, pump)
}

/// 已连接、已激活、Buffer 已协商，返回一个可用的样本
pub fn running_pump() -> (Arc<ScriptedSource>, Arc<SteppingClock>, StreamPump, MediaSample) {
    let (source, pump) = connected_pump();
    let allocator = HeapAllocator::new();
    pump.decide_buffer_size(&allocator, AllocatorRequest::new())
        .expect("decide buffer size");
    let sample = allocator.get_buffer().expect("buffer");

    let clock = SteppingClock::new();
    pump.activate(clock.clone()).expect("activate");
    (source, clock, pump, sample)
}

pub fn pull(pump: &StreamPump, sample: &mut MediaSample) -> (MediaTime, MediaTime) {
    assert_eq!(
        pump.fill_buffer(sample).expect("fill"),
        FillOutcome::Delivered
    );
    sample.time().expect("delivered samples are stamped")
}

pub fn vga_frame(index: u64) -> Frame {
    FramePattern::new(VGA.width, VGA.height)
        .frame(index)
        .expect("pattern frame")
}
