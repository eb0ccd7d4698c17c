// camsource/examples/simulated_capture.rs
//
// 用模拟 SDK 跑一遍完整链路：会话 -> 协商 -> 按系统时钟拉取样本。
// 运行：RUST_LOG=camsource=debug cargo run --example simulated_capture

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use camsource::prelude::*;
use camsource_simulation::{FramePattern, SimulatedSdk};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // 1. 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== camsource simulated capture (v{}) ===", camsource::camsource_core::VERSION);

    // 2. 模拟相机与会话
    let config = SourceConfig::new().stats_interval(Duration::from_millis(250));
    let sdk = SimulatedSdk::with_cameras(["Simulated EOS"]);
    let serializer = CommandSerializer::spawn(config.worker_name.clone())?;
    let session = Arc::new(SessionController::new(
        sdk.clone(),
        serializer.clone(),
        config.clone(),
    )?);

    let camera = session
        .initialize()?
        .context("simulated SDK reported no camera")?;
    println!("Session opened on {} ({})", camera.name, camera.port);

    // 3. 开始出图 (~30 fps)，等统计窗口收敛
    let pattern = FramePattern::new(640, 480);
    let (feed, stop_feed) = sdk.spawn_feed(pattern, Duration::from_millis(33), u64::MAX)?;
    std::thread::sleep(Duration::from_millis(600));

    // 4. 协商格式与 Buffer
    let pump = StreamPump::new(session.clone(), &config);
    for i in 0..pump.media_type_count() {
        if let Some(mt) = pump.media_type(i)? {
            println!("  [{}] {}x{} {} @ {:.2} fps", i, mt.width, mt.height, mt.subtype, mt.fps());
        }
    }
    let natural = pump.media_type(0)?.context("no natural media type")?;
    pump.connect(natural)?;

    let allocator = HeapAllocator::new();
    let granted = pump.decide_buffer_size(&allocator, AllocatorRequest::new())?;
    println!("Buffers: {} x {} bytes", granted.buffers, granted.buffer_size);
    let mut sample = allocator.get_buffer()?;

    // 5. 拉取
    pump.activate(Arc::new(SystemClock::new()))?;
    for _ in 0..30 {
        match pump.fill_buffer(&mut sample)? {
            FillOutcome::Delivered => {
                if let Some((start, stop)) = sample.time() {
                    println!("sample [{:?}, {:?})", start, stop);
                }
            }
            FillOutcome::EndOfStream => break,
        }
    }
    pump.deactivate();

    // 6. 收尾
    drop(stop_feed);
    let pushed = feed.join().map_err(|_| anyhow::anyhow!("feed thread panicked"))?;
    println!("Pump: {:?}", pump.stats());
    println!("Frames pushed by the simulated camera: {}", pushed);
    println!("Camera stats: {:?}", session.stats());

    session.terminate()?;
    serializer.stop();
    Ok(())
}
