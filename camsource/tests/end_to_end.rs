use std::sync::Arc;
use std::time::Duration;

use camsource::prelude::*;
use camsource_simulation::{frame_tag, FramePattern, SimulatedSdk, SteppingClock};

struct Rig {
    sdk: Arc<SimulatedSdk>,
    session: Arc<SessionController>,
    pump: StreamPump,
}

fn rig() -> anyhow::Result<Rig> {
    let config = SourceConfig::new();
    let sdk = SimulatedSdk::with_cameras(["EOS R6"]);
    let serializer = CommandSerializer::spawn(config.worker_name.clone())?;
    let session = Arc::new(SessionController::new(sdk.clone(), serializer, config.clone())?);
    session.initialize()?;

    // 第一帧只确定几何信息
    sdk.push_frame(FramePattern::new(640, 480).raw(0)?);
    let pump = StreamPump::new(session.clone(), &config);
    Ok(Rig { sdk, session, pump })
}

fn negotiate(pump: &StreamPump) -> anyhow::Result<MediaSample> {
    let mt = pump
        .media_type(0)?
        .ok_or_else(|| anyhow::anyhow!("no natural media type"))?;
    pump.connect(mt)?;
    let allocator = HeapAllocator::new();
    pump.decide_buffer_size(&allocator, AllocatorRequest::new())?;
    Ok(allocator.get_buffer()?)
}

#[test]
fn live_view_frames_reach_the_sample() -> anyhow::Result<()> {
    let Rig { sdk, session, pump } = rig()?;

    let natural = pump.media_type(0)?.expect("natural type");
    assert_eq!((natural.width, natural.height), (640, 480));
    let mut sample = negotiate(&pump)?;
    assert_eq!(sample.size(), 1_228_800);

    assert!(!session.is_streaming());
    pump.activate(SteppingClock::new())?;
    assert!(session.is_streaming());

    sdk.push_frame(FramePattern::new(640, 480).raw(42)?);
    assert_eq!(pump.fill_buffer(&mut sample)?, FillOutcome::Delivered);
    assert_eq!(frame_tag(sample.data()), Some(42));

    // 相机没出新图：重复上一帧
    assert_eq!(pump.fill_buffer(&mut sample)?, FillOutcome::Delivered);
    assert_eq!(frame_tag(sample.data()), Some(42));
    assert_eq!(pump.stats().stale_repeats, 1);

    pump.deactivate();
    assert!(!session.is_streaming());
    assert_eq!(sdk.affinity_violations(), 0);
    Ok(())
}

#[test]
fn real_clock_produces_contiguous_timestamps() -> anyhow::Result<()> {
    let Rig { sdk, session: _session, pump } = rig()?;
    let mut sample = negotiate(&pump)?;
    pump.activate(Arc::new(SystemClock::new()))?;

    let (feed, stop_feed) =
        sdk.spawn_feed(FramePattern::new(640, 480), Duration::from_millis(5), 1_000)?;

    let mut last_stop = None;
    for _ in 0..5 {
        assert_eq!(pump.fill_buffer(&mut sample)?, FillOutcome::Delivered);
        let (start, stop) = sample.time().expect("stamped");
        assert!(stop >= start);
        if let Some(previous) = last_stop {
            assert_eq!(start, previous);
        }
        last_stop = Some(stop);
    }

    pump.deactivate();
    drop(stop_feed);
    let delivered = feed.join().expect("feed panicked");
    assert!(delivered > 0);
    Ok(())
}
