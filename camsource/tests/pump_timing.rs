mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use camsource::prelude::*;
use camsource_simulation::{frame_tag, ManualClock};

use common::*;

#[test]
fn first_pull_anchors_then_samples_follow_the_clock() {
    let (_source, _clock, pump, mut sample) = running_pump();

    assert_eq!(pull(&pump, &mut sample), (l(0), l(0)));
    assert_eq!(pull(&pump, &mut sample), (l(0), l(1)));
    assert_eq!(pull(&pump, &mut sample), (l(1), l(2)));
    assert_eq!(pump.position(), l(2));

    assert!(sample.is_sync_point());
    assert_eq!(sample.actual_data_length(), VGA_BYTES);
    assert_eq!(pump.stats().delivered, 3);
}

#[test]
fn long_stall_is_clamped_to_one_latency() {
    let (_source, clock, pump, mut sample) = running_pump();
    pull(&pump, &mut sample);
    pull(&pump, &mut sample);

    clock.stall(l(10));
    let (start, stop) = pull(&pump, &mut sample);
    assert_eq!((start, stop), (l(1), l(2)));
    assert_eq!(clock.now(), l(12));
}

#[test]
fn short_stall_is_kept() {
    let (_source, clock, pump, mut sample) = running_pump();
    pull(&pump, &mut sample);
    pull(&pump, &mut sample);

    // 3 倍以内不钳制
    clock.stall(l(1));
    let (start, stop) = pull(&pump, &mut sample);
    assert_eq!((start, stop), (l(1), l(3)));
}

#[test]
fn sample_duration_never_exceeds_three_latencies() {
    let (source, clock, pump, mut sample) = running_pump();
    let stalls: [i64; 13] = [0, 1, 2, 3, 5, 50, 0, 4, 7, 0, 0, 100, 1];

    for (i, stall) in stalls.iter().enumerate() {
        clock.stall(LATENCY * *stall + MediaTime(i as i64 * 1_000));
        // 有时有帧到达，有时一帧都没有
        if i % 3 == 0 {
            source.push(vga_frame(i as u64));
        }
        let (start, stop) = pull(&pump, &mut sample);
        assert!(stop >= start);
        assert!(stop - start <= l(3), "sample {} spans {:?}", i, stop - start);
    }
}

#[test]
fn zero_fill_then_latest_then_repeat() {
    let (source, _clock, pump, mut sample) = running_pump();

    pull(&pump, &mut sample);
    assert!(sample.data().iter().all(|b| *b == 0));
    assert_eq!(pump.stats().zero_filled, 1);

    assert!(source.push(vga_frame(7)));
    pull(&pump, &mut sample);
    assert_eq!(frame_tag(sample.data()), Some(7));
    assert!(!source.has_pending());

    // 没有新帧：重复上一帧
    pull(&pump, &mut sample);
    assert_eq!(frame_tag(sample.data()), Some(7));
    assert_eq!(pump.stats().stale_repeats, 1);

    source.push(vga_frame(8));
    pull(&pump, &mut sample);
    assert_eq!(frame_tag(sample.data()), Some(8));
}

#[test]
fn frames_smaller_than_the_sample_are_padded() {
    let (source, _clock, pump, mut sample) = running_pump();
    let small = camsource_simulation::FramePattern::new(320, 240)
        .pattern(camsource_simulation::Pattern::Solid([1, 2, 3, 4]))
        .frame(0)
        .unwrap();
    source.push(small);
    pull(&pump, &mut sample);
    assert_eq!(&sample.data()[4..8], &[1, 2, 3, 4]);
    assert!(sample.data()[320 * 240 * 4..].iter().all(|b| *b == 0));
}

#[test]
fn fill_requires_activation() {
    let (_source, pump) = connected_pump();
    let mut sample = MediaSample::new(VGA_BYTES, 0);
    assert!(matches!(
        pump.fill_buffer(&mut sample),
        Err(SourceError::WrongState(_))
    ));
}

#[test]
fn activation_toggles_frame_forwarding() {
    let (source, pump) = connected_pump();
    assert!(!source.is_streaming());
    pump.activate(camsource_simulation::SteppingClock::new()).unwrap();
    assert!(source.is_streaming());
    assert!(pump.is_active());

    pump.deactivate();
    assert!(!source.is_streaming());
    assert!(!pump.is_active());
}

#[test]
fn reactivation_restarts_the_stream_position() {
    let (_source, clock, pump, mut sample) = running_pump();
    pull(&pump, &mut sample);
    pull(&pump, &mut sample);
    assert_eq!(pump.position(), l(1));

    pump.deactivate();
    pump.activate(clock.clone()).unwrap();
    assert_eq!(pump.position(), MediaTime::ZERO);
    let (start, stop) = pull(&pump, &mut sample);
    assert_eq!((start, stop), (l(0), l(0)));
}

#[test]
fn deactivate_wakes_a_blocked_pull() {
    let (_source, pump) = connected_pump();
    let pump = Arc::new(pump);
    let allocator = HeapAllocator::new();
    pump.decide_buffer_size(&allocator, AllocatorRequest::new())
        .unwrap();
    let mut sample = allocator.get_buffer().unwrap();

    let clock = ManualClock::new();
    pump.activate(clock.clone()).unwrap();
    // 第一次拉取只建立订阅
    pull(&pump, &mut sample);
    assert_eq!(clock.active_advises(), 1);

    let puller = {
        let pump = Arc::clone(&pump);
        thread::spawn(move || pump.fill_buffer(&mut sample))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!puller.is_finished());

    pump.deactivate();
    let result = puller.join().expect("puller panicked");
    assert!(matches!(result, Err(SourceError::Cancelled)));
    assert_eq!(clock.active_advises(), 0);
}

#[test]
fn manual_clock_drives_pulls_from_another_thread() {
    let (_source, pump) = connected_pump();
    let pump = Arc::new(pump);
    let allocator = HeapAllocator::new();
    pump.decide_buffer_size(&allocator, AllocatorRequest::new())
        .unwrap();
    let mut sample = allocator.get_buffer().unwrap();

    let clock = ManualClock::new();
    pump.activate(clock.clone()).unwrap();
    pull(&pump, &mut sample);

    let puller = {
        let pump = Arc::clone(&pump);
        thread::spawn(move || {
            let outcome = pump.fill_buffer(&mut sample);
            (outcome, sample.time())
        })
    };
    thread::sleep(Duration::from_millis(20));
    clock.advance(LATENCY);

    let (outcome, time) = puller.join().expect("puller panicked");
    assert_eq!(outcome.unwrap(), FillOutcome::Delivered);
    assert_eq!(time, Some((l(0), l(1))));
}
