mod common;

use camsource::prelude::*;
use camsource_simulation::{ScriptedSource, SteppingClock};

use common::*;

#[test]
fn natural_type_follows_the_live_feed() {
    let (_source, pump) = connected_pump();
    let mt = pump.media_type(0).unwrap().unwrap();
    assert_eq!(mt.geometry(), VGA);
    assert_eq!(mt.subtype, PixelFormat::Rgb32);
    assert_eq!(mt.image_size(), VGA_BYTES);
    assert_eq!(mt.avg_time_per_frame, LATENCY);
    assert_eq!(pump.latency(), LATENCY);
}

#[test]
fn defaults_apply_before_the_first_frame() {
    let pump = StreamPump::new(ScriptedSource::new(), &SourceConfig::new());
    let mt = pump.media_type(0).unwrap().unwrap();
    assert_eq!((mt.width, mt.height, mt.bit_count()), (1024, 756, 32));
    assert_eq!(mt.avg_time_per_frame, MediaTime(MediaTime::UNITS / 15));
}

#[test]
fn candidates_step_through_the_caps() {
    let (_source, pump) = connected_pump();
    assert_eq!(pump.media_type_count(), 9);

    let sizes: Vec<(u32, u32)> = (1..pump.media_type_count())
        .map(|i| {
            let mt = pump.media_type(i).unwrap().unwrap();
            (mt.width, mt.height)
        })
        .collect();
    assert_eq!(sizes.first(), Some(&(320, 240)));
    assert_eq!(sizes.get(1), Some(&(480, 360)));
    assert_eq!(sizes.last(), Some(&(1440, 1080)));
    assert_eq!(pump.media_type(9).unwrap(), None);

    let caps = pump.stream_caps();
    assert_eq!(caps.output_granularity, (160, 120));
}

#[test]
fn check_rejects_out_of_range_sizes_and_rates() {
    let (_source, pump) = connected_pump();
    let tiny = MediaType::video(FrameGeometry::new(160, 120, 32), LATENCY).unwrap();
    assert!(matches!(
        pump.check_media_type(&tiny),
        Err(SourceError::InvalidMediaType(_))
    ));

    let too_fast = MediaType::video(FrameGeometry::new(320, 240, 32), MediaTime(10_000)).unwrap();
    assert!(pump.check_media_type(&too_fast).is_err());

    let stepped = pump.media_type(2).unwrap().unwrap();
    assert!(pump.check_media_type(&stepped).is_ok());
}

#[test]
fn set_format_replaces_the_output_type() {
    let (_source, pump) = connected_pump();
    let stepped = MediaType::video(FrameGeometry::new(480, 360, 32), MediaTime(MediaTime::UNITS / 10))
        .unwrap();
    pump.set_format(stepped).unwrap();
    assert_eq!(pump.media_type(0).unwrap(), Some(stepped));
    assert_eq!(pump.latency(), MediaTime(MediaTime::UNITS / 10));

    let granted = pump
        .decide_buffer_size(&HeapAllocator::new(), AllocatorRequest::new())
        .unwrap();
    assert_eq!(granted.buffer_size, 480 * 360 * 4);
}

#[test]
fn set_format_is_refused_while_streaming() {
    let (_source, pump) = connected_pump();
    pump.activate(SteppingClock::new()).unwrap();
    let natural = pump.media_type(0).unwrap().unwrap();
    assert!(matches!(
        pump.set_format(natural),
        Err(SourceError::WrongState(_))
    ));
}
