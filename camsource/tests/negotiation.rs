mod common;

use camsource::prelude::*;
use camsource_simulation::{CappedAllocator, ScriptedSource, SteppingClock};

use common::*;

fn unconnected_pump() -> StreamPump {
    StreamPump::new(ScriptedSource::with_feed(VGA, 30.0), &SourceConfig::new())
}

#[test]
fn sample_size_covers_one_vga_frame() {
    let (_source, pump) = connected_pump();
    let allocator = HeapAllocator::new();
    let granted = pump
        .decide_buffer_size(&allocator, AllocatorRequest::new())
        .unwrap();
    assert_eq!(granted.buffer_size, VGA_BYTES);
    assert_eq!(granted.buffers, 1);
    assert_eq!(pump.granted_properties(), Some(granted));
    assert_eq!(allocator.get_buffer().unwrap().size(), VGA_BYTES);
}

#[test]
fn downstream_request_can_only_grow_the_buffers() {
    let (_source, pump) = connected_pump();
    let allocator = HeapAllocator::new();
    let granted = pump
        .decide_buffer_size(
            &allocator,
            AllocatorRequest::new().buffers(4).buffer_size(100),
        )
        .unwrap();
    assert_eq!(granted.buffers, 4);
    assert_eq!(granted.buffer_size, VGA_BYTES);
}

#[test]
fn undersized_suggestion_is_rejected() {
    let pump = unconnected_pump();
    let err = pump
        .suggest_allocator_properties(AllocatorRequest::new().buffer_size(1000))
        .unwrap_err();
    assert!(matches!(
        err,
        SourceError::Negotiation(NegotiationFailure::BufferTooSmall {
            requested: 1000,
            required: VGA_BYTES
        })
    ));
    // 被拒绝的建议不留痕迹
    assert_eq!(pump.allocator_properties().unwrap().buffer_size, VGA_BYTES);
}

#[test]
fn larger_suggestion_is_honored_through_decide() {
    let pump = unconnected_pump();
    pump.suggest_allocator_properties(AllocatorRequest::new().buffer_size(2_000_000).buffers(2))
        .unwrap();
    let props = pump.allocator_properties().unwrap();
    assert_eq!((props.buffers, props.buffer_size), (2, 2_000_000));

    let natural = pump.media_type(0).unwrap().unwrap();
    pump.connect(natural).unwrap();
    let granted = pump
        .decide_buffer_size(&HeapAllocator::new(), AllocatorRequest::new())
        .unwrap();
    assert_eq!((granted.buffers, granted.buffer_size), (2, 2_000_000));
}

#[test]
fn alignment_and_prefix_cannot_be_changed() {
    let pump = unconnected_pump();
    assert!(matches!(
        pump.suggest_allocator_properties(AllocatorRequest::new().align(64)),
        Err(SourceError::Negotiation(NegotiationFailure::AlignmentMismatch { .. }))
    ));
    assert!(matches!(
        pump.suggest_allocator_properties(AllocatorRequest::new().prefix(16)),
        Err(SourceError::Negotiation(NegotiationFailure::PrefixMismatch { .. }))
    ));
    assert!(matches!(
        pump.suggest_allocator_properties(AllocatorRequest::new().buffers(0)),
        Err(SourceError::Negotiation(NegotiationFailure::NoBuffers))
    ));
}

#[test]
fn suggestions_must_precede_connection() {
    let (_source, pump) = connected_pump();
    assert!(matches!(
        pump.suggest_allocator_properties(AllocatorRequest::new().buffer_size(2_000_000)),
        Err(SourceError::AlreadyConnected)
    ));
}

#[test]
fn deciding_requires_a_connection() {
    let pump = unconnected_pump();
    assert!(matches!(
        pump.decide_buffer_size(&HeapAllocator::new(), AllocatorRequest::new()),
        Err(SourceError::NotConnected)
    ));
    assert!(matches!(
        pump.activate(SteppingClock::new()),
        Err(SourceError::NotConnected)
    ));
}

#[test]
fn allocator_shortfall_is_reported() {
    let (_source, pump) = connected_pump();
    let err = pump
        .decide_buffer_size(&CappedAllocator::new(4096), AllocatorRequest::new())
        .unwrap_err();
    assert!(matches!(
        err,
        SourceError::Negotiation(NegotiationFailure::AllocatorShortfall {
            granted: 4096,
            buffers: 1,
            required: VGA_BYTES
        })
    ));
    assert_eq!(pump.granted_properties(), None);
}

#[test]
fn connecting_twice_is_rejected() {
    let (_source, pump) = connected_pump();
    let natural = pump.media_type(0).unwrap().unwrap();
    assert!(matches!(pump.connect(natural), Err(SourceError::AlreadyConnected)));

    pump.disconnect();
    assert!(!pump.is_connected());
    pump.connect(natural).unwrap();
}

#[test]
fn disconnect_forgets_the_grant() {
    let (_source, pump) = connected_pump();
    pump.decide_buffer_size(&HeapAllocator::new(), AllocatorRequest::new())
        .unwrap();
    pump.disconnect();
    assert_eq!(pump.granted_properties(), None);
}
