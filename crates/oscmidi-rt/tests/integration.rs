//! End-to-end tests: application handle, ring buffers and realtime callback
//! driven block by block with a manual clock.

use std::sync::Arc;

use oscmidi_rt::{
    transport_with_clock, BlockInfo, ManualClock, MidiBuffer, MidiMessage, MidiTransport,
    ProcessIo, RealtimeProcessor, TransportConfig,
};
use proptest::prelude::*;

const BLOCK: u32 = 128;

/// Route log output through the test harness; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn setup(config: TransportConfig) -> (MidiTransport, RealtimeProcessor, Arc<ManualClock>) {
    init_tracing();
    let clock = Arc::new(ManualClock::new(0));
    let (handle, processor) = transport_with_clock(&config, clock.clone()).unwrap();
    (handle, processor, clock)
}

fn block(index: u32) -> BlockInfo {
    BlockInfo {
        nframes: BLOCK,
        last_frame_time: index * BLOCK,
    }
}

fn drain(processor: &mut RealtimeProcessor, info: BlockInfo) -> Vec<MidiMessage> {
    let mut out = MidiBuffer::with_capacity(1024);
    processor.process(
        info,
        ProcessIo {
            midi_out: Some(&mut out),
            ..ProcessIo::default()
        },
    );
    out.events().to_vec()
}

// ---------------------------------------------------------------------------
// 1. Egress timing
// ---------------------------------------------------------------------------

#[test]
fn test_event_lands_one_block_later_at_its_offset() {
    let (mut midi, mut processor, clock) = setup(TransportConfig::default());
    clock.set(2 * BLOCK + 40);
    assert!(midi.enqueue_outgoing([0x90, 60, 100]));

    // Block 2 is already running when the event is stamped.
    assert!(drain(&mut processor, block(2)).is_empty());
    let out = drain(&mut processor, block(3));
    assert_eq!(out, vec![MidiMessage::new(40, [0x90, 60, 100], 3)]);
}

#[test]
fn test_overrun_clamps_to_block_start() {
    let (mut midi, mut processor, clock) = setup(TransportConfig::default());
    clock.set(10);
    midi.enqueue_outgoing([0xB0, 7, 64]);
    // The callback skipped ahead several blocks.
    let out = drain(&mut processor, block(9));
    assert_eq!(out[0].time, 0);
    assert_eq!(midi.stats().late, 1);
}

#[test]
fn test_program_change_sent_with_two_bytes() {
    let (mut midi, mut processor, clock) = setup(TransportConfig::default());
    clock.set(BLOCK);
    midi.enqueue_outgoing([0xC5, 12, 99]);
    let out = drain(&mut processor, block(2));
    assert_eq!(out[0].bytes(), &[0xC5, 12]);
}

#[test]
fn test_full_egress_drops_and_counts() {
    let config = TransportConfig {
        ring_capacity: 4,
        ..TransportConfig::default()
    };
    let (mut midi, mut processor, _clock) = setup(config);
    let accepted = (0..10).filter(|n| midi.enqueue_outgoing([0x90, *n, 1])).count();
    assert_eq!(accepted, 4);
    assert_eq!(midi.stats().egress_dropped, 6);
    assert_eq!(drain(&mut processor, block(1)).len(), 4);
}

proptest! {
    #[test]
    fn prop_drain_schedules_by_offset(
        stamps in proptest::collection::vec(0u32..(6 * BLOCK), 1..40),
        start in 1u32..5,
    ) {
        let mut stamps = stamps;
        stamps.sort_unstable();
        let (mut midi, mut processor, clock) = setup(TransportConfig::default());
        for (i, &t) in stamps.iter().enumerate() {
            clock.set(t);
            prop_assert!(midi.enqueue_outgoing([0x90, (i % 128) as u8, 1]));
        }

        let mut emitted = 0;
        for index in start..start + 8 {
            let info = block(index);
            let out = drain(&mut processor, info);
            for msg in &out {
                prop_assert!(msg.time < BLOCK);
                let stamp = stamps[emitted];
                let offset = stamp as i64 + BLOCK as i64 - info.last_frame_time as i64;
                prop_assert_eq!(msg.time as i64, offset.max(0));
                prop_assert_eq!(msg.data[1], (emitted % 128) as u8);
                emitted += 1;
            }
        }
        // Everything stamped before the last drained block has gone out once.
        prop_assert_eq!(emitted, stamps.len());
    }
}

// ---------------------------------------------------------------------------
// 2. Ingress
// ---------------------------------------------------------------------------

#[test]
fn test_input_reaches_application_in_order() {
    let (mut midi, mut processor, _clock) = setup(TransportConfig::default());
    let input = MidiBuffer::from_events([
        MidiMessage::new(0, [0x90, 60, 100], 3),
        MidiMessage::new(7, [0x80, 60, 0], 3),
        MidiMessage::new(9, [0xF8, 0, 0], 1),
    ]);
    processor.process(
        block(0),
        ProcessIo {
            midi_in: Some(&input),
            ..ProcessIo::default()
        },
    );

    let mut received = Vec::new();
    while let Ok(Some(msg)) = midi.dequeue_incoming() {
        received.push((msg.time, msg.bytes().to_vec()));
    }
    assert_eq!(
        received,
        vec![
            (0, vec![0x90, 60, 100]),
            (7, vec![0x80, 60, 0]),
            (9, vec![0xF8]),
        ]
    );
}

// ---------------------------------------------------------------------------
// 3. Transpose filter through the callback
// ---------------------------------------------------------------------------

fn filter_block(processor: &mut RealtimeProcessor, input: &[MidiMessage]) -> Vec<[u8; 3]> {
    let input = MidiBuffer::from_events(input.iter().copied());
    let mut out = MidiBuffer::with_capacity(256);
    processor.process(
        block(0),
        ProcessIo {
            filter_in: Some(&input),
            filter_out: Some(&mut out),
            ..ProcessIo::default()
        },
    );
    out.events().iter().map(|m| m.data).collect()
}

#[test]
fn test_chord_is_revoiced_on_shift_change() {
    let config = TransportConfig {
        use_filter: true,
        ..TransportConfig::default()
    };
    let (midi, mut processor, _clock) = setup(config);
    let chord = [60, 64, 67].map(|n| MidiMessage::new(0, [0x90, n, 100], 3));
    assert_eq!(filter_block(&mut processor, &chord).len(), 3);

    midi.set_shift(2);
    let out = filter_block(&mut processor, &[]);
    assert_eq!(
        out,
        vec![
            [0x80, 60, 0],
            [0x80, 64, 0],
            [0x80, 67, 0],
            [0x90, 62, 100],
            [0x90, 66, 100],
            [0x90, 69, 100],
        ]
    );
}

#[test]
fn test_top_note_has_no_out_of_range_note_on() {
    let config = TransportConfig {
        use_filter: true,
        ..TransportConfig::default()
    };
    let (midi, mut processor, _clock) = setup(config);
    filter_block(&mut processor, &[MidiMessage::new(0, [0x90, 126, 100], 3)]);
    midi.set_shift(2);
    assert_eq!(filter_block(&mut processor, &[]), vec![[0x80, 126, 0]]);

    // Releasing the held note still removes it.
    let released = filter_block(&mut processor, &[MidiMessage::new(3, [0x80, 126, 0], 3)]);
    assert!(released.is_empty());
    midi.set_shift(0);
    assert!(filter_block(&mut processor, &[]).is_empty());
}
