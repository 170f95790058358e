//! Fuzz test for ProgressTracker
//!
//! Feeds arbitrary chunk sequences through the tracker and checks the
//! snapshot invariants.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use imprint_core::ProgressTracker;

#[derive(Arbitrary, Debug)]
struct ProgressInput {
    length: u64,
    chunk_size: usize,
    deltas: Vec<u64>,
}

fuzz_target!(|input: ProgressInput| {
    let mut tracker = ProgressTracker::new(input.length, input.chunk_size);
    tracker.start();

    let mut previous = 0;
    for delta in input.deltas.into_iter().take(1024) {
        let snapshot = tracker.record(delta);

        assert!((0.0..=100.0).contains(&snapshot.percentage));
        assert!(snapshot.transferred <= input.length);
        assert!(snapshot.transferred >= previous);
        assert_eq!(snapshot.transferred + snapshot.remaining, input.length);
        assert_eq!(snapshot.delta, delta);
        assert_eq!(snapshot.is_complete(), snapshot.remaining == 0);

        // Display helpers never panic
        let _ = snapshot.speed_display();
        let _ = snapshot.eta_display();

        previous = snapshot.transferred;
    }

    assert_eq!(tracker.transferred(), previous);
});
