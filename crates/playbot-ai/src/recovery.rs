//! Stall recovery: when perception stays unreliable for too long, jolt the
//! game with one random key press and start counting again. Best effort;
//! a failed press is logged and never fails the frame.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use playbot_window::{InputSink, Key};

/// Consecutive failures tolerated before a recovery press fires.
pub const STALL_THRESHOLD: u32 = 100;

/// Keys the recovery press draws from, uniformly.
pub const RECOVERY_KEYS: [Key; 7] = [
    Key::Confirm,
    Key::Cancel,
    Key::Up,
    Key::Down,
    Key::Left,
    Key::Right,
    Key::Menu,
];

/// Consecutive-failure counters for the two recovery contexts: handlers
/// that could not retrieve their required entities, and frames where no
/// phase could be identified.
#[derive(Debug)]
pub struct Recovery {
    retrieval_failures: u32,
    unknown_streak: u32,
    rng: SmallRng,
}

impl Recovery {
    pub fn new() -> Self {
        Self {
            retrieval_failures: 0,
            unknown_streak: 0,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            ..Self::new()
        }
    }

    pub fn retrieval_failures(&self) -> u32 {
        self.retrieval_failures
    }

    pub fn unknown_streak(&self) -> u32 {
        self.unknown_streak
    }

    /// A handler could not assemble its required entity set this frame.
    pub fn note_retrieval_failure(&mut self, sink: &dyn InputSink) {
        self.retrieval_failures += 1;
        if self.retrieval_failures > STALL_THRESHOLD {
            warn!(
                frames = self.retrieval_failures,
                "entity retrieval keeps failing, trying to get unstuck"
            );
            self.jolt(sink);
            self.retrieval_failures = 0;
        }
    }

    /// The required entities were found; the stall is over.
    pub fn retrieval_ok(&mut self) {
        self.retrieval_failures = 0;
    }

    /// No phase matched this frame's entities.
    pub fn note_unknown(&mut self, sink: &dyn InputSink) {
        self.unknown_streak += 1;
        if self.unknown_streak > STALL_THRESHOLD {
            warn!(
                frames = self.unknown_streak,
                "no phase identified for too long, trying to get unstuck"
            );
            self.jolt(sink);
            self.unknown_streak = 0;
        }
    }

    /// A real phase was identified this frame.
    pub fn phase_identified(&mut self) {
        self.unknown_streak = 0;
    }

    fn jolt(&mut self, sink: &dyn InputSink) {
        let key = RECOVERY_KEYS[self.rng.gen_range(0..RECOVERY_KEYS.len())];
        info!("recovery press: {key}");
        if let Err(e) = sink.press(key) {
            warn!("recovery press failed: {e}");
        }
    }
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingSink;

    #[test]
    fn fires_once_past_the_threshold_and_resets() {
        let sink = RecordingSink::default();
        let mut recovery = Recovery::seeded(7);

        for _ in 0..STALL_THRESHOLD {
            recovery.note_unknown(&sink);
        }
        assert!(sink.presses().is_empty());

        recovery.note_unknown(&sink);
        assert_eq!(sink.presses().len(), 1);
        assert_eq!(recovery.unknown_streak(), 0);

        // The counter restarted, so the next press takes a full window.
        for _ in 0..STALL_THRESHOLD {
            recovery.note_unknown(&sink);
        }
        assert_eq!(sink.presses().len(), 1);
    }

    #[test]
    fn recovery_key_is_from_the_fixed_set() {
        let sink = RecordingSink::default();
        let mut recovery = Recovery::seeded(42);
        for _ in 0..=STALL_THRESHOLD {
            recovery.note_retrieval_failure(&sink);
        }
        let presses = sink.presses();
        assert_eq!(presses.len(), 1);
        assert!(RECOVERY_KEYS.contains(&presses[0]));
    }

    #[test]
    fn success_resets_the_retrieval_counter() {
        let sink = RecordingSink::default();
        let mut recovery = Recovery::seeded(1);
        for _ in 0..STALL_THRESHOLD {
            recovery.note_retrieval_failure(&sink);
        }
        recovery.retrieval_ok();
        recovery.note_retrieval_failure(&sink);
        assert!(sink.presses().is_empty());
        assert_eq!(recovery.retrieval_failures(), 1);
    }

    #[test]
    fn press_failure_is_swallowed() {
        let sink = RecordingSink::failing();
        let mut recovery = Recovery::seeded(3);
        for _ in 0..=STALL_THRESHOLD {
            recovery.note_unknown(&sink);
        }
        // Counter still reset; nothing panicked or propagated.
        assert_eq!(recovery.unknown_streak(), 0);
    }
}
