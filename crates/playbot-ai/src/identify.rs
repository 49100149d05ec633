//! Phase selection: score every phase against this frame's classified
//! entities and pick the best explanation.

use tracing::trace;

use playbot_vision::Entity;

use crate::phase::Phase;

/// Select the active phase for this frame.
///
/// Score = number of distinct sign templates present among the classified
/// entities. A phase with any anti-sign present is disqualified outright.
/// The running best is only replaced on a strictly higher score, so ties go
/// to the earlier-declared phase; when nothing scores, the fallback at
/// index 0 wins.
pub fn select_phase(phases: &[Phase], entities: &[Entity]) -> usize {
    let mut best = 0usize;
    let mut best_score = 0usize;

    for (index, phase) in phases.iter().enumerate() {
        let disqualified = phase
            .anti_signs
            .iter()
            .any(|&t| entities.iter().any(|e| e.is(t)));
        if disqualified {
            trace!(phase = phase.name, "disqualified by anti-sign");
            continue;
        }

        let score = phase
            .signs
            .iter()
            .filter(|&&t| entities.iter().any(|e| e.is(t)))
            .count();
        if score > best_score {
            best = index;
            best_score = score;
        }
    }

    best
}
