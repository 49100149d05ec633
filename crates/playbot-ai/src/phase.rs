//! Phase definitions: what must (and must not) be on screen for a phase to
//! be active, which handler runs for it, and how often it may run. The
//! declared order of the phase book doubles as the identifier's tie-break
//! order; entry 0 is the fallback.

use std::collections::HashSet;

use thiserror::Error;

use playbot_data::{RegistryError, TemplateId, TemplateRegistry};

use crate::handlers::{self, Handler};

/// Length of the rolling throttle window, in frames.
pub const WINDOW_FRAMES: u8 = 10;

/// How often a phase's handler may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    /// Every frame.
    Unlimited,
    /// At most this many invocations per rolling window, on even ticks
    /// only.
    PerWindow(u32),
}

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("phase name must not be empty")]
    EmptyName,
    #[error("phase {0:?} caps invocations at zero")]
    ZeroThrottle(&'static str),
    #[error("phase book must not be empty")]
    EmptyBook,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// One discrete game state the identifier can select.
pub struct Phase {
    pub name: &'static str,
    /// Templates whose presence argues for this phase.
    pub signs: Vec<TemplateId>,
    /// Templates that never appear in this phase; one present disqualifies
    /// it outright.
    pub anti_signs: Vec<TemplateId>,
    pub handler: Handler,
    pub throttle: Throttle,
}

impl Phase {
    pub fn new(
        name: &'static str,
        signs: Vec<TemplateId>,
        anti_signs: Vec<TemplateId>,
        handler: Handler,
        throttle: Throttle,
    ) -> Result<Self, PhaseError> {
        if name.is_empty() {
            return Err(PhaseError::EmptyName);
        }
        if throttle == Throttle::PerWindow(0) {
            return Err(PhaseError::ZeroThrottle(name));
        }
        Ok(Self {
            name,
            signs: dedup(signs),
            anti_signs: dedup(anti_signs),
            handler,
            throttle,
        })
    }
}

/// Sign counting is over distinct templates; drop repeats up front.
fn dedup(ids: Vec<TemplateId>) -> Vec<TemplateId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// The fixed phase book for the target game. Order is deliberate: the
/// fallback first, then the phases in rough specificity order.
pub fn standard_phases(registry: &TemplateRegistry) -> Result<Vec<Phase>, PhaseError> {
    let t = |name: &str| registry.lookup(name);

    let mut battle_menu_signs = vec![t("narration_box")?, t("menu_option")?];
    battle_menu_signs.extend_from_slice(registry.markers());

    let mut in_battle_signs = vec![t("battle_box")?];
    in_battle_signs.extend_from_slice(registry.markers());

    Ok(vec![
        Phase::new(
            "unknown",
            vec![],
            vec![],
            handlers::unknown,
            Throttle::Unlimited,
        )?,
        Phase::new(
            "battle_menu",
            battle_menu_signs,
            vec![],
            handlers::battle_menu,
            Throttle::PerWindow(4),
        )?,
        Phase::new(
            "dialogue",
            vec![t("dialogue_box")?],
            vec![t("battle_box")?],
            handlers::dialogue,
            Throttle::PerWindow(2),
        )?,
        Phase::new(
            "in_battle",
            in_battle_signs,
            vec![t("menu_option")?],
            handlers::battle_idle,
            Throttle::Unlimited,
        )?,
        Phase::new(
            "save_prompt",
            vec![t("save_prompt")?, t("marker_red")?],
            vec![],
            handlers::save_prompt,
            Throttle::PerWindow(2),
        )?,
        Phase::new(
            "roaming",
            registry.avatar().to_vec(),
            vec![t("dialogue_box")?, t("battle_box")?],
            handlers::roaming,
            Throttle::Unlimited,
        )?,
        Phase::new(
            "game_over",
            vec![t("game_over_emblem")?],
            vec![],
            handlers::advance,
            Throttle::PerWindow(1),
        )?,
    ])
}
