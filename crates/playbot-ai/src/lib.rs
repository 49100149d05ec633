//! Decision layer: the phase state machine, per-phase handlers, stall
//! recovery and the navigation grid. One [`Ai::observe`] call per frame,
//! driven by the owning pipeline.

pub mod grid;
pub mod handlers;
pub mod identify;
pub mod phase;
pub mod recovery;

use std::sync::Arc;

use image::RgbaImage;
use thiserror::Error;
use tracing::debug;

use playbot_data::TemplateRegistry;
use playbot_vision::Entity;
use playbot_window::InputSink;

pub use grid::{RouteError, Tile, TileCoord, TileGrid, IMPASSABLE, TILE_EDGE};
pub use handlers::{present_of, wanted, Handler, HandlerCtx, HandlerError};
pub use identify::select_phase;
pub use phase::{standard_phases, Phase, PhaseError, Throttle, WINDOW_FRAMES};
pub use recovery::{Recovery, RECOVERY_KEYS, STALL_THRESHOLD};

/// A handler failed; carries the phase and frame it happened on. The frame
/// loop keeps going, this only reports.
#[derive(Debug, Error)]
#[error("phase {phase} failed on frame {frame}")]
pub struct PhaseFailure {
    pub phase: &'static str,
    pub frame: u64,
    #[source]
    pub source: HandlerError,
}

/// The per-process decision state: phase book, throttle window, recovery
/// counters and the navigation grid. Lives as long as the pipeline.
pub struct Ai {
    registry: Arc<TemplateRegistry>,
    phases: Vec<Phase>,
    current: usize,
    /// Position inside the rolling throttle window.
    tick: u8,
    /// Throttled-handler invocations in the current window.
    invocations: u32,
    frame_no: u64,
    grid: TileGrid,
    recovery: Recovery,
    grid_overlay: bool,
    route: Option<Vec<TileCoord>>,
}

impl Ai {
    pub fn new(registry: Arc<TemplateRegistry>) -> Result<Self, PhaseError> {
        let phases = standard_phases(&registry)?;
        Self::with_phases(registry, phases)
    }

    /// Build with a caller-supplied phase book. Entry 0 is the fallback.
    pub fn with_phases(
        registry: Arc<TemplateRegistry>,
        phases: Vec<Phase>,
    ) -> Result<Self, PhaseError> {
        if phases.is_empty() {
            return Err(PhaseError::EmptyBook);
        }
        Ok(Self {
            registry,
            phases,
            current: 0,
            tick: 0,
            invocations: 0,
            frame_no: 0,
            grid: TileGrid::new(),
            recovery: Recovery::new(),
            grid_overlay: false,
            route: None,
        })
    }

    /// Run one identification + action pass over this frame's entities.
    ///
    /// The selected phase updates even when its handler is throttled out or
    /// fails; an error here never poisons the next frame.
    pub fn observe(
        &mut self,
        entities: &[Entity],
        frame: &mut RgbaImage,
        sink: &dyn InputSink,
    ) -> Result<(), PhaseFailure> {
        self.frame_no += 1;
        self.current = select_phase(&self.phases, entities);
        if self.current != 0 {
            self.recovery.phase_identified();
        }

        let selected = &self.phases[self.current];
        let eligible = match selected.throttle {
            Throttle::Unlimited => true,
            Throttle::PerWindow(cap) => self.tick % 2 == 0 && self.invocations < cap,
        };
        debug!(
            frame = self.frame_no,
            phase = selected.name,
            eligible,
            "phase selected"
        );

        let handler = selected.handler;
        let name = selected.name;
        let throttled = matches!(selected.throttle, Throttle::PerWindow(_));

        let mut outcome = Ok(());
        if eligible {
            if throttled {
                self.invocations += 1;
            }
            let mut ctx = HandlerCtx {
                entities,
                frame,
                sink,
                registry: &self.registry,
                grid: &mut self.grid,
                recovery: &mut self.recovery,
                grid_overlay: self.grid_overlay,
                route: &mut self.route,
            };
            outcome = handler(&mut ctx).map_err(|source| PhaseFailure {
                phase: name,
                frame: self.frame_no,
                source,
            });
        }

        self.tick = (self.tick + 1) % WINDOW_FRAMES;
        if self.tick == 0 {
            self.invocations = 0;
        }
        outcome
    }

    pub fn current_phase_name(&self) -> &'static str {
        self.phases[self.current].name
    }

    pub fn frame_no(&self) -> u64 {
        self.frame_no
    }

    pub fn grid_overlay(&self) -> bool {
        self.grid_overlay
    }

    pub fn set_grid_overlay(&mut self, enabled: bool) {
        self.grid_overlay = enabled;
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn recovery(&self) -> &Recovery {
        &self.recovery
    }

    /// Route computed by the most recent navigation pass, start to goal
    /// inclusive.
    pub fn last_route(&self) -> Option<&[TileCoord]> {
        self.route.as_deref()
    }
}
