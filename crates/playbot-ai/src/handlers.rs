//! Per-phase decision logic. Handlers read spatial relationships between
//! this frame's entities and emit key presses through the input sink; they
//! never block on delivery.

use image::{Rgba, RgbaImage};
use thiserror::Error;
use tracing::debug;

use playbot_data::{RegistryError, TemplateId, TemplateRegistry};
use playbot_vision::{draw_cross, Entity, Point, VisionError};
use playbot_window::{InputError, InputSink, Key};

use crate::grid::{RouteError, TileCoord, TileGrid};
use crate::recovery::Recovery;

const AVATAR_MARK: Rgba<u8> = Rgba([255, 0, 0, 255]);

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Not every distinct wanted template was present among the classified
    /// entities. Callers route this into stall recovery rather than
    /// failing the frame.
    #[error("required entity set incomplete")]
    IncompleteSet,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error("failed to press {key}")]
    Input {
        key: Key,
        #[source]
        source: InputError,
    },
}

/// Everything a handler may touch during one frame.
pub struct HandlerCtx<'a> {
    pub entities: &'a [Entity],
    pub frame: &'a mut RgbaImage,
    pub sink: &'a dyn InputSink,
    pub registry: &'a TemplateRegistry,
    pub grid: &'a mut TileGrid,
    pub recovery: &'a mut Recovery,
    pub grid_overlay: bool,
    /// Latest route computed by the navigation handler, for the integrator
    /// to turn into movement keys.
    pub route: &'a mut Option<Vec<TileCoord>>,
}

pub type Handler = fn(&mut HandlerCtx<'_>) -> Result<(), HandlerError>;

/// All classified entities whose template is in `desired`, with the
/// guarantee that every distinct desired template is represented at least
/// once; otherwise `IncompleteSet`.
pub fn wanted<'e>(
    entities: &'e [Entity],
    desired: &[TemplateId],
) -> Result<Vec<&'e Entity>, HandlerError> {
    let found: Vec<&Entity> = entities
        .iter()
        .filter(|e| desired.iter().any(|&d| e.is(d)))
        .collect();
    let complete = desired
        .iter()
        .all(|&d| found.iter().any(|e| e.is(d)));
    if !complete {
        return Err(HandlerError::IncompleteSet);
    }
    Ok(found)
}

/// Like [`wanted`] but without the completeness check: whatever subset is
/// present.
pub fn present_of<'e>(entities: &'e [Entity], desired: &[TemplateId]) -> Vec<&'e Entity> {
    entities
        .iter()
        .filter(|e| desired.iter().any(|&d| e.is(d)))
        .collect()
}

fn press(ctx: &HandlerCtx<'_>, key: Key) -> Result<(), HandlerError> {
    ctx.sink
        .press(key)
        .map_err(|source| HandlerError::Input { key, source })
}

/// Fallback handler: nothing recognizable on screen. Counts toward the
/// unidentified-phase stall.
pub fn unknown(ctx: &mut HandlerCtx<'_>) -> Result<(), HandlerError> {
    ctx.recovery.note_unknown(ctx.sink);
    Ok(())
}

/// Menu selection: steer the marker onto the rightmost menu option, then
/// confirm once they line up.
pub fn battle_menu(ctx: &mut HandlerCtx<'_>) -> Result<(), HandlerError> {
    let option = ctx.registry.lookup("menu_option")?;
    let marker = ctx.registry.lookup("marker_red")?;
    let found = match wanted(ctx.entities, &[option, marker]) {
        Ok(found) => found,
        Err(HandlerError::IncompleteSet) => {
            ctx.recovery.note_retrieval_failure(ctx.sink);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    ctx.recovery.retrieval_ok();

    let target = found
        .iter()
        .filter(|e| e.is(option))
        .max_by_key(|e| e.center().x);
    let cursor = found.iter().find(|e| e.is(marker));
    let (Some(target), Some(cursor)) = (target, cursor) else {
        return Ok(());
    };

    let target_x = target.center().x;
    let cursor_x = cursor.center().x;
    debug!(cursor_x, target_x, "steering menu marker");
    match cursor_x.cmp(&target_x) {
        std::cmp::Ordering::Less => press(ctx, Key::Right),
        std::cmp::Ordering::Greater => press(ctx, Key::Left),
        std::cmp::Ordering::Equal => press(ctx, Key::Confirm),
    }
}

/// Dialogue: skip the scroll and advance to the next line. The phase
/// throttle keeps this from eating several lines per window.
pub fn dialogue(ctx: &mut HandlerCtx<'_>) -> Result<(), HandlerError> {
    press(ctx, Key::Cancel)?;
    press(ctx, Key::Confirm)
}

/// Single confirm, for screens that only need acknowledging.
pub fn advance(ctx: &mut HandlerCtx<'_>) -> Result<(), HandlerError> {
    press(ctx, Key::Confirm)
}

/// Checkpoint prompt: pick the save option. The marker starts on it when
/// it sits left of the prompt's center; otherwise move left first.
pub fn save_prompt(ctx: &mut HandlerCtx<'_>) -> Result<(), HandlerError> {
    let marker = ctx.registry.lookup("marker_red")?;
    let prompt = ctx.registry.lookup("save_prompt")?;
    let found = match wanted(ctx.entities, &[marker, prompt]) {
        Ok(found) => found,
        Err(HandlerError::IncompleteSet) => {
            ctx.recovery.note_retrieval_failure(ctx.sink);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    ctx.recovery.retrieval_ok();

    let marker_e = found.iter().find(|e| e.is(marker));
    let prompt_e = found.iter().find(|e| e.is(prompt));
    let (Some(marker_e), Some(prompt_e)) = (marker_e, prompt_e) else {
        return Ok(());
    };

    if marker_e.center().x >= prompt_e.center().x {
        press(ctx, Key::Left)?;
    }
    press(ctx, Key::Confirm)?;
    press(ctx, Key::Confirm)
}

/// Active battle: keep the hazard map current while the marker dodges.
/// Movement is reactive and handled per-mode by the integrator; here we
/// only maintain the grid.
pub fn battle_idle(ctx: &mut HandlerCtx<'_>) -> Result<(), HandlerError> {
    let markers = present_of(ctx.entities, ctx.registry.markers());
    if markers.is_empty() {
        ctx.recovery.note_retrieval_failure(ctx.sink);
        return Ok(());
    }
    ctx.recovery.retrieval_ok();

    ctx.grid.ensure_built(ctx.frame.width(), ctx.frame.height());
    ctx.grid.refresh_costs(ctx.frame)?;
    if ctx.grid_overlay {
        ctx.grid.draw(ctx.frame);
    }
    Ok(())
}

/// Roaming the overworld: find the avatar, route to the goal tile, and
/// leave the route for the integrator. Turning the route into movement
/// keys is an integration contract, deliberately not implemented here.
pub fn roaming(ctx: &mut HandlerCtx<'_>) -> Result<(), HandlerError> {
    let avatars = present_of(ctx.entities, ctx.registry.avatar());
    if avatars.is_empty() {
        ctx.recovery.note_retrieval_failure(ctx.sink);
        return Ok(());
    }
    ctx.recovery.retrieval_ok();

    let mut sum_x = 0u64;
    let mut sum_y = 0u64;
    for avatar in &avatars {
        let center = avatar.center();
        sum_x += u64::from(center.x);
        sum_y += u64::from(center.y);
    }
    let count = avatars.len() as u64;
    let centroid = Point::new((sum_x / count) as u32, (sum_y / count) as u32);
    draw_cross(ctx.frame, AVATAR_MARK, centroid, 10);

    ctx.grid.ensure_built(ctx.frame.width(), ctx.frame.height());
    ctx.grid.refresh_costs(ctx.frame)?;
    let (Some(start), Some(goal)) = (ctx.grid.locate(centroid), ctx.grid.goal()) else {
        debug!("frame too small for navigation");
        return Ok(());
    };

    let path = ctx.grid.route(start, goal)?;
    debug!(from = %start, to = %goal, len = path.len(), "route ready");
    *ctx.route = Some(path);

    if ctx.grid_overlay {
        ctx.grid.draw(ctx.frame);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{entity, RecordingSink};
    use playbot_vision::Rect;

    struct Fixture {
        registry: TemplateRegistry,
        frame: RgbaImage,
        sink: RecordingSink,
        grid: TileGrid,
        recovery: Recovery,
        route: Option<Vec<TileCoord>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: TemplateRegistry::builtin().unwrap(),
                frame: RgbaImage::from_pixel(640, 480, Rgba([90, 90, 90, 255])),
                sink: RecordingSink::default(),
                grid: TileGrid::new(),
                recovery: Recovery::seeded(5),
                route: None,
            }
        }

        fn run(&mut self, handler: Handler, entities: &[Entity]) -> Result<(), HandlerError> {
            let mut ctx = HandlerCtx {
                entities,
                frame: &mut self.frame,
                sink: &self.sink,
                registry: &self.registry,
                grid: &mut self.grid,
                recovery: &mut self.recovery,
                grid_overlay: false,
                route: &mut self.route,
            };
            handler(&mut ctx)
        }

        fn id(&self, name: &str) -> TemplateId {
            self.registry.lookup(name).unwrap()
        }
    }

    #[test]
    fn wanted_requires_every_distinct_template() {
        let fx = Fixture::new();
        let option = fx.id("menu_option");
        let marker = fx.id("marker_red");
        let entities = vec![entity(1, Rect::new(0, 0, 107, 39), Some(option))];
        assert!(matches!(
            wanted(&entities, &[option, marker]),
            Err(HandlerError::IncompleteSet)
        ));

        let entities = vec![
            entity(1, Rect::new(0, 0, 107, 39), Some(option)),
            entity(2, Rect::new(0, 50, 15, 65), Some(marker)),
        ];
        assert_eq!(wanted(&entities, &[option, marker]).unwrap().len(), 2);
        // Duplicate wishes only count distinct templates.
        assert_eq!(wanted(&entities, &[option, option]).unwrap().len(), 1);
    }

    #[test]
    fn menu_marker_left_of_target_moves_right() {
        let mut fx = Fixture::new();
        let option = fx.id("menu_option");
        let marker = fx.id("marker_red");
        let entities = vec![
            entity(1, Rect::new(446, 300, 553, 339), Some(option)),
            entity(2, Rect::new(292, 310, 307, 325), Some(marker)),
        ];
        fx.run(battle_menu, &entities).unwrap();
        assert_eq!(fx.sink.presses(), vec![Key::Right]);
    }

    #[test]
    fn menu_marker_right_of_target_moves_left() {
        let mut fx = Fixture::new();
        let option = fx.id("menu_option");
        let marker = fx.id("marker_red");
        let entities = vec![
            entity(1, Rect::new(100, 300, 207, 339), Some(option)),
            entity(2, Rect::new(392, 310, 407, 325), Some(marker)),
        ];
        fx.run(battle_menu, &entities).unwrap();
        assert_eq!(fx.sink.presses(), vec![Key::Left]);
    }

    #[test]
    fn menu_aligned_marker_confirms() {
        let mut fx = Fixture::new();
        let option = fx.id("menu_option");
        let marker = fx.id("marker_red");
        // Both centers at x = 253.
        let entities = vec![
            entity(1, Rect::new(200, 300, 307, 339), Some(option)),
            entity(2, Rect::new(246, 310, 261, 325), Some(marker)),
        ];
        fx.run(battle_menu, &entities).unwrap();
        assert_eq!(fx.sink.presses(), vec![Key::Confirm]);
    }

    #[test]
    fn menu_targets_the_rightmost_option() {
        let mut fx = Fixture::new();
        let option = fx.id("menu_option");
        let marker = fx.id("marker_red");
        let entities = vec![
            entity(1, Rect::new(100, 300, 207, 339), Some(option)),
            entity(2, Rect::new(300, 300, 407, 339), Some(option)),
            // Marker sits between the two options: must steer right,
            // toward the rightmost.
            entity(3, Rect::new(246, 310, 261, 325), Some(marker)),
        ];
        fx.run(battle_menu, &entities).unwrap();
        assert_eq!(fx.sink.presses(), vec![Key::Right]);
    }

    #[test]
    fn incomplete_menu_set_is_a_soft_failure() {
        let mut fx = Fixture::new();
        let option = fx.id("menu_option");
        let entities = vec![entity(1, Rect::new(0, 0, 107, 39), Some(option))];
        fx.run(battle_menu, &entities).unwrap();
        assert!(fx.sink.presses().is_empty());
        assert_eq!(fx.recovery.retrieval_failures(), 1);
    }

    #[test]
    fn dialogue_skips_then_advances() {
        let mut fx = Fixture::new();
        fx.run(dialogue, &[]).unwrap();
        assert_eq!(fx.sink.presses(), vec![Key::Cancel, Key::Confirm]);
    }

    #[test]
    fn save_prompt_confirms_when_marker_is_left() {
        let mut fx = Fixture::new();
        let marker = fx.id("marker_red");
        let prompt = fx.id("save_prompt");
        let entities = vec![
            entity(1, Rect::new(50, 200, 65, 215), Some(marker)),
            entity(2, Rect::new(100, 150, 513, 313), Some(prompt)),
        ];
        fx.run(save_prompt, &entities).unwrap();
        assert_eq!(fx.sink.presses(), vec![Key::Confirm, Key::Confirm]);
    }

    #[test]
    fn save_prompt_steps_left_when_marker_is_right() {
        let mut fx = Fixture::new();
        let marker = fx.id("marker_red");
        let prompt = fx.id("save_prompt");
        let entities = vec![
            entity(1, Rect::new(500, 200, 515, 215), Some(marker)),
            entity(2, Rect::new(100, 150, 513, 313), Some(prompt)),
        ];
        fx.run(save_prompt, &entities).unwrap();
        assert_eq!(
            fx.sink.presses(),
            vec![Key::Left, Key::Confirm, Key::Confirm]
        );
    }

    #[test]
    fn roaming_routes_to_the_goal_and_stores_the_path() {
        let mut fx = Fixture::new();
        let face = fx.id("avatar_face_front");
        let torso = fx.id("avatar_torso");
        let entities = vec![
            entity(1, Rect::new(60, 100, 87, 121), Some(face)),
            entity(2, Rect::new(62, 121, 85, 138), Some(torso)),
        ];
        fx.run(roaming, &entities).unwrap();
        let route = fx.route.as_ref().expect("route stored");
        assert_eq!(route.last().copied(), fx.grid.goal());
    }

    #[test]
    fn roaming_without_avatar_is_a_soft_failure() {
        let mut fx = Fixture::new();
        fx.run(roaming, &[]).unwrap();
        assert!(fx.route.is_none());
        assert_eq!(fx.recovery.retrieval_failures(), 1);
    }

    #[test]
    fn battle_idle_refreshes_the_grid() {
        let mut fx = Fixture::new();
        let marker = fx.id("marker_red");
        let entities = vec![entity(1, Rect::new(292, 310, 307, 325), Some(marker))];
        fx.run(battle_idle, &entities).unwrap();
        assert!(fx.grid.is_built());
        assert!(fx.sink.presses().is_empty());
    }
}
