//! Static catalog of the visual templates the bot can recognize, plus the
//! named groupings (avatar fragments, markers, dialogue) that phase
//! definitions are built from. Read-only after construction.

use std::collections::HashMap;

use image::Rgba;
use thiserror::Error;
use tracing::info;

/// Per-axis size slack applied when a template does not override it.
pub const DEFAULT_TOLERANCE: u32 = 3;

/// Templates with this expected color are matched by size alone; the
/// sampled entity color is ignored.
pub const SHAPE_ONLY: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("template name must not be empty")]
    EmptyName,
    #[error("duplicate template name {0:?}")]
    DuplicateName(&'static str),
    #[error("unknown template {0:?}")]
    UnknownTemplate(String),
}

/// Index of a template within its registry. Stable for the registry's
/// lifetime; the registry never reorders after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId(usize);

impl TemplateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Expected size/color signature of one recognizable on-screen element.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub color: Rgba<u8>,
    /// `None` means [`DEFAULT_TOLERANCE`].
    pub tolerance: Option<u32>,
}

impl Template {
    pub fn new(
        name: &'static str,
        width: u32,
        height: u32,
        color: Rgba<u8>,
        tolerance: Option<u32>,
    ) -> Self {
        Self {
            name,
            width,
            height,
            color,
            tolerance,
        }
    }

    /// Whether this template matches on size alone.
    pub fn shape_only(&self) -> bool {
        self.color == SHAPE_ONLY
    }

    pub fn tolerance(&self) -> u32 {
        self.tolerance.unwrap_or(DEFAULT_TOLERANCE)
    }

    /// Match rule: exact color equality (unless shape-only) and size within
    /// tolerance on each axis independently.
    pub fn matches(&self, width: u32, height: u32, color: Rgba<u8>) -> bool {
        let t = self.tolerance();
        let size_ok = width.abs_diff(self.width) <= t && height.abs_diff(self.height) <= t;
        if self.shape_only() {
            size_ok
        } else {
            size_ok && color == self.color
        }
    }
}

/// Ordered template catalog with by-name lookup and curated id groups.
/// Declaration order is the classifier's tie-break order.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
    by_name: HashMap<&'static str, TemplateId>,
    avatar: Vec<TemplateId>,
    markers: Vec<TemplateId>,
    dialogue: Vec<TemplateId>,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<Template>) -> Result<Self, RegistryError> {
        Self::with_groups(templates, &[], &[], &[])
    }

    /// Build a registry and resolve the named groups. Any invalid template
    /// or unresolvable group member is a construction error; callers are
    /// expected to abort startup on it.
    pub fn with_groups(
        templates: Vec<Template>,
        avatar: &[&str],
        markers: &[&str],
        dialogue: &[&str],
    ) -> Result<Self, RegistryError> {
        let mut by_name = HashMap::with_capacity(templates.len());
        for (i, template) in templates.iter().enumerate() {
            if template.name.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if by_name.insert(template.name, TemplateId(i)).is_some() {
                return Err(RegistryError::DuplicateName(template.name));
            }
        }
        let mut registry = Self {
            templates,
            by_name,
            avatar: Vec::new(),
            markers: Vec::new(),
            dialogue: Vec::new(),
        };
        registry.avatar = registry.resolve_all(avatar)?;
        registry.markers = registry.resolve_all(markers)?;
        registry.dialogue = registry.resolve_all(dialogue)?;
        Ok(registry)
    }

    /// The curated catalog for the target game's visual vocabulary.
    pub fn builtin() -> Result<Self, RegistryError> {
        let registry = Self::with_groups(
            builtin_catalog(),
            &[
                "avatar_face_front",
                "avatar_face_side",
                "avatar_torso",
                "avatar_torso_side",
                "avatar_upper_body",
                "avatar_back",
            ],
            &["marker_red", "marker_green", "marker_blue"],
            &["dialogue_box"],
        )?;
        info!("template registry ready: {} templates", registry.len());
        Ok(registry)
    }

    fn resolve_all(&self, names: &[&str]) -> Result<Vec<TemplateId>, RegistryError> {
        names.iter().map(|n| self.lookup(n)).collect()
    }

    pub fn lookup(&self, name: &str) -> Result<TemplateId, RegistryError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownTemplate(name.to_string()))
    }

    pub fn get(&self, id: TemplateId) -> &Template {
        &self.templates[id.0]
    }

    /// Templates in declaration order, paired with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (TemplateId, &Template)> {
        self.templates
            .iter()
            .enumerate()
            .map(|(i, t)| (TemplateId(i), t))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The fragments the segmenter splits the player sprite into.
    pub fn avatar(&self) -> &[TemplateId] {
        &self.avatar
    }

    /// The movable marker in all its colors.
    pub fn markers(&self) -> &[TemplateId] {
        &self.markers
    }

    pub fn dialogue(&self) -> &[TemplateId] {
        &self.dialogue
    }
}

/// The fixed visual vocabulary. Sizes are in pixels at the negotiated
/// window resolution; black means shape-only.
fn builtin_catalog() -> Vec<Template> {
    let rgba = |r, g, b| Rgba([r, g, b, 255]);
    vec![
        // The wide box that holds narration and item text in the battle menu.
        Template::new("narration_box", 574, 139, SHAPE_ONLY, None),
        // The movable marker. Red is the plain mode; green and blue signal
        // the shield and gravity battle modes.
        Template::new("marker_red", 15, 15, rgba(255, 0, 0), None),
        Template::new("marker_green", 15, 15, rgba(0, 192, 0), None),
        Template::new("marker_blue", 15, 15, rgba(0, 60, 255), None),
        // Center strip of the attack gauge, the spot to stop the bar on.
        Template::new("attack_target", 18, 83, SHAPE_ONLY, None),
        // The big letter shown on the defeat screen.
        Template::new("game_over_emblem", 127, 79, rgba(254, 254, 254), None),
        // The segmenter sees the avatar as separate fragments per pose.
        Template::new("avatar_face_front", 27, 21, rgba(255, 201, 14), None),
        Template::new("avatar_face_side", 19, 21, rgba(255, 201, 14), None),
        Template::new("avatar_torso", 23, 17, rgba(230, 7, 248), None),
        Template::new("avatar_torso_side", 13, 17, rgba(61, 18, 14), None),
        // Overworld dialogue box. Its frame varies a little between rooms.
        Template::new("dialogue_box", 577, 151, SHAPE_ONLY, Some(20)),
        // The box the marker moves in while dodging.
        Template::new("battle_box", 164, 139, SHAPE_ONLY, None),
        // Checkpoint prompt offering save/return.
        Template::new("save_prompt", 413, 163, SHAPE_ONLY, None),
        Template::new("avatar_upper_body", 35, 49, rgba(255, 201, 14), None),
        Template::new("avatar_back", 39, 59, rgba(61, 18, 14), None),
        // The moving bar swept across the attack gauge.
        Template::new("attack_bar", 7, 123, rgba(255, 255, 255), None),
        Template::new("lever", 7, 23, SHAPE_ONLY, None),
        Template::new("training_dummy", 27, 19, rgba(239, 228, 176), None),
        Template::new("npc_front", 15, 7, rgba(255, 255, 255), Some(0)),
        Template::new("npc_side", 7, 7, rgba(86, 86, 211), None),
        // Room transition frame.
        Template::new("doorway", 65, 105, rgba(255, 255, 255), None),
        // One selectable option in the battle menu row.
        Template::new("menu_option", 107, 39, SHAPE_ONLY, None),
    ]
}
