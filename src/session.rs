use std::sync::Arc;

use anyhow::{Context, Result};
use image::RgbaImage;
use serde::Serialize;
use tracing::debug;

use playbot_ai::{Ai, Phase, TileCoord};
use playbot_data::TemplateRegistry;
use playbot_vision::{annotate_entities, classify, Entity, Segmenter};
use playbot_window::InputSink;

/// One bot instance: registry, collaborators and the per-process AI state,
/// owned by the host's frame loop. No ambient statics; everything the
/// pipeline mutates lives here, and the host guarantees one
/// `process_frame` in flight at a time.
pub struct Session {
    registry: Arc<TemplateRegistry>,
    segmenter: Box<dyn Segmenter>,
    sink: Box<dyn InputSink>,
    ai: Ai,
    enabled: bool,
    entities: Vec<Entity>,
}

/// Snapshot of the last processed frame, for UI inspection.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub frame: u64,
    pub phase: &'static str,
    pub entities: usize,
    pub classified: usize,
    pub route_len: Option<usize>,
}

impl Session {
    /// Build a session with the curated registry and standard phase book.
    /// Any construction error here means a broken catalog or phase entry;
    /// callers should abort startup on it.
    pub fn new(segmenter: Box<dyn Segmenter>, sink: Box<dyn InputSink>) -> Result<Self> {
        let registry = Arc::new(
            TemplateRegistry::builtin().context("template catalog failed validation")?,
        );
        let ai = Ai::new(Arc::clone(&registry)).context("phase book failed validation")?;
        Ok(Self {
            registry,
            segmenter,
            sink,
            ai,
            enabled: true,
            entities: Vec::new(),
        })
    }

    /// Build with a caller-supplied registry and phase book.
    pub fn with_parts(
        registry: Arc<TemplateRegistry>,
        phases: Vec<Phase>,
        segmenter: Box<dyn Segmenter>,
        sink: Box<dyn InputSink>,
    ) -> Result<Self> {
        let ai = Ai::with_phases(Arc::clone(&registry), phases)
            .context("phase book failed validation")?;
        Ok(Self {
            registry,
            segmenter,
            sink,
            ai,
            enabled: true,
            entities: Vec::new(),
        })
    }

    /// Run one full pipeline pass over a captured frame, annotating it in
    /// place.
    ///
    /// Errors report what went wrong on this frame (attributed to a phase
    /// and frame number where applicable); the session stays valid and the
    /// next call proceeds normally.
    pub fn process_frame(&mut self, frame: &mut RgbaImage) -> Result<()> {
        let blobs = self.segmenter.segment(frame);
        let entities = classify(frame, &blobs, &self.registry)
            .with_context(|| format!("classification failed on frame {}", self.ai.frame_no() + 1))?;
        annotate_entities(frame, &entities, &self.registry);
        self.entities = entities;

        if !self.enabled {
            debug!("ai disabled, frame annotated only");
            return Ok(());
        }
        self.ai.observe(&self.entities, frame, self.sink.as_ref())?;
        Ok(())
    }

    pub fn current_phase_name(&self) -> &'static str {
        self.ai.current_phase_name()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn grid_overlay(&self) -> bool {
        self.ai.grid_overlay()
    }

    pub fn set_grid_overlay(&mut self, enabled: bool) {
        self.ai.set_grid_overlay(enabled);
    }

    /// All entities from the last processed frame, classified or not.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn classified(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.classified())
    }

    pub fn unclassified(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| !e.classified())
    }

    /// Route from the most recent navigation pass, if any.
    pub fn last_route(&self) -> Option<&[TileCoord]> {
        self.ai.last_route()
    }

    pub fn summary(&self) -> FrameSummary {
        FrameSummary {
            frame: self.ai.frame_no(),
            phase: self.ai.current_phase_name(),
            entities: self.entities.len(),
            classified: self.classified().count(),
            route_len: self.ai.last_route().map(|r| r.len()),
        }
    }

    /// The summary as a JSON payload, shaped for UI consumption.
    pub fn summary_json(&self) -> serde_json::Value {
        let summary = self.summary();
        serde_json::json!({
            "frame": summary.frame,
            "phase": summary.phase,
            "entities": summary.entities,
            "classified": summary.classified,
            "routeLen": summary.route_len,
        })
    }
}
