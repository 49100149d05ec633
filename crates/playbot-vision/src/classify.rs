use image::{Rgba, RgbaImage};
use tracing::{debug, trace};

use playbot_data::{TemplateId, TemplateRegistry};

use crate::geometry::{Blob, Point, Rect};
use crate::VisionError;

/// One visual region detected in a single frame. Entities never outlive the
/// frame they were built from.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Sequential per-frame id, starting at 1. 0 means "no entity" and is
    /// never assigned.
    pub id: u32,
    pub bounds: Rect,
    /// Frame color sampled at the center of `bounds`.
    pub color: Rgba<u8>,
    /// The template this entity classified as, if any.
    pub template: Option<TemplateId>,
}

impl Entity {
    pub fn classified(&self) -> bool {
        self.template.is_some()
    }

    pub fn is(&self, template: TemplateId) -> bool {
        self.template == Some(template)
    }

    pub fn center(&self) -> Point {
        self.bounds.center()
    }
}

/// Sample the frame color at the center of `rect`, reporting an error when
/// the center falls outside the buffer.
pub fn sample_center(frame: &RgbaImage, rect: &Rect) -> Result<Rgba<u8>, VisionError> {
    let center = rect.center();
    if center.x >= frame.width() || center.y >= frame.height() {
        return Err(VisionError::SampleOutOfRange {
            x: center.x,
            y: center.y,
            width: frame.width(),
            height: frame.height(),
        });
    }
    Ok(*frame.get_pixel(center.x, center.y))
}

/// Turn segmented blobs into entities, classifying each against the
/// registry. The first template in declaration order that matches wins;
/// entities matching nothing are kept unclassified. Empty contours are
/// dropped.
pub fn classify(
    frame: &RgbaImage,
    blobs: &[Blob],
    registry: &TemplateRegistry,
) -> Result<Vec<Entity>, VisionError> {
    let mut entities = Vec::with_capacity(blobs.len());
    let mut next_id = 1u32;

    for blob in blobs {
        let Some(bounds) = Rect::bounding(blob) else {
            trace!("skipping empty contour");
            continue;
        };
        let color = sample_center(frame, &bounds)?;

        let mut template = None;
        for (id, candidate) in registry.iter() {
            if candidate.matches(bounds.width(), bounds.height(), color) {
                template = Some(id);
                break;
            }
        }

        if let Some(id) = template {
            trace!(
                entity = next_id,
                template = registry.get(id).name,
                "classified"
            );
        }

        entities.push(Entity {
            id: next_id,
            bounds,
            color,
            template,
        });
        next_id += 1;
    }

    debug!(
        total = entities.len(),
        classified = entities.iter().filter(|e| e.classified()).count(),
        "frame classified"
    );
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use playbot_data::{Template, SHAPE_ONLY};

    fn fill(frame: &mut RgbaImage, rect: &Rect, color: Rgba<u8>) {
        for y in rect.min.y..rect.max.y.min(frame.height()) {
            for x in rect.min.x..rect.max.x.min(frame.width()) {
                frame.put_pixel(x, y, color);
            }
        }
    }

    fn corner_blob(rect: Rect) -> Blob {
        vec![rect.min, rect.max]
    }

    fn registry(templates: Vec<Template>) -> TemplateRegistry {
        TemplateRegistry::new(templates).unwrap()
    }

    #[test]
    fn ids_are_sequential_from_one() {
        let frame = RgbaImage::new(100, 100);
        let registry = registry(vec![]);
        let blobs = vec![
            corner_blob(Rect::new(0, 0, 10, 10)),
            corner_blob(Rect::new(20, 20, 30, 30)),
            corner_blob(Rect::new(40, 40, 50, 50)),
        ];
        let entities = classify(&frame, &blobs, &registry).unwrap();
        let ids: Vec<u32> = entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn unmatched_entities_are_retained_unclassified() {
        let frame = RgbaImage::new(100, 100);
        let registry = registry(vec![Template::new(
            "m",
            15,
            15,
            Rgba([255, 0, 0, 255]),
            None,
        )]);
        let entities = classify(&frame, &[corner_blob(Rect::new(0, 0, 60, 60))], &registry)
            .unwrap();
        assert_eq!(entities.len(), 1);
        assert!(!entities[0].classified());
    }

    #[test]
    fn color_match_is_exact_and_size_is_per_axis() {
        let mut frame = RgbaImage::new(100, 100);
        let red = Rgba([255, 0, 0, 255]);
        let rect = Rect::new(10, 10, 28, 25);
        fill(&mut frame, &rect, red);

        let registry = registry(vec![Template::new("m", 15, 15, red, None)]);
        // 18x15: both axes within the default tolerance of 3.
        let entities = classify(&frame, &[corner_blob(rect)], &registry).unwrap();
        assert!(entities[0].classified());

        // 19x15: width off by 4, must not classify.
        let wide = Rect::new(10, 10, 29, 25);
        fill(&mut frame, &wide, red);
        let entities = classify(&frame, &[corner_blob(wide)], &registry).unwrap();
        assert!(!entities[0].classified());
    }

    #[test]
    fn shape_only_template_matches_any_color() {
        let mut frame = RgbaImage::new(100, 100);
        let rect = Rect::new(10, 10, 25, 25);
        fill(&mut frame, &rect, Rgba([0, 200, 50, 255]));

        let registry = registry(vec![Template::new("box", 15, 15, SHAPE_ONLY, None)]);
        let entities = classify(&frame, &[corner_blob(rect)], &registry).unwrap();
        assert!(entities[0].classified());
    }

    #[test]
    fn first_matching_template_wins() {
        let mut frame = RgbaImage::new(100, 100);
        let rect = Rect::new(10, 10, 25, 25);
        fill(&mut frame, &rect, Rgba([7, 7, 7, 255]));

        // Both templates match a 15x15 blob of any color.
        let registry = registry(vec![
            Template::new("earlier", 15, 15, SHAPE_ONLY, None),
            Template::new("later", 15, 15, SHAPE_ONLY, None),
        ]);
        let entities = classify(&frame, &[corner_blob(rect)], &registry).unwrap();
        let id = entities[0].template.unwrap();
        assert_eq!(registry.get(id).name, "earlier");
    }

    #[test]
    fn sample_outside_frame_is_reported() {
        let frame = RgbaImage::new(10, 10);
        let rect = Rect::new(0, 0, 40, 40);
        assert!(matches!(
            sample_center(&frame, &rect),
            Err(VisionError::SampleOutOfRange { x: 20, y: 20, .. })
        ));
    }

    #[test]
    fn sampled_color_is_center_pixel() {
        let mut frame = RgbaImage::new(50, 50);
        frame.put_pixel(15, 15, Rgba([1, 2, 3, 255]));
        let rect = Rect::new(10, 10, 20, 20);
        assert_eq!(sample_center(&frame, &rect).unwrap(), Rgba([1, 2, 3, 255]));
    }
}
