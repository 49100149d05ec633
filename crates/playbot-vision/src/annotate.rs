//! Drawing primitives for the annotated frame returned to the host. All
//! writes clip to the frame bounds.

use image::{Rgba, RgbaImage};

use playbot_data::TemplateRegistry;

use crate::classify::Entity;
use crate::geometry::{Point, Rect};

/// Box color for entities without a usable display color.
pub const NEUTRAL_GRAY: Rgba<u8> = Rgba([193, 193, 193, 255]);

pub fn hline(frame: &mut RgbaImage, color: Rgba<u8>, x1: u32, y: u32, x2: u32) {
    if y >= frame.height() {
        return;
    }
    for x in x1..=x2.min(frame.width().saturating_sub(1)) {
        frame.put_pixel(x, y, color);
    }
}

pub fn vline(frame: &mut RgbaImage, color: Rgba<u8>, x: u32, y1: u32, y2: u32) {
    if x >= frame.width() {
        return;
    }
    for y in y1..=y2.min(frame.height().saturating_sub(1)) {
        frame.put_pixel(x, y, color);
    }
}

/// Outline a rectangle.
pub fn draw_rect(frame: &mut RgbaImage, color: Rgba<u8>, rect: &Rect) {
    hline(frame, color, rect.min.x, rect.min.y, rect.max.x);
    hline(frame, color, rect.min.x, rect.max.y, rect.max.x);
    vline(frame, color, rect.min.x, rect.min.y, rect.max.y);
    vline(frame, color, rect.max.x, rect.min.y, rect.max.y);
}

/// Mark a point with a small cross.
pub fn draw_cross(frame: &mut RgbaImage, color: Rgba<u8>, at: Point, arm: u32) {
    hline(frame, color, at.x.saturating_sub(arm), at.y, at.x + arm);
    vline(frame, color, at.x, at.y.saturating_sub(arm), at.y + arm);
}

/// Outline every entity: classified entities in their sampled color,
/// shape-only classifications and unclassified entities in gray.
pub fn annotate_entities(frame: &mut RgbaImage, entities: &[Entity], registry: &TemplateRegistry) {
    for entity in entities {
        let color = match entity.template {
            Some(id) if !registry.get(id).shape_only() => entity.color,
            _ => NEUTRAL_GRAY,
        };
        draw_rect(frame, color, &entity.bounds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_clip_to_frame() {
        let mut frame = RgbaImage::new(10, 10);
        let red = Rgba([255, 0, 0, 255]);
        hline(&mut frame, red, 5, 3, 50);
        vline(&mut frame, red, 3, 5, 50);
        hline(&mut frame, red, 0, 20, 9);
        assert_eq!(*frame.get_pixel(9, 3), red);
        assert_eq!(*frame.get_pixel(3, 9), red);
    }

    #[test]
    fn draw_rect_outlines_bounds() {
        let mut frame = RgbaImage::new(20, 20);
        let blue = Rgba([0, 0, 255, 255]);
        draw_rect(&mut frame, blue, &Rect::new(2, 2, 8, 8));
        assert_eq!(*frame.get_pixel(2, 2), blue);
        assert_eq!(*frame.get_pixel(8, 8), blue);
        assert_eq!(*frame.get_pixel(5, 2), blue);
        // Interior untouched.
        assert_eq!(*frame.get_pixel(5, 5), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn cross_is_centered() {
        let mut frame = RgbaImage::new(20, 20);
        let red = Rgba([255, 0, 0, 255]);
        draw_cross(&mut frame, red, Point::new(10, 10), 3);
        assert_eq!(*frame.get_pixel(7, 10), red);
        assert_eq!(*frame.get_pixel(13, 10), red);
        assert_eq!(*frame.get_pixel(10, 7), red);
        assert_eq!(*frame.get_pixel(10, 13), red);
    }
}
