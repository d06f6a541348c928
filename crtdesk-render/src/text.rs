//! 8x8 bitmap text for the placeholder and error displays.

use font8x8::legacy::BASIC_LEGACY;
use image::{Rgba, RgbaImage};

pub const GLYPH_SIZE: u32 = 8;

fn glyph_for_char(ch: char) -> [u8; 8] {
    let index = ch as usize;
    if index < BASIC_LEGACY.len() {
        BASIC_LEGACY[index]
    } else {
        BASIC_LEGACY[b'?' as usize]
    }
}

pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_SIZE * scale
}

/// Draws `text` with its top-left corner at `(x, y)`; pixels outside the
/// canvas are skipped.
pub fn draw_text(canvas: &mut RgbaImage, text: &str, x: i64, y: i64, scale: u32, color: Rgba<u8>) {
    let scale = scale.max(1) as i64;
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    for (col, ch) in text.chars().enumerate() {
        let glyph = glyph_for_char(ch);
        let origin_x = x + col as i64 * GLYPH_SIZE as i64 * scale;
        for (row, bits) in glyph.iter().enumerate() {
            for bit in 0..GLYPH_SIZE as i64 {
                if (bits >> bit) & 0x01 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    let py = y + row as i64 * scale + dy;
                    if py < 0 || py >= height {
                        continue;
                    }
                    for dx in 0..scale {
                        let px = origin_x + bit * scale + dx;
                        if px < 0 || px >= width {
                            continue;
                        }
                        canvas.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

/// Draws `text` centred on `(center_x, center_y)`.
pub fn draw_text_centered(
    canvas: &mut RgbaImage,
    text: &str,
    center_x: i64,
    center_y: i64,
    scale: u32,
    color: Rgba<u8>,
) {
    let half_width = text_width(text, scale) as i64 / 2;
    let half_height = (GLYPH_SIZE * scale.max(1)) as i64 / 2;
    draw_text(
        canvas,
        text,
        center_x - half_width,
        center_y - half_height,
        scale,
        color,
    );
}
