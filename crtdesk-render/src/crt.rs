//! CRT look applied after every redraw of the monitor surface.

use crtdesk_core::CrtSettings;
use image::RgbaImage;
use rand::Rng;
use rayon::prelude::*;

pub fn apply_crt_effect<R: Rng + ?Sized>(canvas: &mut RgbaImage, settings: &CrtSettings, rng: &mut R) {
    tint_and_scanlines(canvas, settings);
    add_noise(canvas, settings, rng);
}

/// Multiply-blends a translucent green over the canvas, then darkens every
/// `scanline_spacing`-th row.
fn tint_and_scanlines(canvas: &mut RgbaImage, settings: &CrtSettings) {
    let width = canvas.width() as usize;
    if width == 0 {
        return;
    }
    // multiply with rgb(0, 255, 0) keeps green and scales red/blue by (1 - alpha)
    let tint_keep = 1.0 - settings.tint_alpha.clamp(0.0, 1.0);
    let scan_keep = 1.0 - settings.scanline_alpha.clamp(0.0, 1.0);
    let spacing = settings.scanline_spacing as usize;

    canvas
        .par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(row, pixels)| {
            let scanline = spacing > 0 && row % spacing == 0;
            for px in pixels.chunks_exact_mut(4) {
                let mut r = px[0] as f32 * tint_keep;
                let mut g = px[1] as f32;
                let mut b = px[2] as f32 * tint_keep;
                if scanline {
                    r *= scan_keep;
                    g *= scan_keep;
                    b *= scan_keep;
                }
                px[0] = r.round() as u8;
                px[1] = g.round() as u8;
                px[2] = b.round() as u8;
            }
        });
}

fn add_noise<R: Rng + ?Sized>(canvas: &mut RgbaImage, settings: &CrtSettings, rng: &mut R) {
    let (probability, amplitude) = (settings.noise_probability, settings.noise_amplitude.abs());
    if !probability.is_finite() || !amplitude.is_finite() {
        return;
    }
    let probability = probability.clamp(0.0, 1.0);
    if probability == 0.0 || amplitude == 0.0 {
        return;
    }
    for px in canvas.chunks_exact_mut(4) {
        if !rng.gen_bool(probability) {
            continue;
        }
        let noise = rng.gen_range(-amplitude..amplitude);
        for channel in &mut px[..3] {
            *channel = (*channel as f32 + noise).clamp(0.0, 255.0) as u8;
        }
    }
}
