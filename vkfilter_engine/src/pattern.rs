//! Synthetic RGBA8 test patterns
//!
//! Used as a stand-in frame producer when no decoder or camera is attached.
//! Every generator returns a tightly packed `width * height * 4` buffer.

use std::f32::consts::PI;

use crate::graphics_device::Extent2D;

/// Default checkerboard cell size in pixels
pub const CHECKER_CELL: u32 = 50;

/// Phase step per animation frame
pub const PHASE_STEP: f32 = 0.05;

fn generate(extent: Extent2D, mut texel: impl FnMut(u32, u32) -> [u8; 4]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(extent.rgba_len());
    for y in 0..extent.height {
        for x in 0..extent.width {
            pixels.extend_from_slice(&texel(x, y));
        }
    }
    pixels
}

pub fn solid(extent: Extent2D, rgba: [u8; 4]) -> Vec<u8> {
    rgba.repeat(extent.width as usize * extent.height as usize)
}

/// Red on the left fading to blue on the right
pub fn gradient(extent: Extent2D) -> Vec<u8> {
    let width = extent.width.max(1) as u64;
    generate(extent, |x, _| {
        let r = (255 * x as u64 / width) as u8;
        let b = (255 * (width - x as u64) / width) as u8;
        [r, 0, b, 255]
    })
}

/// Black and white squares; the top-left cell is white
pub fn checkerboard(extent: Extent2D, cell: u32) -> Vec<u8> {
    let cell = cell.max(1);
    generate(extent, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            [255, 255, 255, 255]
        } else {
            [0, 0, 0, 255]
        }
    })
}

/// Grey rings around the centre, moving outward as `phase` grows
pub fn circles(extent: Extent2D, phase: f32) -> Vec<u8> {
    let cx = extent.width as f32 / 2.0;
    let cy = extent.height as f32 / 2.0;
    generate(extent, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let distance = (dx * dx + dy * dy).sqrt();
        let v = ((distance / 20.0 - phase).sin() * 127.0 + 128.0) as u8;
        [v, v, v, 255]
    })
}

/// Classic sum-of-sines plasma mapped onto a cycling palette
pub fn plasma(extent: Extent2D, time: f32) -> Vec<u8> {
    generate(extent, |x, y| {
        let fx = x as f32;
        let fy = y as f32;
        let v = (fx / 16.0 + time).sin()
            + (fy / 8.0 - time).sin()
            + ((fx + fy) / 16.0).sin()
            + ((fx * fx + fy * fy).sqrt() / 8.0 + time).sin();
        let n = (v / 4.0 + 0.5).clamp(0.0, 1.0);
        let channel = |offset: f32| ((n * 2.0 * PI + offset).sin() * 127.0 + 128.0) as u8;
        [channel(0.0), channel(2.0 * PI / 3.0), channel(4.0 * PI / 3.0), 255]
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Checkerboard,
    Circles,
    Plasma,
}

/// Cycles checkerboard -> circles -> plasma as the phase advances
#[derive(Debug, Clone)]
pub struct PatternAnimator {
    extent: Extent2D,
    phase: f32,
}

impl PatternAnimator {
    pub fn new(extent: Extent2D) -> Self {
        Self { extent, phase: 0.0 }
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Pattern shown at the current phase (switches every 10 phase units)
    pub fn kind(&self) -> PatternKind {
        match (self.phase / 10.0) as usize % 3 {
            0 => PatternKind::Checkerboard,
            1 => PatternKind::Circles,
            _ => PatternKind::Plasma,
        }
    }

    /// Advance the phase and render the next frame
    pub fn next_frame(&mut self) -> Vec<u8> {
        self.phase += PHASE_STEP;
        match self.kind() {
            PatternKind::Checkerboard => checkerboard(self.extent, CHECKER_CELL),
            PatternKind::Circles => circles(self.extent, self.phase),
            PatternKind::Plasma => plasma(self.extent, self.phase),
        }
    }
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
