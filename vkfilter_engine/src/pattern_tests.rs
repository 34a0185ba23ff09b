//! Unit tests for pattern.rs

use crate::graphics_device::Extent2D;
use crate::pattern::*;

fn texel(pixels: &[u8], extent: Extent2D, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * extent.width + x) * 4) as usize;
    [pixels[offset], pixels[offset + 1], pixels[offset + 2], pixels[offset + 3]]
}

#[test]
fn test_every_generator_fills_the_extent() {
    let extent = Extent2D::new(33, 17);
    for pixels in [
        solid(extent, [1, 2, 3, 4]),
        gradient(extent),
        checkerboard(extent, 4),
        circles(extent, 0.5),
        plasma(extent, 0.5),
    ] {
        assert_eq!(pixels.len(), extent.rgba_len());
        assert!(pixels.chunks_exact(4).all(|p| p[3] == 255 || p == [1, 2, 3, 4]));
    }
}

#[test]
fn test_gradient_goes_from_blue_to_red() {
    let extent = Extent2D::new(256, 1);
    let pixels = gradient(extent);
    assert_eq!(texel(&pixels, extent, 0, 0), [0, 0, 255, 255]);
    let right = texel(&pixels, extent, 255, 0);
    assert!(right[0] > 250 && right[2] < 5);
    assert_eq!(right[1], 0);
}

#[test]
fn test_checkerboard_cells() {
    let extent = Extent2D::new(100, 100);
    let pixels = checkerboard(extent, CHECKER_CELL);
    assert_eq!(texel(&pixels, extent, 0, 0), [255, 255, 255, 255]);
    assert_eq!(texel(&pixels, extent, 49, 49), [255, 255, 255, 255]);
    assert_eq!(texel(&pixels, extent, 50, 0), [0, 0, 0, 255]);
    assert_eq!(texel(&pixels, extent, 0, 50), [0, 0, 0, 255]);
    assert_eq!(texel(&pixels, extent, 50, 50), [255, 255, 255, 255]);
}

#[test]
fn test_circles_are_grey_and_move_with_phase() {
    let extent = Extent2D::new(64, 64);
    let a = circles(extent, 0.0);
    let b = circles(extent, 1.0);
    assert!(a.chunks_exact(4).all(|p| p[0] == p[1] && p[1] == p[2]));
    assert_ne!(a, b);
}

#[test]
fn test_plasma_changes_over_time() {
    let extent = Extent2D::new(32, 32);
    assert_ne!(plasma(extent, 0.0), plasma(extent, 0.5));
    assert_eq!(plasma(extent, 0.25), plasma(extent, 0.25));
}

#[test]
fn test_animator_cycles_patterns() {
    let mut animator = PatternAnimator::new(Extent2D::new(8, 8));
    assert_eq!(animator.kind(), PatternKind::Checkerboard);

    let frame = animator.next_frame();
    assert_eq!(frame.len(), 8 * 8 * 4);
    assert!((animator.phase() - PHASE_STEP).abs() < 1e-6);

    let mut seen = vec![animator.kind()];
    for _ in 0..700 {
        animator.next_frame();
        if seen.last() != Some(&animator.kind()) {
            seen.push(animator.kind());
        }
    }
    assert_eq!(
        seen,
        vec![
            PatternKind::Checkerboard,
            PatternKind::Circles,
            PatternKind::Plasma,
            PatternKind::Checkerboard
        ]
    );
}
