/// Unit tests for MockGraphicsDevice
///
/// The mock is the oracle for every engine test, so its bookkeeping
/// (leaks, use-after-destroy, fences in flight) is checked here first.

use crate::graphics_device::mock_graphics_device::*;
use crate::graphics_device::{
    AcquireCode, ColorFormat, Extent2D, Fence, GraphicsDevice, OutputSurface, PresentMode,
    SubmitDesc, SwapchainDesc, Swapchain,
};
use crate::error::Error;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle};
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn target() -> OutputSurface {
    OutputSurface::new(
        RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
        RawWindowHandle::Xlib(XlibWindowHandle::new(1)),
    )
}

const TIMEOUT: Duration = Duration::from_millis(10);

// ============================================================================
// Handle tracking
// ============================================================================

#[test]
fn test_mock_tracks_live_handles() {
    let mut mock = MockGraphicsDevice::new();
    let instance = mock.create_instance("test", false).unwrap();
    let surface = mock.create_surface(instance, &target()).unwrap();
    assert_eq!(mock.live_count(), 2);

    mock.destroy_surface(instance, surface);
    mock.destroy_instance(instance);
    assert_eq!(mock.live_count(), 0);
    assert!(mock.violations().is_empty());
}

#[test]
fn test_mock_flags_use_after_destroy() {
    let mut mock = MockGraphicsDevice::new();
    let instance = mock.create_instance("test", false).unwrap();
    mock.destroy_instance(instance);

    let _ = mock.create_surface(instance, &target());
    let violations = mock.violations();
    assert_eq!(violations.len(), 1);
    assert!(violations[0].contains("used after destroy"));
}

#[test]
fn test_mock_flags_double_destroy() {
    let mut mock = MockGraphicsDevice::new();
    let instance = mock.create_instance("test", false).unwrap();
    mock.destroy_instance(instance);
    mock.destroy_instance(instance);
    assert!(mock.violations()[0].contains("destroyed twice"));
}

#[test]
fn test_mock_destroying_parent_retires_children() {
    let mut mock = MockGraphicsDevice::new();
    let instance = mock.create_instance("test", false).unwrap();
    let surface = mock.create_surface(instance, &target()).unwrap();
    let adapter = mock.select_physical_device(instance, surface).unwrap();
    let (device, queue) = mock.create_device(adapter.physical_device, 0).unwrap();

    mock.destroy_device(device);
    assert_eq!(mock.live_of_kind("queue"), 0);

    let fence = crate::graphics_device::Fence(999);
    let semaphore = crate::graphics_device::Semaphore(998);
    let _ = mock.queue_submit(queue, &SubmitDesc {
        command_buffer: None,
        wait: semaphore,
        signal: None,
        fence,
    });
    assert!(mock.violations().iter().any(|v| v.contains("queue") && v.contains("used after destroy")));
}

// ============================================================================
// Failure injection
// ============================================================================

#[test]
fn test_mock_fail_on_nth_call() {
    let mut mock = MockGraphicsDevice::new();
    mock.fail_on("create_instance", 2);

    assert!(mock.create_instance("a", false).is_ok());
    match mock.create_instance("b", false) {
        Err(Error::BackendError(msg)) => assert!(msg.contains("create_instance")),
        other => panic!("expected injected failure, got {:?}", other),
    }
    assert!(mock.create_instance("c", false).is_ok());
    assert_eq!(mock.call_count("create_instance"), 3);
}

#[test]
fn test_mock_fail_on_counts_from_now() {
    let mut mock = MockGraphicsDevice::new();
    mock.create_instance("a", false).unwrap();
    mock.fail_on("create_instance", 1);
    assert!(mock.create_instance("b", false).is_err());
}

// ============================================================================
// Swapchain & frame loop
// ============================================================================

struct Fixture {
    mock: MockGraphicsDevice,
    device: crate::graphics_device::Device,
    queue: crate::graphics_device::Queue,
    swapchain: Swapchain,
}

fn fixture(image_count: u32) -> Fixture {
    let mut mock = MockGraphicsDevice::new();
    let instance = mock.create_instance("test", false).unwrap();
    let surface = mock.create_surface(instance, &target()).unwrap();
    let adapter = mock.select_physical_device(instance, surface).unwrap();
    let (device, queue) = mock.create_device(adapter.physical_device, 0).unwrap();
    let swapchain = mock
        .create_swapchain(device, &SwapchainDesc {
            surface,
            format: ColorFormat::B8G8R8A8_UNORM,
            extent: Extent2D::new(64, 64),
            image_count,
            present_mode: PresentMode::Fifo,
            old_swapchain: Swapchain::NULL,
        })
        .unwrap();
    Fixture { mock, device, queue, swapchain }
}

#[test]
fn test_mock_acquire_cycles_images() {
    let mut f = fixture(3);
    let semaphore = f.mock.create_semaphore(f.device).unwrap();
    let indices: Vec<u32> = (0..4)
        .map(|_| f.mock.acquire_next_image(f.device, f.swapchain, semaphore, TIMEOUT).index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 0]);
}

#[test]
fn test_mock_out_of_date_acquire() {
    let mut f = fixture(2);
    let semaphore = f.mock.create_semaphore(f.device).unwrap();
    f.mock.out_of_date_acquires(1);

    let result = f.mock.acquire_next_image(f.device, f.swapchain, semaphore, TIMEOUT);
    assert!(!result.succeeded);
    assert_eq!(result.code, AcquireCode::OutOfDate);

    let result = f.mock.acquire_next_image(f.device, f.swapchain, semaphore, TIMEOUT);
    assert!(result.succeeded);
}

#[test]
fn test_mock_fence_in_flight_accounting() {
    let mut f = fixture(2);
    let semaphore = f.mock.create_semaphore(f.device).unwrap();
    let a = f.mock.create_fence(f.device, false).unwrap();
    let b = f.mock.create_fence(f.device, false).unwrap();

    for fence in [a, b] {
        f.mock
            .queue_submit(f.queue, &SubmitDesc { command_buffer: None, wait: semaphore, signal: None, fence })
            .unwrap();
    }
    assert_eq!(f.mock.in_flight(), 2);

    assert!(f.mock.wait_for_fence(f.device, a, TIMEOUT).unwrap());
    assert_eq!(f.mock.in_flight(), 1);
    assert_eq!(f.mock.max_in_flight(), 2);
    assert!(f.mock.violations().is_empty());
}

#[test]
fn test_mock_flags_semaphore_signaled_twice() {
    let mut f = fixture(3);
    let semaphore = f.mock.create_semaphore(f.device).unwrap();
    let fence = f.mock.create_fence(f.device, false).unwrap();
    assert!(f.mock.acquire_next_image(f.device, f.swapchain, semaphore, TIMEOUT).succeeded);

    // Consumed by a fenceless submit, so the next acquire is fine
    f.mock
        .queue_submit(f.queue, &SubmitDesc { command_buffer: None, wait: semaphore, signal: None, fence: Fence::NULL })
        .unwrap();
    assert_eq!(f.mock.in_flight(), 0);
    assert!(f.mock.acquire_next_image(f.device, f.swapchain, semaphore, TIMEOUT).succeeded);
    assert!(f.mock.violations().is_empty(), "{:?}", f.mock.violations());

    let other = f.mock.create_semaphore(f.device).unwrap();
    f.mock
        .queue_submit(f.queue, &SubmitDesc { command_buffer: None, wait: other, signal: Some(semaphore), fence })
        .unwrap();
    assert!(f.mock.violations()[0].contains("already signaled"));
}

#[test]
fn test_mock_flags_submit_with_signaled_fence() {
    let mut f = fixture(2);
    let semaphore = f.mock.create_semaphore(f.device).unwrap();
    let fence = f.mock.create_fence(f.device, true).unwrap();
    f.mock
        .queue_submit(f.queue, &SubmitDesc { command_buffer: None, wait: semaphore, signal: None, fence })
        .unwrap();
    assert!(f.mock.violations()[0].contains("not reset"));
}

#[test]
fn test_mock_flags_wait_on_fence_that_never_signals() {
    let mut f = fixture(2);
    let fence = f.mock.create_fence(f.device, false).unwrap();
    assert!(!f.mock.wait_for_fence(f.device, fence, TIMEOUT).unwrap());
    assert!(f.mock.violations()[0].contains("can never signal"));
}

#[test]
fn test_mock_flags_destroy_while_pending() {
    let mut f = fixture(2);
    let semaphore = f.mock.create_semaphore(f.device).unwrap();
    let fence = f.mock.create_fence(f.device, false).unwrap();
    f.mock
        .queue_submit(f.queue, &SubmitDesc { command_buffer: None, wait: semaphore, signal: None, fence })
        .unwrap();

    f.mock.destroy_swapchain(f.device, f.swapchain);
    assert!(f.mock.violations()[0].contains("still pending"));
}

#[test]
fn test_mock_wait_idle_completes_pending_work() {
    let mut f = fixture(2);
    let semaphore = f.mock.create_semaphore(f.device).unwrap();
    let fence = f.mock.create_fence(f.device, false).unwrap();
    f.mock
        .queue_submit(f.queue, &SubmitDesc { command_buffer: None, wait: semaphore, signal: None, fence })
        .unwrap();

    f.mock.device_wait_idle(f.device).unwrap();
    assert_eq!(f.mock.in_flight(), 0);
    f.mock.destroy_swapchain(f.device, f.swapchain);
    assert!(f.mock.violations().is_empty());
}

// ============================================================================
// Sampling
// ============================================================================

#[test]
fn test_mock_upload_is_visible_through_view() {
    let f = fixture(2);
    let mut mock = f.mock.clone();
    let pool = mock.create_command_pool(f.device, 0).unwrap();
    let texture = mock.create_texture(f.device, Extent2D::new(1, 1)).unwrap();

    mock.upload_texture(f.device, f.queue, pool, &texture, &[1, 2, 3, 4]).unwrap();
    assert_eq!(mock.uploaded(texture.view), Some(vec![1, 2, 3, 4]));
    assert!(mock.violations().is_empty());
}

#[test]
fn test_mock_flags_upload_size_mismatch() {
    let f = fixture(2);
    let mut mock = f.mock.clone();
    let pool = mock.create_command_pool(f.device, 0).unwrap();
    let texture = mock.create_texture(f.device, Extent2D::new(2, 2)).unwrap();

    mock.upload_texture(f.device, f.queue, pool, &texture, &[0; 4]).unwrap();
    assert!(mock.violations()[0].contains("upload_texture"));
}
