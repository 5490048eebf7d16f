//! Frame state machine
//!
//! `Idle -> FrameStarted -> (RenderPassActive -> FrameStarted)* -> Idle`.
//! Reentry and out-of-order calls are programmer errors and panic. A frame cut
//! short by an error is closed with [`FrameScheduler::abort_frame`]. Stale
//! swapchains are rebuilt here; a zero-sized surface stalls the rebuild until
//! the window has a real size again.

use ash::vk;

use crate::core::MAX_FRAMES_IN_FLIGHT;
use crate::render::backends::vulkan::{AcquireOutcome, PresentOutcome, VulkanResult};
use crate::render::window::WindowSurface;

/// Operations the scheduler drives on the presentation side.
///
/// `slot` is always the scheduler's frame-slot cursor, `image_index` the
/// image returned by the matching acquire.
pub trait FrameBackend {
    /// Wait for the current slot's fence, then acquire an image
    fn acquire_next_image(&mut self) -> VulkanResult<AcquireOutcome>;

    /// Reset and begin the slot's command buffer
    fn begin_commands(&mut self, slot: usize) -> VulkanResult<vk::CommandBuffer>;

    /// Finish recording the slot's command buffer
    fn end_commands(&mut self, slot: usize) -> VulkanResult<()>;

    /// Transition attachments, begin rendering, set viewport and scissor
    fn begin_rendering(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// End rendering and transition attachments back for presentation
    fn end_rendering(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Submit the slot's commands and present `image_index`
    fn submit_and_present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Rebuild the swapchain at `extent`, which is never zero-sized
    fn recreate(&mut self, extent: vk::Extent2D) -> VulkanResult<()>;

    /// Drop whatever was recorded or acquired for the frame in `slot` and
    /// rebuild presentation at `extent`. The next frame uses `slot` again.
    fn discard_frame(&mut self, slot: usize, extent: vk::Extent2D) -> VulkanResult<()>;

    /// Current swapchain extent
    fn extent(&self) -> vk::Extent2D;
}

/// Where the scheduler is within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames
    Idle,
    /// Image acquired and commands recording
    FrameStarted,
    /// Inside a rendering pass
    RenderPassActive,
}

/// Bookkeeping for the frame in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Frame slot, `0..MAX_FRAMES_IN_FLIGHT`
    pub slot: usize,
    /// Acquired swapchain image
    pub image_index: u32,
    /// Command buffer being recorded for this frame
    pub command_buffer: vk::CommandBuffer,
    /// Swapchain extent at acquisition
    pub extent: vk::Extent2D,
}

/// Current framebuffer size, blocking on window events while either dimension is zero
pub fn wait_for_visible_extent(window: &mut dyn WindowSurface) -> vk::Extent2D {
    let (mut width, mut height) = window.framebuffer_extent();
    while width == 0 || height == 0 {
        window.wait_events();
        (width, height) = window.framebuffer_extent();
    }
    vk::Extent2D { width, height }
}

/// Drives begin/end frame and swapchain recreation over a [`FrameBackend`]
pub struct FrameScheduler<B: FrameBackend> {
    backend: B,
    phase: FramePhase,
    current_slot: usize,
    frame: Option<FrameContext>,
}

impl<B: FrameBackend> FrameScheduler<B> {
    /// Start idle at slot 0
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            phase: FramePhase::Idle,
            current_slot: 0,
            frame: None,
        }
    }

    /// Acquire an image and begin recording.
    ///
    /// Returns `None` when the swapchain was out of date; it has been rebuilt
    /// and the caller should skip drawing this iteration.
    pub fn begin_frame(&mut self, window: &mut dyn WindowSurface) -> VulkanResult<Option<FrameContext>> {
        assert_eq!(
            self.phase,
            FramePhase::Idle,
            "begin_frame called while a frame is already in progress"
        );

        let image_index = match self.backend.acquire_next_image()? {
            AcquireOutcome::Success(index) | AcquireOutcome::Suboptimal(index) => index,
            AcquireOutcome::OutOfDate => {
                self.recreate_swapchain(window)?;
                return Ok(None);
            }
        };

        let command_buffer = self.backend.begin_commands(self.current_slot)?;
        let frame = FrameContext {
            slot: self.current_slot,
            image_index,
            command_buffer,
            extent: self.backend.extent(),
        };
        self.frame = Some(frame);
        self.phase = FramePhase::FrameStarted;
        Ok(Some(frame))
    }

    /// Finish recording, submit, present, and rebuild the swapchain if needed.
    ///
    /// A pending resize is only acted on here, after the frame's work is queued.
    pub fn end_frame(&mut self, window: &mut dyn WindowSurface) -> VulkanResult<()> {
        assert_eq!(
            self.phase,
            FramePhase::FrameStarted,
            "end_frame called without a started frame outside a render pass"
        );
        let frame = self.active_frame();

        self.backend.end_commands(frame.slot)?;
        let outcome = self.backend.submit_and_present(frame.slot, frame.image_index)?;

        self.phase = FramePhase::Idle;
        self.frame = None;
        self.current_slot = (self.current_slot + 1) % MAX_FRAMES_IN_FLIGHT;

        let resized = window.take_resize_request();
        if outcome != PresentOutcome::Presented || resized {
            log::debug!("Recreating swapchain after present ({:?}, resized: {})", outcome, resized);
            self.recreate_swapchain(window)?;
        }
        Ok(())
    }

    /// Begin the rendering pass on the acquired image
    pub fn begin_render_pass(&mut self) -> VulkanResult<()> {
        assert_eq!(
            self.phase,
            FramePhase::FrameStarted,
            "begin_render_pass called outside a frame or inside another pass"
        );
        let frame = self.active_frame();
        self.backend.begin_rendering(frame.slot, frame.image_index)?;
        self.phase = FramePhase::RenderPassActive;
        Ok(())
    }

    /// End the rendering pass
    pub fn end_render_pass(&mut self) -> VulkanResult<()> {
        assert_eq!(
            self.phase,
            FramePhase::RenderPassActive,
            "end_render_pass called without an active pass"
        );
        let frame = self.active_frame();
        self.backend.end_rendering(frame.slot, frame.image_index)?;
        self.phase = FramePhase::FrameStarted;
        Ok(())
    }

    /// Close a frame that an error cut short.
    ///
    /// The backend discards the half-recorded frame and the scheduler returns
    /// to `Idle` without advancing the slot, so the next `begin_frame` starts
    /// cleanly. Does nothing between frames.
    pub fn abort_frame(&mut self, window: &mut dyn WindowSurface) -> VulkanResult<()> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        self.phase = FramePhase::Idle;
        log::warn!("Discarding interrupted frame in slot {}", frame.slot);

        let extent = wait_for_visible_extent(window);
        window.take_resize_request();
        self.backend.discard_frame(frame.slot, extent)
    }

    /// Command buffer of the frame in progress. Panics between frames.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        assert_ne!(
            self.phase,
            FramePhase::Idle,
            "command buffer requested outside an active frame"
        );
        self.active_frame().command_buffer
    }

    /// Rebuild the swapchain at the window's framebuffer size.
    ///
    /// Blocks on window events while either dimension is zero. Consumes the
    /// window's resize flag.
    pub fn recreate_swapchain(&mut self, window: &mut dyn WindowSurface) -> VulkanResult<()> {
        let extent = wait_for_visible_extent(window);
        window.take_resize_request();
        self.backend.recreate(extent)
    }

    /// Current phase
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Frame slot the next frame will use
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.backend.extent()
    }

    /// Presentation backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn active_frame(&self) -> FrameContext {
        match self.frame {
            Some(frame) => frame,
            None => panic!("no frame in progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::VulkanError;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Acquire,
        WaitFence(usize),
        WriteSlot(usize),
        Begin(usize),
        End(usize),
        Present(usize, u32),
        Recreate(u32, u32),
        Discard(usize, u32, u32),
    }

    /// Backend following a script of acquire and present results
    struct ScriptedBackend {
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        extent: vk::Extent2D,
        events: Vec<Event>,
        // slot whose submission the GPU has not finished
        pending: [bool; MAX_FRAMES_IN_FLIGHT],
        slot: usize,
        fail_rendering: bool,
        fail_submit: bool,
    }

    fn device_lost() -> VulkanError {
        VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                events: Vec::new(),
                pending: [false; MAX_FRAMES_IN_FLIGHT],
                slot: 0,
                fail_rendering: false,
                fail_submit: false,
            }
        }
    }

    impl FrameBackend for ScriptedBackend {
        fn acquire_next_image(&mut self) -> VulkanResult<AcquireOutcome> {
            self.events.push(Event::WaitFence(self.slot));
            self.pending[self.slot] = false;
            self.events.push(Event::Acquire);
            Ok(self.acquires.pop_front().unwrap_or(AcquireOutcome::Success(0)))
        }

        fn begin_commands(&mut self, slot: usize) -> VulkanResult<vk::CommandBuffer> {
            assert!(!self.pending[slot], "slot {} reused before its fence signalled", slot);
            self.events.push(Event::WriteSlot(slot));
            Ok(vk::CommandBuffer::null())
        }

        fn end_commands(&mut self, _slot: usize) -> VulkanResult<()> {
            Ok(())
        }

        fn begin_rendering(&mut self, slot: usize, _image_index: u32) -> VulkanResult<()> {
            if std::mem::take(&mut self.fail_rendering) {
                return Err(device_lost());
            }
            self.events.push(Event::Begin(slot));
            Ok(())
        }

        fn end_rendering(&mut self, slot: usize, _image_index: u32) -> VulkanResult<()> {
            self.events.push(Event::End(slot));
            Ok(())
        }

        fn submit_and_present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
            if std::mem::take(&mut self.fail_submit) {
                return Err(device_lost());
            }
            self.pending[slot] = true;
            self.slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT;
            self.events.push(Event::Present(slot, image_index));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn recreate(&mut self, extent: vk::Extent2D) -> VulkanResult<()> {
            assert!(extent.width > 0 && extent.height > 0);
            self.extent = extent;
            self.events.push(Event::Recreate(extent.width, extent.height));
            Ok(())
        }

        fn discard_frame(&mut self, slot: usize, extent: vk::Extent2D) -> VulkanResult<()> {
            // Device is idle after a discard
            self.pending = [false; MAX_FRAMES_IN_FLIGHT];
            self.slot = slot;
            self.extent = extent;
            self.events.push(Event::Discard(slot, extent.width, extent.height));
            Ok(())
        }

        fn extent(&self) -> vk::Extent2D {
            self.extent
        }
    }

    /// Window whose framebuffer size follows a script, one entry per query
    struct ScriptedWindow {
        extents: VecDeque<(u32, u32)>,
        last: (u32, u32),
        resized: bool,
        waits: usize,
    }

    impl ScriptedWindow {
        fn new(width: u32, height: u32) -> Self {
            Self {
                extents: VecDeque::new(),
                last: (width, height),
                resized: false,
                waits: 0,
            }
        }
    }

    impl WindowSurface for ScriptedWindow {
        fn framebuffer_extent(&self) -> (u32, u32) {
            self.extents.front().copied().unwrap_or(self.last)
        }

        fn resize_requested(&self) -> bool {
            self.resized
        }

        fn take_resize_request(&mut self) -> bool {
            std::mem::take(&mut self.resized)
        }

        fn wait_events(&mut self) {
            self.waits += 1;
            if let Some(extent) = self.extents.pop_front() {
                self.last = extent;
            }
            if let Some(&next) = self.extents.front() {
                self.last = next;
            }
        }
    }

    fn run_frame(scheduler: &mut FrameScheduler<ScriptedBackend>, window: &mut ScriptedWindow) -> bool {
        match scheduler.begin_frame(window).unwrap() {
            Some(_) => {
                scheduler.begin_render_pass().unwrap();
                scheduler.end_render_pass().unwrap();
                scheduler.end_frame(window).unwrap();
                true
            }
            None => false,
        }
    }

    #[test]
    fn test_frame_cycle_advances_slot() {
        let mut scheduler = FrameScheduler::new(ScriptedBackend::new());
        let mut window = ScriptedWindow::new(800, 600);

        assert!(run_frame(&mut scheduler, &mut window));
        assert_eq!(scheduler.current_slot(), 1);
        assert!(run_frame(&mut scheduler, &mut window));
        assert_eq!(scheduler.current_slot(), 0);
        assert_eq!(scheduler.phase(), FramePhase::Idle);
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn test_begin_frame_reentry_panics() {
        let mut scheduler = FrameScheduler::new(ScriptedBackend::new());
        let mut window = ScriptedWindow::new(800, 600);
        scheduler.begin_frame(&mut window).unwrap();
        let _ = scheduler.begin_frame(&mut window);
    }

    #[test]
    #[should_panic(expected = "without a started frame")]
    fn test_end_frame_without_begin_panics() {
        let mut scheduler = FrameScheduler::new(ScriptedBackend::new());
        let mut window = ScriptedWindow::new(800, 600);
        let _ = scheduler.end_frame(&mut window);
    }

    #[test]
    #[should_panic(expected = "outside an active frame")]
    fn test_command_buffer_outside_frame_panics() {
        let scheduler = FrameScheduler::new(ScriptedBackend::new());
        scheduler.command_buffer();
    }

    #[test]
    fn test_out_of_date_acquire_skips_frame_and_recreates() {
        let mut backend = ScriptedBackend::new();
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut scheduler = FrameScheduler::new(backend);
        let mut window = ScriptedWindow::new(1024, 768);

        assert!(!run_frame(&mut scheduler, &mut window));
        assert_eq!(scheduler.phase(), FramePhase::Idle);
        assert_eq!(scheduler.current_slot(), 0);
        assert!(scheduler.backend().events.contains(&Event::Recreate(1024, 768)));
    }

    #[test]
    fn test_recreate_uses_exact_extent() {
        let mut scheduler = FrameScheduler::new(ScriptedBackend::new());
        let mut window = ScriptedWindow::new(1200, 1000);

        scheduler.recreate_swapchain(&mut window).unwrap();
        assert_eq!(
            scheduler.extent(),
            vk::Extent2D {
                width: 1200,
                height: 1000
            }
        );
    }

    #[test]
    fn test_zero_extent_stalls_until_visible() {
        let mut scheduler = FrameScheduler::new(ScriptedBackend::new());
        let mut window = ScriptedWindow::new(0, 0);
        window.extents.extend([(0, 0), (0, 600), (640, 480)]);

        scheduler.recreate_swapchain(&mut window).unwrap();

        assert_eq!(window.waits, 2);
        assert_eq!(scheduler.backend().events, vec![Event::Recreate(640, 480)]);
    }

    #[test]
    fn test_resize_flag_triggers_and_is_consumed() {
        let mut scheduler = FrameScheduler::new(ScriptedBackend::new());
        let mut window = ScriptedWindow::new(800, 600);
        window.resized = true;

        assert!(run_frame(&mut scheduler, &mut window));
        assert!(!window.resize_requested());
        assert!(scheduler.backend().events.contains(&Event::Recreate(800, 600)));

        let recreations = |events: &[Event]| events.iter().filter(|e| matches!(e, Event::Recreate(..))).count();
        assert!(run_frame(&mut scheduler, &mut window));
        assert_eq!(recreations(&scheduler.backend().events), 1);
    }

    #[test]
    fn test_suboptimal_present_triggers_recreation() {
        let mut backend = ScriptedBackend::new();
        backend.presents.push_back(PresentOutcome::Suboptimal);
        let mut scheduler = FrameScheduler::new(backend);
        let mut window = ScriptedWindow::new(320, 200);

        assert!(run_frame(&mut scheduler, &mut window));
        assert_eq!(scheduler.backend().events.last(), Some(&Event::Recreate(320, 200)));
    }

    #[test]
    fn test_slot_written_only_after_its_fence() {
        let mut scheduler = FrameScheduler::new(ScriptedBackend::new());
        let mut window = ScriptedWindow::new(800, 600);
        for _ in 0..5 {
            assert!(run_frame(&mut scheduler, &mut window));
        }

        let events = &scheduler.backend().events;
        for (i, event) in events.iter().enumerate() {
            if let Event::WriteSlot(slot) = event {
                let last_wait = events[..i].iter().rposition(|e| *e == Event::WaitFence(*slot));
                let last_submit = events[..i]
                    .iter()
                    .rposition(|e| matches!(e, Event::Present(s, _) if s == slot));
                let wait = last_wait.expect("slot written without a fence wait");
                assert!(last_submit.map_or(true, |submit| wait > submit));
            }
        }
    }

    #[test]
    fn test_failed_pass_is_discarded_and_next_frame_runs() {
        let mut backend = ScriptedBackend::new();
        backend.fail_rendering = true;
        let mut scheduler = FrameScheduler::new(backend);
        let mut window = ScriptedWindow::new(800, 600);

        assert!(scheduler.begin_frame(&mut window).unwrap().is_some());
        assert!(scheduler.begin_render_pass().is_err());
        assert_eq!(scheduler.phase(), FramePhase::FrameStarted);

        scheduler.abort_frame(&mut window).unwrap();
        assert_eq!(scheduler.phase(), FramePhase::Idle);
        assert_eq!(scheduler.current_slot(), 0);
        assert!(scheduler.backend().events.contains(&Event::Discard(0, 800, 600)));

        assert!(run_frame(&mut scheduler, &mut window));
        assert_eq!(scheduler.current_slot(), 1);
    }

    #[test]
    fn test_failed_submit_is_discarded_and_next_frame_runs() {
        let mut backend = ScriptedBackend::new();
        backend.fail_submit = true;
        let mut scheduler = FrameScheduler::new(backend);
        let mut window = ScriptedWindow::new(640, 480);

        scheduler.begin_frame(&mut window).unwrap();
        scheduler.begin_render_pass().unwrap();
        scheduler.end_render_pass().unwrap();
        assert!(scheduler.end_frame(&mut window).is_err());

        scheduler.abort_frame(&mut window).unwrap();
        assert_eq!(scheduler.phase(), FramePhase::Idle);
        assert!(run_frame(&mut scheduler, &mut window));
        assert_eq!(scheduler.backend().events.last(), Some(&Event::Present(0, 0)));
    }

    #[test]
    fn test_abort_inside_pass_waits_for_visible_extent() {
        let mut scheduler = FrameScheduler::new(ScriptedBackend::new());
        let mut window = ScriptedWindow::new(800, 600);

        scheduler.begin_frame(&mut window).unwrap();
        scheduler.begin_render_pass().unwrap();
        window.extents.extend([(0, 0), (1024, 768)]);
        window.resized = true;

        scheduler.abort_frame(&mut window).unwrap();
        assert_eq!(window.waits, 1);
        assert!(!window.resize_requested());
        assert_eq!(scheduler.backend().events.last(), Some(&Event::Discard(0, 1024, 768)));
        assert!(run_frame(&mut scheduler, &mut window));
    }

    #[test]
    fn test_abort_between_frames_does_nothing() {
        let mut scheduler = FrameScheduler::new(ScriptedBackend::new());
        let mut window = ScriptedWindow::new(800, 600);
        assert!(run_frame(&mut scheduler, &mut window));

        scheduler.abort_frame(&mut window).unwrap();
        assert_eq!(scheduler.current_slot(), 1);
        assert!(!scheduler
            .backend()
            .events
            .iter()
            .any(|e| matches!(e, Event::Discard(..))));
    }
}
