// Frame loop state machine
//
// Decides what happens each frame: apply a pending resize, wait for the ring
// slot, acquire, guard the image against in-flight use, record, submit and
// present. Every GPU call goes through `FrameOps`, so the sequencing and the
// recovery paths run without a device. `vulkan_backend.rs` implements
// `FrameOps` on the real objects.
//
// Once an image has been acquired and the frame cannot reach present, the
// frame is abandoned: the acquire signal is consumed and a rebuild is forced,
// which hands the unpresented image back to the presentation engine.

use super::error::BackendResult;
use super::frame::{FrameRing, FrameSlot, ImageIndex, ImagesInFlight, ResizeTracker};
use super::swapchain::{AcquireOutcome, PresentOutcome};

/// GPU work the frame loop issues.
pub trait FrameOps {
    fn wait_idle(&mut self) -> BackendResult<()>;

    /// Whether a swapchain rebuild is running.
    fn is_recreating(&self) -> bool;

    /// Swapchain image count; changes across rebuilds.
    fn image_count(&self) -> usize;

    /// Rebuild the swapchain and everything sized by it.
    /// `Ok(false)` when a rebuild is already running.
    fn recreate(&mut self, width: u32, height: u32) -> BackendResult<bool>;

    /// Block until `slot`'s last submission has completed.
    fn wait_for_slot(&mut self, slot: FrameSlot) -> BackendResult<()>;

    /// Acquire an image, signaling `slot`'s image-available semaphore.
    fn acquire(&mut self, slot: FrameSlot) -> BackendResult<AcquireOutcome>;

    /// Reset the image's command buffer, begin it and open the render pass.
    fn begin_recording(&mut self, image: ImageIndex) -> BackendResult<()>;

    /// Close the render pass and end the command buffer.
    fn end_recording(&mut self, image: ImageIndex) -> BackendResult<()>;

    fn reset_fence(&mut self, slot: FrameSlot) -> BackendResult<()>;

    /// Submit the image's commands, signaling `slot`'s fence.
    fn submit(&mut self, slot: FrameSlot, image: ImageIndex) -> BackendResult<()>;

    /// Give `slot` a signaled fence after a submit that never reached the queue.
    fn replace_fence(&mut self, slot: FrameSlot) -> BackendResult<()>;

    /// Consume `slot`'s image-available signal without rendering.
    fn discard_acquire(&mut self, slot: FrameSlot) -> BackendResult<()>;

    fn present(&mut self, slot: FrameSlot, image: ImageIndex) -> BackendResult<PresentOutcome>;
}

/// Ring position, image ownership and the open frame.
#[derive(Debug)]
pub struct FrameLoop {
    ring: FrameRing,
    images_in_flight: ImagesInFlight,
    current_image: Option<ImageIndex>,
}

impl FrameLoop {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            ring: FrameRing::new(frames_in_flight),
            images_in_flight: ImagesInFlight::new(image_count),
            current_image: None,
        }
    }

    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    pub fn images_in_flight(&self) -> &ImagesInFlight {
        &self.images_in_flight
    }

    /// Image of the frame between `begin_frame` and `end_frame`.
    pub fn current_image(&self) -> Option<ImageIndex> {
        self.current_image
    }

    /// Returns `Ok(true)` when a frame is open for recording.
    pub fn begin_frame(
        &mut self,
        ops: &mut impl FrameOps,
        resize: &mut ResizeTracker,
    ) -> BackendResult<bool> {
        if self.current_image.is_some() {
            log::warn!("begin_frame called while a frame is already open");
            return Ok(false);
        }

        if ops.is_recreating() {
            ops.wait_idle()?;
            return Ok(false);
        }

        if let Some((width, height)) = resize.pending() {
            if resize.is_minimized() {
                return Ok(false);
            }
            log::debug!("Resize to {}x{} pending; recreating swapchain", width, height);
            self.recreate(ops, width, height)?;
            resize.mark_applied();
            return Ok(false);
        }

        if resize.is_minimized() {
            return Ok(false);
        }

        let slot = self.ring.current();
        ops.wait_for_slot(slot)?;

        let image = match ops.acquire(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    log::debug!("Acquired a suboptimal image; present will recreate");
                }
                image_index
            }
            AcquireOutcome::Recreated => {
                self.images_in_flight.reset(ops.image_count());
                return Ok(false);
            }
        };

        if let Err(e) = self.prepare_image(ops, slot, image) {
            Self::abandon_frame(ops, slot, resize);
            return Err(e);
        }

        self.current_image = Some(image);
        Ok(true)
    }

    /// Wait out the image's previous user before its command buffer is reset.
    fn prepare_image(
        &mut self,
        ops: &mut impl FrameOps,
        slot: FrameSlot,
        image: ImageIndex,
    ) -> BackendResult<()> {
        if let Some(owner) = self.images_in_flight.owner(image) {
            ops.wait_for_slot(owner)?;
        }
        self.images_in_flight.claim(image, slot);
        ops.begin_recording(image)
    }

    /// Returns `Ok(true)` when the frame was submitted and presented.
    /// The ring advances once present has been attempted, whatever its result.
    pub fn end_frame(
        &mut self,
        ops: &mut impl FrameOps,
        resize: &mut ResizeTracker,
    ) -> BackendResult<bool> {
        let Some(image) = self.current_image.take() else {
            log::warn!("end_frame called without a matching begin_frame");
            return Ok(false);
        };
        let slot = self.ring.current();

        if let Err(e) = ops
            .end_recording(image)
            .and_then(|()| ops.reset_fence(slot))
        {
            Self::abandon_frame(ops, slot, resize);
            return Err(e);
        }

        if let Err(e) = ops.submit(slot, image) {
            if let Err(fence_error) = ops.replace_fence(slot) {
                log::error!("Could not replace fence after failed submit: {}", fence_error);
            }
            Self::abandon_frame(ops, slot, resize);
            return Err(e);
        }

        let outcome = ops.present(slot, image);
        self.ring.advance();

        if outcome? == PresentOutcome::Recreated {
            self.images_in_flight.reset(ops.image_count());
        }
        Ok(true)
    }

    /// Rebuild the swapchain and forget image ownership.
    pub fn recreate(
        &mut self,
        ops: &mut impl FrameOps,
        width: u32,
        height: u32,
    ) -> BackendResult<bool> {
        if !ops.recreate(width, height)? {
            return Ok(false);
        }
        self.images_in_flight.reset(ops.image_count());
        Ok(true)
    }

    /// The acquired image will not be presented.
    fn abandon_frame(ops: &mut impl FrameOps, slot: FrameSlot, resize: &mut ResizeTracker) {
        if let Err(e) = ops.discard_acquire(slot) {
            log::error!("Could not release acquired image semaphore: {}", e);
        }
        resize.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::BackendError;
    use ash::vk;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        WaitIdle,
        Recreate(u32, u32),
        WaitForSlot(usize),
        Acquire(usize),
        BeginRecording(u32),
        EndRecording(u32),
        ResetFence(usize),
        Submit(usize, u32),
        ReplaceFence(usize),
        DiscardAcquire(usize),
        Present(usize, u32),
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct FenceModel {
        signaled: bool,
        pending: bool,
    }

    /// Scripted stand-in for the GPU. Fences are modelled so a wait that
    /// nothing will ever signal is caught instead of blocking.
    struct MockFrameOps {
        calls: Vec<Call>,
        fences: Vec<FenceModel>,
        image_count: usize,
        next_image: u32,
        recreating: bool,
        recreate_refused: bool,
        acquire_script: VecDeque<AcquireOutcome>,
        present_script: VecDeque<BackendResult<PresentOutcome>>,
        fail_begin_recording: bool,
        fail_submit: bool,
        /// Set when a wait would have blocked forever.
        hung: bool,
    }

    impl MockFrameOps {
        fn new(frames_in_flight: usize, image_count: usize) -> Self {
            Self {
                calls: Vec::new(),
                fences: vec![
                    FenceModel {
                        signaled: true,
                        pending: false,
                    };
                    frames_in_flight
                ],
                image_count,
                next_image: 0,
                recreating: false,
                recreate_refused: false,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fail_begin_recording: false,
                fail_submit: false,
                hung: false,
            }
        }

        fn acquired(image: u32) -> AcquireOutcome {
            AcquireOutcome::Acquired {
                image_index: ImageIndex::new(image),
                suboptimal: false,
            }
        }

        fn count(&self, call: Call) -> usize {
            self.calls.iter().filter(|&&c| c == call).count()
        }

        fn position(&self, call: Call) -> Option<usize> {
            self.calls.iter().position(|&c| c == call)
        }
    }

    impl FrameOps for MockFrameOps {
        fn wait_idle(&mut self) -> BackendResult<()> {
            self.calls.push(Call::WaitIdle);
            Ok(())
        }

        fn is_recreating(&self) -> bool {
            self.recreating
        }

        fn image_count(&self) -> usize {
            self.image_count
        }

        fn recreate(&mut self, width: u32, height: u32) -> BackendResult<bool> {
            self.calls.push(Call::Recreate(width, height));
            Ok(!self.recreate_refused)
        }

        fn wait_for_slot(&mut self, slot: FrameSlot) -> BackendResult<()> {
            self.calls.push(Call::WaitForSlot(slot.index()));
            let fence = &mut self.fences[slot.index()];
            if fence.signaled {
                return Ok(());
            }
            if fence.pending {
                fence.pending = false;
                fence.signaled = true;
                return Ok(());
            }
            self.hung = true;
            Err(BackendError::FenceTimeout)
        }

        fn acquire(&mut self, slot: FrameSlot) -> BackendResult<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot.index()));
            let outcome = self.acquire_script.pop_front().unwrap_or_else(|| {
                let image = self.next_image;
                self.next_image = (image + 1) % self.image_count as u32;
                Self::acquired(image)
            });
            if outcome == AcquireOutcome::Recreated {
                self.image_count += 1;
            }
            Ok(outcome)
        }

        fn begin_recording(&mut self, image: ImageIndex) -> BackendResult<()> {
            self.calls.push(Call::BeginRecording(image.get()));
            if std::mem::take(&mut self.fail_begin_recording) {
                return Err(BackendError::Vulkan {
                    call: "vkBeginCommandBuffer",
                    result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
                });
            }
            Ok(())
        }

        fn end_recording(&mut self, image: ImageIndex) -> BackendResult<()> {
            self.calls.push(Call::EndRecording(image.get()));
            Ok(())
        }

        fn reset_fence(&mut self, slot: FrameSlot) -> BackendResult<()> {
            self.calls.push(Call::ResetFence(slot.index()));
            self.fences[slot.index()].signaled = false;
            Ok(())
        }

        fn submit(&mut self, slot: FrameSlot, image: ImageIndex) -> BackendResult<()> {
            self.calls.push(Call::Submit(slot.index(), image.get()));
            if std::mem::take(&mut self.fail_submit) {
                return Err(BackendError::Vulkan {
                    call: "vkQueueSubmit",
                    result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                });
            }
            self.fences[slot.index()].pending = true;
            Ok(())
        }

        fn replace_fence(&mut self, slot: FrameSlot) -> BackendResult<()> {
            self.calls.push(Call::ReplaceFence(slot.index()));
            self.fences[slot.index()] = FenceModel {
                signaled: true,
                pending: false,
            };
            Ok(())
        }

        fn discard_acquire(&mut self, slot: FrameSlot) -> BackendResult<()> {
            self.calls.push(Call::DiscardAcquire(slot.index()));
            Ok(())
        }

        fn present(&mut self, slot: FrameSlot, image: ImageIndex) -> BackendResult<PresentOutcome> {
            self.calls.push(Call::Present(slot.index(), image.get()));
            let outcome = self
                .present_script
                .pop_front()
                .unwrap_or(Ok(PresentOutcome::Presented));
            if matches!(outcome, Ok(PresentOutcome::Recreated)) {
                self.image_count += 1;
            }
            outcome
        }
    }

    fn run_frame(
        frames: &mut FrameLoop,
        ops: &mut MockFrameOps,
        resize: &mut ResizeTracker,
    ) -> BackendResult<bool> {
        if !frames.begin_frame(ops, resize)? {
            return Ok(false);
        }
        frames.end_frame(ops, resize)
    }

    #[test]
    fn steady_frames_cycle_the_ring() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);

        for expected_slot in [0, 1, 0, 1] {
            assert_eq!(frames.ring().current().index(), expected_slot);
            assert!(run_frame(&mut frames, &mut ops, &mut resize).unwrap());
        }

        assert!(!ops.hung);
        assert_eq!(ops.count(Call::Present(0, 0)), 1);
        assert_eq!(ops.count(Call::Present(1, 1)), 1);
        assert_eq!(ops.count(Call::Present(0, 2)), 1);
    }

    #[test]
    fn out_of_date_acquire_skips_frame_and_keeps_slot() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);
        ops.acquire_script.push_back(AcquireOutcome::Recreated);

        assert!(!frames.begin_frame(&mut ops, &mut resize).unwrap());

        assert_eq!(frames.ring().current().index(), 0);
        assert_eq!(frames.current_image(), None);
        assert_eq!(frames.images_in_flight().image_count(), 4);
        assert_eq!(ops.count(Call::BeginRecording(0)), 0);
        assert_eq!(resize.pending(), None);

        // The next tick renders normally on the same slot
        assert!(frames.begin_frame(&mut ops, &mut resize).unwrap());
        assert_eq!(ops.calls.last(), Some(&Call::BeginRecording(0)));
        assert!(frames.end_frame(&mut ops, &mut resize).unwrap());
        assert_eq!(ops.count(Call::Present(0, 0)), 1);
    }

    #[test]
    fn resize_mismatch_recreates_and_skips_the_frame() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);
        let slot = frames.ring().current();
        frames.images_in_flight.claim(ImageIndex::new(1), slot);

        resize.notify(1024, 768);
        assert!(!frames.begin_frame(&mut ops, &mut resize).unwrap());

        assert_eq!(ops.calls, vec![Call::Recreate(1024, 768)]);
        assert_eq!(resize.pending(), None);
        assert_eq!(frames.images_in_flight().owner(ImageIndex::new(1)), None);

        assert!(frames.begin_frame(&mut ops, &mut resize).unwrap());
    }

    #[test]
    fn minimized_window_keeps_resize_pending() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);

        resize.notify(0, 0);
        assert!(!frames.begin_frame(&mut ops, &mut resize).unwrap());
        assert!(!frames.begin_frame(&mut ops, &mut resize).unwrap());
        assert!(ops.calls.is_empty());
        assert_eq!(resize.pending(), Some((0, 0)));

        resize.notify(640, 480);
        assert!(!frames.begin_frame(&mut ops, &mut resize).unwrap());
        assert_eq!(ops.calls, vec![Call::Recreate(640, 480)]);
    }

    #[test]
    fn rebuild_in_progress_waits_for_idle_and_skips() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);
        ops.recreating = true;

        assert!(!frames.begin_frame(&mut ops, &mut resize).unwrap());

        assert_eq!(ops.calls, vec![Call::WaitIdle]);
        assert_eq!(frames.ring().current().index(), 0);
    }

    #[test]
    fn refused_recreate_keeps_image_ownership() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let slot = frames.ring().current();
        frames.images_in_flight.claim(ImageIndex::new(2), slot);
        ops.recreate_refused = true;

        assert!(!frames.recreate(&mut ops, 800, 600).unwrap());
        assert_eq!(frames.images_in_flight().owner(ImageIndex::new(2)), Some(slot));
    }

    #[test]
    fn present_always_advances_the_ring() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);
        ops.present_script.push_back(Ok(PresentOutcome::Presented));
        ops.present_script.push_back(Ok(PresentOutcome::Recreated));
        ops.present_script.push_back(Err(BackendError::Vulkan {
            call: "vkQueuePresentKHR",
            result: vk::Result::ERROR_SURFACE_LOST_KHR,
        }));

        assert!(run_frame(&mut frames, &mut ops, &mut resize).unwrap());
        assert_eq!(frames.ring().current().index(), 1);

        assert!(run_frame(&mut frames, &mut ops, &mut resize).unwrap());
        assert_eq!(frames.ring().current().index(), 0);
        assert_eq!(frames.images_in_flight().image_count(), 4);

        assert!(run_frame(&mut frames, &mut ops, &mut resize).is_err());
        assert_eq!(frames.ring().current().index(), 1);
    }

    #[test]
    fn owner_wait_precedes_recording() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);
        ops.acquire_script.push_back(MockFrameOps::acquired(0));
        ops.acquire_script.push_back(MockFrameOps::acquired(0));

        assert!(run_frame(&mut frames, &mut ops, &mut resize).unwrap());
        ops.calls.clear();

        // Slot 1 gets image 0, last submitted from slot 0
        assert!(frames.begin_frame(&mut ops, &mut resize).unwrap());
        let owner_wait = ops.position(Call::WaitForSlot(0)).unwrap();
        let record = ops.position(Call::BeginRecording(0)).unwrap();
        assert!(owner_wait < record);
        assert_eq!(
            frames.images_in_flight().owner(ImageIndex::new(0)).map(FrameSlot::index),
            Some(1)
        );
        assert!(!ops.hung);
    }

    #[test]
    fn failed_submit_leaves_slot_usable() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);
        ops.fail_submit = true;

        assert!(frames.begin_frame(&mut ops, &mut resize).unwrap());
        assert!(frames.end_frame(&mut ops, &mut resize).is_err());

        assert_eq!(ops.count(Call::ReplaceFence(0)), 1);
        assert_eq!(ops.count(Call::DiscardAcquire(0)), 1);
        assert_eq!(ops.count(Call::Present(0, 0)), 0);
        assert_eq!(frames.current_image(), None);
        assert_eq!(resize.pending(), Some((800, 600)));

        // The forced rebuild, then enough frames to come back round to slot 0
        assert!(!frames.begin_frame(&mut ops, &mut resize).unwrap());
        for _ in 0..4 {
            assert!(run_frame(&mut frames, &mut ops, &mut resize).unwrap());
        }
        assert!(!ops.hung);
    }

    #[test]
    fn failed_recording_releases_the_acquired_image() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);
        ops.fail_begin_recording = true;

        assert!(frames.begin_frame(&mut ops, &mut resize).is_err());

        assert_eq!(ops.count(Call::DiscardAcquire(0)), 1);
        assert_eq!(frames.current_image(), None);
        assert_eq!(resize.pending(), Some((800, 600)));

        assert!(!frames.begin_frame(&mut ops, &mut resize).unwrap());
        assert_eq!(ops.calls.last(), Some(&Call::Recreate(800, 600)));
        assert!(run_frame(&mut frames, &mut ops, &mut resize).unwrap());
    }

    #[test]
    fn unbalanced_calls_are_ignored() {
        let mut ops = MockFrameOps::new(2, 3);
        let mut frames = FrameLoop::new(2, 3);
        let mut resize = ResizeTracker::new(800, 600);

        assert!(!frames.end_frame(&mut ops, &mut resize).unwrap());
        assert!(frames.begin_frame(&mut ops, &mut resize).unwrap());
        assert!(!frames.begin_frame(&mut ops, &mut resize).unwrap());
        assert!(frames.end_frame(&mut ops, &mut resize).unwrap());
    }
}
