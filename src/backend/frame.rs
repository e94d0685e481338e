// Frame bookkeeping
//
// Two capacities drive the frame loop and they are easy to mix up:
// - frames in flight (ring slots, a small constant from config)
// - swapchain images (chosen by the driver, changes on recreate)
// Each gets its own index type and container so one can never index the other.

use std::ops::{Index, IndexMut};

use super::error::BackendResult;

/// Ring slot of a frame in flight. Only `FrameRing` hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSlot(usize);

impl FrameSlot {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Driver-assigned index of a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageIndex(u32);

impl ImageIndex {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// One `T` per frame in flight.
#[derive(Debug)]
pub struct PerFrame<T> {
    items: Vec<T>,
}

impl<T> PerFrame<T> {
    pub fn try_new(
        frames_in_flight: usize,
        mut make: impl FnMut(FrameSlot) -> BackendResult<T>,
    ) -> BackendResult<Self> {
        let items = (0..frames_in_flight)
            .map(|i| make(FrameSlot(i)))
            .collect::<BackendResult<Vec<_>>>()?;
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }
}

impl<T> Index<FrameSlot> for PerFrame<T> {
    type Output = T;

    fn index(&self, slot: FrameSlot) -> &T {
        &self.items[slot.0]
    }
}

impl<T> IndexMut<FrameSlot> for PerFrame<T> {
    fn index_mut(&mut self, slot: FrameSlot) -> &mut T {
        &mut self.items[slot.0]
    }
}

/// One `T` per swapchain image.
#[derive(Debug)]
pub struct PerImage<T> {
    items: Vec<T>,
}

impl<T> PerImage<T> {
    pub fn from_vec(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn filled(image_count: usize, value: T) -> Self
    where
        T: Clone,
    {
        Self {
            items: vec![value; image_count],
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, image: ImageIndex) -> Option<&T> {
        self.items.get(image.slot())
    }

    pub fn get_mut(&mut self, image: ImageIndex) -> Option<&mut T> {
        self.items.get_mut(image.slot())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..)
    }
}

impl<T> Index<ImageIndex> for PerImage<T> {
    type Output = T;

    fn index(&self, image: ImageIndex) -> &T {
        &self.items[image.slot()]
    }
}

impl<T> IndexMut<ImageIndex> for PerImage<T> {
    fn index_mut(&mut self, image: ImageIndex) -> &mut T {
        &mut self.items[image.slot()]
    }
}

/// Current ring slot, advanced once per presented (or attempted) frame.
#[derive(Debug)]
pub struct FrameRing {
    current: usize,
    frames_in_flight: usize,
}

impl FrameRing {
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "at least one frame in flight is required");
        Self {
            current: 0,
            frames_in_flight,
        }
    }

    pub fn current(&self) -> FrameSlot {
        FrameSlot(self.current)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames_in_flight;
    }

    /// Create the per-slot resources for this ring.
    pub fn allocate<T>(
        &self,
        make: impl FnMut(FrameSlot) -> BackendResult<T>,
    ) -> BackendResult<PerFrame<T>> {
        PerFrame::try_new(self.frames_in_flight, make)
    }
}

/// Which ring slot's fence last covered each swapchain image.
///
/// Before recording for an image, the CPU waits on that slot's fence, so an
/// image still in use by the GPU is never rewritten.
#[derive(Debug)]
pub struct ImagesInFlight {
    owners: PerImage<Option<FrameSlot>>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: PerImage::filled(image_count, None),
        }
    }

    pub fn image_count(&self) -> usize {
        self.owners.len()
    }

    pub fn owner(&self, image: ImageIndex) -> Option<FrameSlot> {
        self.owners.get(image).copied().flatten()
    }

    /// Hand `image` to `slot`, returning the previous owner.
    pub fn claim(&mut self, image: ImageIndex, slot: FrameSlot) -> Option<FrameSlot> {
        self.owners
            .get_mut(image)
            .and_then(|owner| owner.replace(slot))
    }

    /// Forget all owners; sized for a new swapchain.
    pub fn reset(&mut self, image_count: usize) {
        self.owners = PerImage::filled(image_count, None);
    }
}

/// Latest requested framebuffer size plus a generation counter.
///
/// Every notification bumps the generation; the frame loop compares it with
/// the last generation it applied.
#[derive(Debug, Default)]
pub struct ResizeTracker {
    width: u32,
    height: u32,
    generation: u64,
    applied_generation: u64,
}

impl ResizeTracker {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn notify(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The requested size if it has not been applied yet.
    pub fn pending(&self) -> Option<(u32, u32)> {
        (self.generation != self.applied_generation).then_some((self.width, self.height))
    }

    /// Force a rebuild at the current size on the next frame.
    pub fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn mark_applied(&mut self) {
        self.applied_generation = self.generation;
    }

    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn ring_wraps_at_frames_in_flight() {
        let mut ring = FrameRing::new(2);
        let seen: Vec<usize> = (0..5)
            .map(|_| {
                let slot = ring.current().index();
                ring.advance();
                slot
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn per_frame_is_sized_by_ring() {
        let ring = FrameRing::new(3);
        let values = ring.allocate(|slot| Ok(slot.index() * 10)).unwrap();

        assert_eq!(values.len(), 3);
        assert_eq!(values[ring.current()], 0);
    }

    #[test]
    fn claim_returns_previous_owner() {
        let ring = FrameRing::new(2);
        let mut images = ImagesInFlight::new(3);
        let image = ImageIndex::new(1);

        assert_eq!(images.owner(image), None);
        assert_eq!(images.claim(image, ring.current()), None);
        assert_eq!(images.owner(image), Some(ring.current()));
    }

    #[test]
    fn out_of_range_image_has_no_owner() {
        let mut images = ImagesInFlight::new(2);
        let ring = FrameRing::new(2);

        assert_eq!(images.owner(ImageIndex::new(5)), None);
        assert_eq!(images.claim(ImageIndex::new(5), ring.current()), None);
    }

    #[test]
    fn reset_resizes_and_clears() {
        let ring = FrameRing::new(2);
        let mut images = ImagesInFlight::new(2);
        images.claim(ImageIndex::new(0), ring.current());

        images.reset(4);

        assert_eq!(images.image_count(), 4);
        assert_eq!(images.owner(ImageIndex::new(0)), None);
    }

    /// Drive the ring and ownership table through an irregular image order
    /// and check no image is re-recorded before its last submission finished.
    #[test]
    fn image_never_rerecorded_before_its_fence_signals() {
        let image_count = 3;
        let mut ring = FrameRing::new(2);
        let mut images = ImagesInFlight::new(image_count);

        // Per slot: the submission id currently pending on that slot's fence.
        let mut pending: HashMap<usize, u32> = HashMap::new();
        // Per image: the submission id that last wrote it.
        let mut last_write: HashMap<u32, u32> = HashMap::new();
        let mut completed: Vec<u32> = Vec::new();

        let acquire_order = [0u32, 1, 2, 2, 0, 1, 1, 0, 2, 0, 0, 1];
        for (submission, &image) in acquire_order.iter().enumerate() {
            let submission = submission as u32;
            let slot = ring.current();

            // Wait on this slot's fence.
            if let Some(done) = pending.remove(&slot.index()) {
                completed.push(done);
            }

            // Wait on whichever fence last covered the image.
            let image = ImageIndex::new(image);
            if let Some(owner) = images.owner(image) {
                if let Some(done) = pending.remove(&owner.index()) {
                    completed.push(done);
                }
            }

            if let Some(previous) = last_write.get(&image.get()) {
                assert!(
                    completed.contains(previous),
                    "image {} re-recorded while submission {} was pending",
                    image.get(),
                    previous
                );
            }

            images.claim(image, slot);
            last_write.insert(image.get(), submission);
            pending.insert(slot.index(), submission);
            ring.advance();
        }
    }

    #[test]
    fn resize_generations() {
        let mut resize = ResizeTracker::new(800, 600);
        assert_eq!(resize.pending(), None);

        resize.notify(1024, 768);
        resize.notify(1280, 720);
        assert_eq!(resize.generation(), 2);
        assert_eq!(resize.pending(), Some((1280, 720)));

        resize.mark_applied();
        assert_eq!(resize.pending(), None);
        assert_eq!(resize.size(), (1280, 720));
    }

    #[test]
    fn invalidate_keeps_size_and_marks_pending() {
        let mut resize = ResizeTracker::new(800, 600);

        resize.invalidate();

        assert_eq!(resize.pending(), Some((800, 600)));
        resize.mark_applied();
        assert_eq!(resize.pending(), None);
    }

    #[test]
    fn zero_size_counts_as_minimized() {
        let mut resize = ResizeTracker::new(800, 600);
        assert!(!resize.is_minimized());

        resize.notify(0, 600);
        assert!(resize.is_minimized());
    }
}
