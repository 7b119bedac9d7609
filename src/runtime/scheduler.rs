use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SURFACE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub fn allocate() -> Self {
        Self(NEXT_SURFACE.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(u64);

/// Registry of refresh callbacks, one-shot like `requestAnimationFrame`.
///
/// The host calls [`FrameScheduler::take_due`] once per display refresh and
/// dispatches each entry to its owner. Requests made during dispatch land in
/// the next refresh.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    next: u64,
    pending: BTreeMap<FrameHandle, SurfaceId>,
}

pub type SharedScheduler = Rc<RefCell<FrameScheduler>>;

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedScheduler {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn request(&mut self, owner: SurfaceId) -> FrameHandle {
        self.next += 1;
        let handle = FrameHandle(self.next);
        self.pending.insert(handle, owner);
        handle
    }

    pub fn cancel(&mut self, handle: FrameHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    pub fn has_pending(&self, owner: SurfaceId) -> bool {
        self.pending.values().any(|o| *o == owner)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn take_due(&mut self) -> Vec<(FrameHandle, SurfaceId)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_requests_never_fire() {
        let mut scheduler = FrameScheduler::new();
        let a = SurfaceId::allocate();
        let b = SurfaceId::allocate();
        let ha = scheduler.request(a);
        scheduler.request(b);

        assert!(scheduler.cancel(ha));
        assert!(!scheduler.cancel(ha));
        assert!(!scheduler.has_pending(a));

        let due = scheduler.take_due();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, b);
        assert_eq!(scheduler.pending_count(), 0);
    }
}
