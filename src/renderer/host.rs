use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ELEMENT: AtomicU64 = AtomicU64::new(1);

/// A drawable element placed inside a host region (drawing target or AR button).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    pub fn allocate() -> Self {
        Self(NEXT_ELEMENT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A sizeable area of the window that surfaces mount into.
#[derive(Debug, Default)]
pub struct HostRegion {
    width: u32,
    height: u32,
    children: Vec<ElementId>,
}

pub type SharedHost = Rc<RefCell<HostRegion>>;

impl HostRegion {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            children: Vec::new(),
        }
    }

    pub fn shared(width: u32, height: u32) -> SharedHost {
        Rc::new(RefCell::new(Self::new(width, height)))
    }

    pub fn content_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns whether the size actually changed.
    pub fn set_content_size(&mut self, width: u32, height: u32) -> bool {
        let changed = (width, height) != (self.width, self.height);
        self.width = width;
        self.height = height;
        changed
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn contains(&self, child: ElementId) -> bool {
        self.children.contains(&child)
    }

    pub(crate) fn append_child(&mut self, child: ElementId) {
        if !self.contains(child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: ElementId) -> bool {
        let before = self.children.len();
        self.children.retain(|c| *c != child);
        before != self.children.len()
    }
}
