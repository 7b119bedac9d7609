use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec2;

use crate::renderer::input::Axis;
use crate::runtime::scheduler::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Resize,
    Keyboard,
    Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Primary-button drag, in physical pixels.
    Rotate(Vec2),
    /// Secondary-button drag, in physical pixels.
    Pan(Vec2),
    Wheel(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewEvent {
    Resize,
    Key { axis: Axis, pressed: bool },
    Pointer(PointerEvent),
}

impl ViewEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ViewEvent::Resize => EventKind::Resize,
            ViewEvent::Key { .. } => EventKind::Keyboard,
            ViewEvent::Pointer(_) => EventKind::Pointer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Window-wide listener table. Surfaces hold their ids and release them on dispose.
#[derive(Debug, Default)]
pub struct EventRegistry {
    next: u64,
    listeners: BTreeMap<SubscriptionId, (SurfaceId, EventKind)>,
}

pub type SharedEvents = Rc<RefCell<EventRegistry>>;

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedEvents {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn subscribe(&mut self, owner: SurfaceId, kind: EventKind) -> SubscriptionId {
        self.next += 1;
        let id = SubscriptionId(self.next);
        self.listeners.insert(id, (owner, kind));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn listeners(&self, kind: EventKind) -> Vec<SurfaceId> {
        self.listeners
            .values()
            .filter(|(_, k)| *k == kind)
            .map(|(owner, _)| *owner)
            .collect()
    }

    pub fn is_subscribed(&self, owner: SurfaceId, kind: EventKind) -> bool {
        self.listeners
            .values()
            .any(|(o, k)| *o == owner && *k == kind)
    }

    pub fn subscription_count(&self, owner: SurfaceId) -> usize {
        self.listeners.values().filter(|(o, _)| *o == owner).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_are_filtered_by_kind() {
        let mut registry = EventRegistry::new();
        let a = SurfaceId::allocate();
        let b = SurfaceId::allocate();
        let resize_a = registry.subscribe(a, EventKind::Resize);
        registry.subscribe(a, EventKind::Keyboard);
        registry.subscribe(b, EventKind::Resize);

        assert_eq!(registry.listeners(EventKind::Resize), vec![a, b]);
        assert_eq!(registry.listeners(EventKind::Pointer), Vec::<SurfaceId>::new());

        assert!(registry.unsubscribe(resize_a));
        assert!(!registry.is_subscribed(a, EventKind::Resize));
        assert_eq!(registry.subscription_count(a), 1);
    }

    #[test]
    fn events_report_their_kind() {
        assert_eq!(ViewEvent::Resize.kind(), EventKind::Resize);
        assert_eq!(
            ViewEvent::Key {
                axis: Axis::Up,
                pressed: true
            }
            .kind(),
            EventKind::Keyboard
        );
        assert_eq!(
            ViewEvent::Pointer(PointerEvent::Wheel(1.0)).kind(),
            EventKind::Pointer
        );
    }
}
