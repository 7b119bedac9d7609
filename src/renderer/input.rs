use glam::Vec3;
use winit::keyboard::KeyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Left,
    Right,
    Forward,
    Back,
    Up,
    Down,
}

impl Axis {
    pub const ALL: [Axis; 6] = [
        Axis::Left,
        Axis::Right,
        Axis::Forward,
        Axis::Back,
        Axis::Up,
        Axis::Down,
    ];

    pub fn from_key(key: KeyCode) -> Option<Axis> {
        match key {
            KeyCode::ArrowLeft => Some(Axis::Left),
            KeyCode::ArrowRight => Some(Axis::Right),
            KeyCode::ArrowUp => Some(Axis::Forward),
            KeyCode::ArrowDown => Some(Axis::Back),
            KeyCode::KeyW => Some(Axis::Up),
            KeyCode::KeyS => Some(Axis::Down),
            _ => None,
        }
    }

    pub fn direction(self) -> Vec3 {
        match self {
            Axis::Left => Vec3::NEG_X,
            Axis::Right => Vec3::X,
            Axis::Forward => Vec3::NEG_Z,
            Axis::Back => Vec3::Z,
            Axis::Up => Vec3::Y,
            Axis::Down => Vec3::NEG_Y,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Level-triggered held state per axis.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardAxisState {
    held: [bool; 6],
}

impl KeyboardAxisState {
    pub fn set(&mut self, axis: Axis, held: bool) {
        self.held[axis.index()] = held;
    }

    pub fn is_held(&self, axis: Axis) -> bool {
        self.held[axis.index()]
    }

    pub fn any_held(&self) -> bool {
        self.held.iter().any(|h| *h)
    }

    pub fn release_all(&mut self) {
        self.held = [false; 6];
    }

    pub fn direction(&self) -> Vec3 {
        Axis::ALL
            .iter()
            .filter(|a| self.is_held(**a))
            .map(|a| a.direction())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_and_ws_keys_map_to_axes() {
        assert_eq!(Axis::from_key(KeyCode::ArrowUp), Some(Axis::Forward));
        assert_eq!(Axis::from_key(KeyCode::KeyS), Some(Axis::Down));
        assert_eq!(Axis::from_key(KeyCode::KeyA), None);
    }

    #[test]
    fn opposite_axes_cancel() {
        let mut axes = KeyboardAxisState::default();
        axes.set(Axis::Left, true);
        axes.set(Axis::Right, true);
        axes.set(Axis::Back, true);
        assert_eq!(axes.direction(), Vec3::Z);

        axes.set(Axis::Back, false);
        assert!(axes.any_held());
        assert_eq!(axes.direction(), Vec3::ZERO);

        axes.release_all();
        assert!(!axes.any_held());
    }

    #[test]
    fn state_is_level_triggered() {
        let mut axes = KeyboardAxisState::default();
        axes.set(Axis::Up, true);
        let first = axes.direction();
        let second = axes.direction();
        assert_eq!(first, second);
        assert!(axes.is_held(Axis::Up));
    }
}
