use winit::keyboard::KeyCode;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Screen {
    Patient,
    Ar,
}

pub struct UiState {
    pub screen: Screen,
    pub vsync_enabled: bool,
    pub show_help: bool,
    /// Transient message shown under the page header, e.g. "AR not available".
    pub notice: Option<String>,
}

impl UiState {
    pub fn new(screen: Screen, vsync_enabled: bool) -> Self {
        Self {
            screen,
            vsync_enabled,
            show_help: true,
            notice: None,
        }
    }

    /// Window shortcuts: F1 shows or hides the help overlay, V toggles vsync.
    /// Returns whether the key was one of them.
    pub fn toggle_for_key(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::F1 => self.show_help = !self.show_help,
            KeyCode::KeyV => self.vsync_enabled = !self.vsync_enabled,
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_toggle_help_and_vsync() {
        let mut state = UiState::new(Screen::Patient, true);
        assert!(state.toggle_for_key(KeyCode::KeyV));
        assert!(!state.vsync_enabled);
        assert!(state.toggle_for_key(KeyCode::F1));
        assert!(!state.show_help);

        assert!(!state.toggle_for_key(KeyCode::KeyW));
        assert!(!state.vsync_enabled);
        assert!(state.toggle_for_key(KeyCode::KeyV));
        assert!(state.vsync_enabled);
    }
}
