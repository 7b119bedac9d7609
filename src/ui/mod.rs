pub mod panels;
pub mod state;
pub mod theme;

pub use panels::{RegionInput, UiActions, draw_ar_page, draw_help_overlay, draw_patient_page};
pub use state::{Screen, UiState};
pub use theme::apply_theme;
