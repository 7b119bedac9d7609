pub mod config;
pub mod error;
pub mod geometry;
pub mod page;
pub mod patient;
pub mod renderer;
pub mod runtime;
pub mod view;

pub use config::ViewerConfig;
pub use error::{Result, ViewError};
pub use page::{Region, TickReport, ViewerPage};
pub use view::{Availability, ModelView};
