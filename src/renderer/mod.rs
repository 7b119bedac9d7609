pub mod backend;
pub mod camera;
pub mod controls;
pub mod gpu;
pub mod host;
pub mod input;
pub mod scene;
pub mod surface;

pub use backend::{GraphicsBackend, HeadlessBackend, MeshHandle, OutputTarget, SharedBackend};
pub use camera::Camera;
pub use controls::CameraRig;
pub use gpu::GpuBackend;
pub use host::{ElementId, HostRegion, SharedHost};
pub use input::{Axis, KeyboardAxisState};
pub use scene::{Background, LightSet, Material, SceneObject, SceneState, Transform};
pub use surface::{HostContext, RenderSurface, ViewVariant};
