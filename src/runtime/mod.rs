pub mod events;
pub mod liveness;
pub mod render_loop;
pub mod scheduler;
pub mod session;

pub use events::{EventKind, EventRegistry, PointerEvent, SharedEvents, SubscriptionId, ViewEvent};
pub use liveness::Liveness;
pub use render_loop::{FrameContext, LoopPhase, RenderLoop, draw_frame};
pub use scheduler::{FrameHandle, FrameScheduler, SharedScheduler, SurfaceId};
pub use session::{
    DeviceEvent, ImmersiveSession, SessionSignal, SessionState, SimulatedDevice, ViewerPose,
    XrDevice,
};
