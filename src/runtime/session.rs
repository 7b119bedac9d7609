//! Immersive AR session: a device-driven frame clock that replaces the window
//! refresh loop while the session is active.

use glam::{Quat, Vec3};
use log::{debug, info, warn};

use crate::error::{Result, ViewError};
use crate::runtime::render_loop::RenderLoop;
use crate::runtime::scheduler::{SharedScheduler, SurfaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Requesting,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for ViewerPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceEvent {
    SessionStarted,
    Frame(ViewerPose),
    SessionEnded,
}

/// An AR-capable display device. The device owns the frame cadence while a
/// session runs; the app polls it once per host iteration.
pub trait XrDevice {
    fn supports_immersive_ar(&self) -> bool;

    fn request_session(&mut self) -> Result<()>;

    /// User-initiated end. The device answers with `SessionEnded`.
    fn end_session(&mut self);

    fn poll_events(&mut self) -> Vec<DeviceEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimPhase {
    Idle,
    Starting,
    Running,
    Ending,
}

/// Stand-in device for machines without an AR runtime. Emits one frame per
/// poll and sways the viewer slightly so the composited view visibly moves.
#[derive(Debug)]
pub struct SimulatedDevice {
    supported: bool,
    phase: SimPhase,
    frame: u64,
    frame_limit: Option<u64>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            supported: true,
            phase: SimPhase::Idle,
            frame: 0,
            frame_limit: None,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// The device ends the session on its own after `frames` frames.
    pub fn ends_after(frames: u64) -> Self {
        Self {
            frame_limit: Some(frames),
            ..Self::new()
        }
    }

    fn pose(&self) -> ViewerPose {
        let t = self.frame as f32 / 60.0;
        ViewerPose {
            position: Vec3::new(0.02 * t.sin(), 0.0, 0.02 * (t.cos() - 1.0)),
            orientation: Quat::from_rotation_y(0.05 * t.sin()),
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl XrDevice for SimulatedDevice {
    fn supports_immersive_ar(&self) -> bool {
        self.supported
    }

    fn request_session(&mut self) -> Result<()> {
        if !self.supported {
            return Err(ViewError::DeviceCapabilityUnavailable);
        }
        if self.phase == SimPhase::Idle {
            self.phase = SimPhase::Starting;
            self.frame = 0;
        }
        Ok(())
    }

    fn end_session(&mut self) {
        if matches!(self.phase, SimPhase::Starting | SimPhase::Running) {
            self.phase = SimPhase::Ending;
        }
    }

    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        match self.phase {
            SimPhase::Idle => Vec::new(),
            SimPhase::Starting => {
                self.phase = SimPhase::Running;
                self.frame = 1;
                vec![DeviceEvent::SessionStarted, DeviceEvent::Frame(self.pose())]
            }
            SimPhase::Running => {
                if self.frame_limit.is_some_and(|limit| self.frame >= limit) {
                    self.phase = SimPhase::Idle;
                    return vec![DeviceEvent::SessionEnded];
                }
                self.frame += 1;
                vec![DeviceEvent::Frame(self.pose())]
            }
            SimPhase::Ending => {
                self.phase = SimPhase::Idle;
                vec![DeviceEvent::SessionEnded]
            }
        }
    }
}

/// What the owning surface has to act on after a poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionSignal {
    Started,
    Frame(ViewerPose),
    Ended,
}

/// Session state machine `Inactive -> Requesting -> Active -> Inactive`.
///
/// While not active, frames come from a window [`RenderLoop`]; once the
/// device confirms the session that loop is stopped and only device frames
/// draw, so the two clocks never run together.
pub struct ImmersiveSession {
    owner: SurfaceId,
    state: SessionState,
    device: Box<dyn XrDevice>,
    window_loop: RenderLoop,
}

impl std::fmt::Debug for ImmersiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmersiveSession")
            .field("owner", &self.owner)
            .field("state", &self.state)
            .field("window_loop", &self.window_loop)
            .finish_non_exhaustive()
    }
}

impl ImmersiveSession {
    pub fn new(owner: SurfaceId, device: Box<dyn XrDevice>) -> Self {
        Self {
            owner,
            state: SessionState::Inactive,
            device,
            window_loop: RenderLoop::new(owner),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_supported(&self) -> bool {
        self.device.supports_immersive_ar()
    }

    pub fn window_loop(&self) -> &RenderLoop {
        &self.window_loop
    }

    pub fn window_loop_mut(&mut self) -> &mut RenderLoop {
        &mut self.window_loop
    }

    /// Starts the pre-session window loop.
    pub fn start(&mut self, scheduler: &SharedScheduler) {
        if self.state != SessionState::Active {
            self.window_loop.start(scheduler);
        }
    }

    /// The "enter AR" affordance.
    pub fn request(&mut self) -> Result<()> {
        if self.state != SessionState::Inactive {
            debug!("session for {:?} already {:?}", self.owner, self.state);
            return Ok(());
        }
        if !self.device.supports_immersive_ar() {
            warn!("immersive AR requested on a device without support");
            return Err(ViewError::DeviceCapabilityUnavailable);
        }
        self.device.request_session()?;
        self.state = SessionState::Requesting;
        info!("immersive session requested for {:?}", self.owner);
        Ok(())
    }

    pub fn end(&mut self) {
        if self.state != SessionState::Inactive {
            self.device.end_session();
        }
    }

    /// Drains device events and applies the state transitions they imply.
    pub fn poll(&mut self, scheduler: &SharedScheduler) -> Vec<SessionSignal> {
        let mut signals = Vec::new();
        for event in self.device.poll_events() {
            match (event, self.state) {
                (DeviceEvent::SessionStarted, SessionState::Requesting) => {
                    self.window_loop.stop(scheduler);
                    self.state = SessionState::Active;
                    info!("immersive session active for {:?}", self.owner);
                    signals.push(SessionSignal::Started);
                }
                (DeviceEvent::Frame(pose), SessionState::Active) => {
                    signals.push(SessionSignal::Frame(pose));
                }
                (DeviceEvent::SessionEnded, SessionState::Requesting | SessionState::Active) => {
                    self.state = SessionState::Inactive;
                    self.window_loop.start(scheduler);
                    info!("immersive session ended for {:?}", self.owner);
                    signals.push(SessionSignal::Ended);
                }
                (event, state) => {
                    debug!("dropping device event {event:?} in state {state:?}");
                }
            }
        }
        signals
    }

    /// Stops both clocks. The session is left `Inactive` whatever the device does next.
    pub fn shutdown(&mut self, scheduler: &SharedScheduler) {
        self.window_loop.stop(scheduler);
        if self.state != SessionState::Inactive {
            self.device.end_session();
            self.state = SessionState::Inactive;
        }
    }
}
