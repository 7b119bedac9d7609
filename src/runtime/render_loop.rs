use log::{debug, trace};

use crate::error::Result;
use crate::renderer::backend::{OutputTarget, SharedBackend};
use crate::renderer::camera::Camera;
use crate::renderer::controls::CameraRig;
use crate::renderer::host::ElementId;
use crate::renderer::input::KeyboardAxisState;
use crate::renderer::scene::SceneState;
use crate::runtime::scheduler::{FrameHandle, SharedScheduler, SurfaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Running,
}

/// Everything one frame reads or updates, borrowed from the owning surface.
pub struct FrameContext<'a> {
    pub axes: &'a KeyboardAxisState,
    /// `None` disables keyboard integration for this variant.
    pub keyboard_speed: Option<f32>,
    pub rig: Option<&'a mut CameraRig>,
    pub camera: &'a mut Camera,
    pub scene: &'a SceneState,
    pub backend: &'a SharedBackend,
    pub element: ElementId,
    pub output: OutputTarget,
}

/// Integrate held keys, damp the rig, draw. Fixed order.
pub fn draw_frame(ctx: FrameContext<'_>) -> Result<()> {
    let FrameContext {
        axes,
        keyboard_speed,
        rig,
        camera,
        scene,
        backend,
        element,
        output,
    } = ctx;

    if let Some(rig) = rig {
        if let Some(speed) = keyboard_speed {
            rig.integrate(axes, speed, camera);
        }
        rig.update(camera);
    }

    backend.borrow_mut().draw(element, output, scene, camera)
}

/// Refresh-driven frame source for one surface.
#[derive(Debug)]
pub struct RenderLoop {
    owner: SurfaceId,
    phase: LoopPhase,
    pending: Option<FrameHandle>,
}

impl RenderLoop {
    pub fn new(owner: SurfaceId) -> Self {
        Self {
            owner,
            phase: LoopPhase::Idle,
            pending: None,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == LoopPhase::Running
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending
    }

    pub fn start(&mut self, scheduler: &SharedScheduler) {
        if self.is_running() {
            return;
        }
        self.phase = LoopPhase::Running;
        self.pending = Some(scheduler.borrow_mut().request(self.owner));
        debug!("render loop {:?} started", self.owner);
    }

    pub fn stop(&mut self, scheduler: &SharedScheduler) {
        if let Some(handle) = self.pending.take() {
            scheduler.borrow_mut().cancel(handle);
        }
        if self.is_running() {
            debug!("render loop {:?} stopped", self.owner);
        }
        self.phase = LoopPhase::Idle;
    }

    /// Handles one refresh callback. Returns `Ok(false)` for callbacks this
    /// loop no longer owns.
    ///
    /// The next refresh is requested before drawing. A draw failure stops the
    /// loop and is handed back to the caller.
    pub fn run_frame(
        &mut self,
        handle: FrameHandle,
        scheduler: &SharedScheduler,
        ctx: FrameContext<'_>,
    ) -> Result<bool> {
        if !self.is_running() || self.pending != Some(handle) {
            trace!("ignoring stale refresh {handle:?} for {:?}", self.owner);
            return Ok(false);
        }
        self.pending = Some(scheduler.borrow_mut().request(self.owner));

        if let Err(err) = draw_frame(ctx) {
            self.stop(scheduler);
            return Err(err);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::renderer::backend::{GraphicsBackend, HeadlessBackend};
    use crate::renderer::input::Axis;
    use crate::renderer::scene::{Background, LightSet};
    use crate::runtime::scheduler::FrameScheduler;
    use glam::Vec3;

    struct Fixture {
        backend: Rc<RefCell<HeadlessBackend>>,
        shared: SharedBackend,
        element: ElementId,
        scene: SceneState,
        camera: Camera,
        axes: KeyboardAxisState,
    }

    fn fixture() -> Fixture {
        let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
        let element = ElementId::allocate();
        backend
            .borrow_mut()
            .create_target(element, 64, 64)
            .unwrap();
        let shared: SharedBackend = backend.clone();
        Fixture {
            backend,
            shared,
            element,
            scene: SceneState::new(Background::Transparent, LightSet::implant()),
            camera: Camera::default(),
            axes: KeyboardAxisState::default(),
        }
    }

    #[test]
    fn stop_is_idempotent_and_cancels_refresh() {
        let scheduler = FrameScheduler::shared();
        let owner = SurfaceId::allocate();
        let mut render_loop = RenderLoop::new(owner);

        render_loop.start(&scheduler);
        render_loop.start(&scheduler);
        assert_eq!(scheduler.borrow().pending_count(), 1);

        render_loop.stop(&scheduler);
        render_loop.stop(&scheduler);
        assert_eq!(render_loop.phase(), LoopPhase::Idle);
        assert!(!scheduler.borrow().has_pending(owner));
    }

    #[test]
    fn each_frame_rerequests_and_draws() {
        let scheduler = FrameScheduler::shared();
        let owner = SurfaceId::allocate();
        let mut render_loop = RenderLoop::new(owner);
        let mut f = fixture();
        render_loop.start(&scheduler);

        for _ in 0..3 {
            let due = scheduler.borrow_mut().take_due();
            assert_eq!(due.len(), 1);
            let ctx = FrameContext {
                axes: &f.axes,
                keyboard_speed: None,
                rig: None,
                camera: &mut f.camera,
                scene: &f.scene,
                backend: &f.shared,
                element: f.element,
                output: OutputTarget::Surface,
            };
            assert!(render_loop.run_frame(due[0].0, &scheduler, ctx).unwrap());
        }
        assert_eq!(f.backend.borrow().draw_count(), 3);
        assert!(scheduler.borrow().has_pending(owner));
    }

    #[test]
    fn stale_handle_does_not_draw() {
        let scheduler = FrameScheduler::shared();
        let owner = SurfaceId::allocate();
        let mut render_loop = RenderLoop::new(owner);
        let mut f = fixture();
        render_loop.start(&scheduler);
        let due = scheduler.borrow_mut().take_due();
        render_loop.stop(&scheduler);

        let ctx = FrameContext {
            axes: &f.axes,
            keyboard_speed: None,
            rig: None,
            camera: &mut f.camera,
            scene: &f.scene,
            backend: &f.shared,
            element: f.element,
            output: OutputTarget::Surface,
        };
        assert!(!render_loop.run_frame(due[0].0, &scheduler, ctx).unwrap());
        assert_eq!(f.backend.borrow().draw_count(), 0);
    }

    #[test]
    fn keyboard_integrates_before_draw() {
        let mut f = fixture();
        let mut rig = CameraRig::with_distance_clamp(10.0, 100.0);
        f.camera.position = Vec3::splat(25.0);
        f.axes.set(Axis::Right, true);

        draw_frame(FrameContext {
            axes: &f.axes,
            keyboard_speed: Some(1.0),
            rig: Some(&mut rig),
            camera: &mut f.camera,
            scene: &f.scene,
            backend: &f.shared,
            element: f.element,
            output: OutputTarget::Surface,
        })
        .unwrap();

        assert!((f.camera.target - Vec3::X).length() < 1e-4);
        assert_eq!(f.backend.borrow().draw_count(), 1);
    }

    #[test]
    fn draw_failure_stops_the_loop() {
        let scheduler = FrameScheduler::shared();
        let owner = SurfaceId::allocate();
        let mut render_loop = RenderLoop::new(owner);
        let mut f = fixture();
        f.backend.borrow_mut().release_target(f.element);
        render_loop.start(&scheduler);
        let due = scheduler.borrow_mut().take_due();

        let ctx = FrameContext {
            axes: &f.axes,
            keyboard_speed: None,
            rig: None,
            camera: &mut f.camera,
            scene: &f.scene,
            backend: &f.shared,
            element: f.element,
            output: OutputTarget::Surface,
        };
        assert!(render_loop.run_frame(due[0].0, &scheduler, ctx).is_err());
        assert!(!render_loop.is_running());
        assert_eq!(scheduler.borrow().pending_count(), 0);
    }
}
