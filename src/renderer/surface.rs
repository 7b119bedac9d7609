use glam::Vec3;
use log::{debug, info, warn};

use crate::error::{Result, ViewError};
use crate::geometry::{DimensionLabel, TriangleMesh};
use crate::renderer::backend::{MeshHandle, OutputTarget, SharedBackend};
use crate::renderer::camera::Camera;
use crate::renderer::controls::CameraRig;
use crate::renderer::host::{ElementId, SharedHost};
use crate::renderer::input::KeyboardAxisState;
use crate::renderer::scene::{Background, LightSet, Material, SceneObject, SceneState, Transform, rgb};
use crate::runtime::{
    EventKind, FrameContext, FrameHandle, ImmersiveSession, Liveness, PointerEvent, RenderLoop,
    SessionSignal, SessionState, SharedEvents, SharedScheduler, SubscriptionId, SurfaceId,
    ViewEvent, XrDevice, draw_frame,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewVariant {
    Anatomy,
    Implant,
    ImmersiveImplant,
}

impl ViewVariant {
    pub fn fov_degrees(self) -> f32 {
        match self {
            ViewVariant::Anatomy => 75.0,
            ViewVariant::Implant | ViewVariant::ImmersiveImplant => 70.0,
        }
    }

    pub fn clip_planes(self) -> (f32, f32) {
        match self {
            ViewVariant::Anatomy => (0.1, 1000.0),
            ViewVariant::Implant | ViewVariant::ImmersiveImplant => (0.01, 20.0),
        }
    }

    fn initial_camera(self, aspect: f32) -> Camera {
        let (near, far) = self.clip_planes();
        let mut camera = Camera::perspective(self.fov_degrees(), aspect, near, far);
        match self {
            ViewVariant::Anatomy => camera.position = Vec3::splat(25.0),
            ViewVariant::Implant => camera.position = Vec3::new(0.0, 0.0, 1.3),
            ViewVariant::ImmersiveImplant => {
                camera.position = Vec3::ZERO;
                camera.target = Vec3::NEG_Z;
            }
        }
        camera
    }

    pub fn background(self) -> Background {
        match self {
            ViewVariant::Anatomy => Background::Opaque(rgb(0x1a1a1a)),
            ViewVariant::Implant | ViewVariant::ImmersiveImplant => Background::Transparent,
        }
    }

    pub fn lights(self) -> LightSet {
        match self {
            ViewVariant::Anatomy => LightSet::anatomy(),
            ViewVariant::Implant | ViewVariant::ImmersiveImplant => LightSet::implant(),
        }
    }

    fn rig(self) -> Option<CameraRig> {
        match self {
            ViewVariant::Anatomy => Some(CameraRig::with_distance_clamp(10.0, 100.0)),
            ViewVariant::Implant => Some(CameraRig::default()),
            ViewVariant::ImmersiveImplant => None,
        }
    }

    /// Per-frame keyboard move distance; `None` where keys are not bound.
    pub fn keyboard_speed(self) -> Option<f32> {
        match self {
            ViewVariant::Anatomy => Some(1.0),
            ViewVariant::Implant | ViewVariant::ImmersiveImplant => None,
        }
    }

    pub fn subscriptions(self) -> &'static [EventKind] {
        match self {
            ViewVariant::Anatomy => &[EventKind::Resize, EventKind::Keyboard, EventKind::Pointer],
            ViewVariant::Implant => &[EventKind::Resize, EventKind::Pointer],
            ViewVariant::ImmersiveImplant => &[EventKind::Resize],
        }
    }

    /// Where generated geometry sits in the scene. AR space is anchored to the
    /// device, so the implant is pushed in front of and beside the viewer.
    pub fn placement(self) -> Vec3 {
        match self {
            ViewVariant::ImmersiveImplant => Vec3::new(-0.2, 0.0, -0.5),
            ViewVariant::Anatomy | ViewVariant::Implant => Vec3::ZERO,
        }
    }
}

/// Window-wide collaborators every surface is created against.
#[derive(Clone)]
pub struct HostContext {
    pub backend: SharedBackend,
    pub scheduler: SharedScheduler,
    pub events: SharedEvents,
}

#[derive(Debug)]
enum Driver {
    Idle,
    Loop(RenderLoop),
    Immersive(ImmersiveSession),
}

/// One rendering target bound to one host region.
pub struct RenderSurface {
    id: SurfaceId,
    variant: ViewVariant,
    host: SharedHost,
    ctx: HostContext,

    element: ElementId,
    affordance: Option<ElementId>,
    overlay: Option<ElementId>,
    size: (u32, u32),

    camera: Camera,
    rig: Option<CameraRig>,
    axes: KeyboardAxisState,
    scene: SceneState,
    output: OutputTarget,

    driver: Driver,
    subscriptions: Vec<SubscriptionId>,
    liveness: Liveness,
    disposed: bool,
}

impl RenderSurface {
    pub fn create(host: &SharedHost, variant: ViewVariant, ctx: &HostContext) -> Result<Self> {
        let id = SurfaceId::allocate();
        let element = ElementId::allocate();

        let (width, height) = host.borrow().content_size();
        let size = (width.max(1), height.max(1));
        ctx.backend
            .borrow_mut()
            .create_target(element, size.0, size.1)?;

        let camera = variant.initial_camera(size.0 as f32 / size.1 as f32);
        host.borrow_mut().append_child(element);

        let subscriptions = {
            let mut events = ctx.events.borrow_mut();
            variant
                .subscriptions()
                .iter()
                .map(|kind| events.subscribe(id, *kind))
                .collect()
        };

        info!("created {variant:?} surface {id:?} at {}x{}", size.0, size.1);

        Ok(Self {
            id,
            variant,
            host: host.clone(),
            ctx: ctx.clone(),
            element,
            affordance: None,
            overlay: None,
            size,
            camera,
            rig: variant.rig(),
            axes: KeyboardAxisState::default(),
            scene: SceneState::new(variant.background(), variant.lights()),
            output: OutputTarget::Surface,
            driver: Driver::Idle,
            subscriptions,
            liveness: Liveness::new(),
            disposed: false,
        })
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn variant(&self) -> ViewVariant {
        self.variant
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    /// The "enter AR" affordance, present for immersive surfaces.
    pub fn affordance(&self) -> Option<ElementId> {
        self.affordance
    }

    /// The in-session overlay, present only while the AR session is active.
    pub fn overlay(&self) -> Option<ElementId> {
        self.overlay
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn rig(&self) -> Option<&CameraRig> {
        self.rig.as_ref()
    }

    pub fn axes(&self) -> &KeyboardAxisState {
        &self.axes
    }

    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    pub fn output(&self) -> OutputTarget {
        self.output
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Whether any clock is currently driving draws for this surface.
    pub fn is_animating(&self) -> bool {
        match &self.driver {
            Driver::Idle => false,
            Driver::Loop(render_loop) => render_loop.is_running(),
            Driver::Immersive(session) => {
                session.window_loop().is_running() || session.state() == SessionState::Active
            }
        }
    }

    pub fn session_state(&self) -> Option<SessionState> {
        match &self.driver {
            Driver::Immersive(session) => Some(session.state()),
            _ => None,
        }
    }

    pub fn start_render_loop(&mut self) {
        if self.disposed {
            return;
        }
        match &mut self.driver {
            Driver::Idle => {
                let mut render_loop = RenderLoop::new(self.id);
                render_loop.start(&self.ctx.scheduler);
                self.driver = Driver::Loop(render_loop);
            }
            Driver::Loop(render_loop) => render_loop.start(&self.ctx.scheduler),
            Driver::Immersive(_) => {
                warn!("surface {:?} is driven by an immersive session", self.id);
            }
        }
    }

    /// Hands frame scheduling to an AR session. The window loop keeps running
    /// until the device confirms the session.
    pub fn start_immersive(&mut self, device: Box<dyn XrDevice>) {
        if self.disposed {
            return;
        }
        if let Driver::Loop(render_loop) = &mut self.driver {
            render_loop.stop(&self.ctx.scheduler);
        }
        if let Driver::Immersive(session) = &mut self.driver {
            session.shutdown(&self.ctx.scheduler);
        }

        let mut session = ImmersiveSession::new(self.id, device);
        session.start(&self.ctx.scheduler);
        self.driver = Driver::Immersive(session);

        if self.affordance.is_none() {
            let button = ElementId::allocate();
            self.host.borrow_mut().append_child(button);
            self.affordance = Some(button);
        }
    }

    pub fn enter_immersive(&mut self) -> Result<()> {
        match &mut self.driver {
            Driver::Immersive(session) if !self.disposed => session.request(),
            _ => Err(ViewError::DeviceCapabilityUnavailable),
        }
    }

    pub fn exit_immersive(&mut self) {
        if let Driver::Immersive(session) = &mut self.driver {
            session.end();
        }
    }

    pub fn immersive_supported(&self) -> bool {
        match &self.driver {
            Driver::Immersive(session) => session.is_supported(),
            _ => false,
        }
    }

    /// Refresh callback dispatched by the host for this surface.
    pub fn on_refresh(&mut self, handle: FrameHandle) -> Result<bool> {
        if self.disposed {
            return Ok(false);
        }
        let render_loop = match &mut self.driver {
            Driver::Idle => return Ok(false),
            Driver::Loop(render_loop) => render_loop,
            Driver::Immersive(session) => session.window_loop_mut(),
        };
        let ctx = FrameContext {
            axes: &self.axes,
            keyboard_speed: self.variant.keyboard_speed(),
            rig: self.rig.as_mut(),
            camera: &mut self.camera,
            scene: &self.scene,
            backend: &self.ctx.backend,
            element: self.element,
            output: self.output,
        };
        render_loop.run_frame(handle, &self.ctx.scheduler, ctx)
    }

    /// Drains the AR device and draws each device frame into the composited
    /// output. Returns the number of frames drawn.
    pub fn pump_device(&mut self) -> Result<usize> {
        if self.disposed {
            return Ok(0);
        }
        let Driver::Immersive(session) = &mut self.driver else {
            return Ok(0);
        };
        let signals = session.poll(&self.ctx.scheduler);

        let mut drawn = 0;
        for signal in signals {
            match signal {
                SessionSignal::Started => {
                    self.output = OutputTarget::Composited;
                    let overlay = ElementId::allocate();
                    self.host.borrow_mut().append_child(overlay);
                    self.overlay = Some(overlay);
                }
                SessionSignal::Frame(pose) => {
                    self.camera.set_pose(pose.position, pose.orientation);
                    draw_frame(FrameContext {
                        axes: &self.axes,
                        keyboard_speed: None,
                        rig: None,
                        camera: &mut self.camera,
                        scene: &self.scene,
                        backend: &self.ctx.backend,
                        element: self.element,
                        output: OutputTarget::Composited,
                    })?;
                    drawn += 1;
                }
                SessionSignal::Ended => {
                    self.output = OutputTarget::Surface;
                    if let Some(overlay) = self.overlay.take() {
                        self.host.borrow_mut().remove_child(overlay);
                    }
                    let aspect = self.camera.aspect;
                    self.camera = self.variant.initial_camera(aspect);
                }
            }
        }
        Ok(drawn)
    }

    /// Re-reads the host's content box. Returns whether the target size changed.
    pub fn resize(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        let (width, height) = self.host.borrow().content_size();
        self.camera.set_aspect(width as f32, height as f32);

        let size = (width.max(1), height.max(1));
        if size == self.size {
            return false;
        }
        self.size = size;
        self.ctx
            .backend
            .borrow_mut()
            .resize_target(self.element, size.0, size.1);
        debug!("surface {:?} resized to {}x{}", self.id, size.0, size.1);
        true
    }

    /// Routes a window event, ignoring kinds this surface never subscribed to.
    pub fn handle_event(&mut self, event: ViewEvent) {
        if self.disposed
            || !self
                .ctx
                .events
                .borrow()
                .is_subscribed(self.id, event.kind())
        {
            return;
        }
        let viewport_height = self.size.1 as f32;
        match event {
            ViewEvent::Resize => {
                self.resize();
            }
            ViewEvent::Key { axis, pressed } => self.axes.set(axis, pressed),
            ViewEvent::Pointer(pointer) => {
                let Some(rig) = self.rig.as_mut() else {
                    return;
                };
                match pointer {
                    PointerEvent::Rotate(delta) => rig.rotate(delta, viewport_height),
                    PointerEvent::Pan(delta) => rig.pan(delta, viewport_height, &self.camera),
                    PointerEvent::Wheel(delta) => rig.dolly(delta),
                }
            }
        }
    }

    pub fn add_mesh(
        &mut self,
        name: impl Into<String>,
        mesh: &TriangleMesh,
        material: Material,
        transform: Transform,
    ) -> Result<MeshHandle> {
        if self.disposed {
            return Err(ViewError::DrawFailure(format!(
                "surface {:?} is disposed",
                self.id
            )));
        }
        let handle = self
            .ctx
            .backend
            .borrow_mut()
            .upload_mesh(self.element, mesh)?;
        self.scene.add_object(SceneObject {
            name: name.into(),
            mesh: handle,
            material,
            transform,
        });
        Ok(handle)
    }

    pub fn set_labels(&mut self, labels: Vec<DimensionLabel>) {
        if !self.disposed {
            self.scene.set_labels(labels);
        }
    }

    /// Stops the driver, drops subscriptions, detaches elements and frees GPU
    /// resources, in that order. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.liveness.revoke();

        match std::mem::replace(&mut self.driver, Driver::Idle) {
            Driver::Idle => {}
            Driver::Loop(mut render_loop) => render_loop.stop(&self.ctx.scheduler),
            Driver::Immersive(mut session) => session.shutdown(&self.ctx.scheduler),
        }

        {
            let mut events = self.ctx.events.borrow_mut();
            for id in self.subscriptions.drain(..) {
                events.unsubscribe(id);
            }
        }
        self.axes.release_all();

        {
            let mut host = self.host.borrow_mut();
            let attached = [Some(self.element), self.affordance.take(), self.overlay.take()];
            for element in attached.into_iter().flatten() {
                host.remove_child(element);
            }
        }

        let mut backend = self.ctx.backend.borrow_mut();
        for object in self.scene.drain() {
            backend.release_mesh(object.mesh);
        }
        backend.release_target(self.element);
        self.output = OutputTarget::Surface;

        info!("disposed {:?} surface {:?}", self.variant, self.id);
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        self.dispose();
    }
}
