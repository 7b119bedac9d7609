use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use log::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use implant3d::patient::{
    ArHandoff, DEFAULT_AR_HEIGHT_MM, DEFAULT_AR_RADIUS_MM, PatientDetail, parse_positive_number,
};
use implant3d::renderer::{Axis, ElementId, GpuBackend, HeadlessBackend, HostContext};
use implant3d::runtime::{EventRegistry, FrameScheduler, SimulatedDevice, ViewEvent, XrDevice};
use implant3d::{Region, TickReport, ViewerConfig, ViewerPage};

mod ui;

use ui::{Screen, UiActions, UiState, apply_theme, draw_ar_page, draw_patient_page};

#[derive(Parser, Debug)]
#[command(name = "implant3d", version, about = "Implant and bone model viewer with an AR preview")]
struct Args {
    /// Patient detail record (JSON)
    #[arg(long, required_unless_present = "ar")]
    patient: Option<PathBuf>,

    /// Viewer configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Open the AR page directly
    #[arg(long)]
    ar: bool,

    /// Implant height in mm for the AR page
    #[arg(long)]
    height: Option<String>,

    /// Implant radius in mm for the AR page
    #[arg(long)]
    radius: Option<String>,

    /// Use the simulated AR device
    #[arg(long)]
    simulate_xr: bool,

    /// Run without a window and report what was drawn
    #[arg(long)]
    headless: bool,

    /// Frames to run in headless mode
    #[arg(long, default_value_t = 120)]
    frames: u32,
}

/// A loaded record and the directory its relative mesh paths resolve against.
#[derive(Clone)]
struct PatientSource {
    detail: PatientDetail,
    base_dir: PathBuf,
}

impl PatientSource {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let detail = PatientDetail::load(path)
            .with_context(|| format!("reading patient record {}", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self { detail, base_dir })
    }
}

fn xr_device(simulate: bool) -> Box<dyn XrDevice> {
    if simulate {
        Box::new(SimulatedDevice::new())
    } else {
        Box::new(SimulatedDevice::unsupported())
    }
}

/// AR hand-off for `--ar`: explicit arguments win over the record's values.
fn initial_handoff(args: &Args, patient: Option<&PatientSource>) -> ArHandoff {
    let from_record = patient.map(|p| p.detail.ar_handoff());
    let height = args
        .height
        .clone()
        .or_else(|| from_record.as_ref().map(|h| h.height_mm.to_string()));
    let radius = args
        .radius
        .clone()
        .or_else(|| from_record.as_ref().map(|h| h.radius_mm.to_string()));
    ArHandoff {
        patient_id: from_record
            .map(|h| h.patient_id)
            .unwrap_or_else(|| "local".to_string()),
        height_mm: parse_positive_number(height.as_deref(), DEFAULT_AR_HEIGHT_MM),
        radius_mm: parse_positive_number(radius.as_deref(), DEFAULT_AR_RADIUS_MM),
    }
}

/// Follows the hand-off the way a navigation would: through its path.
fn follow_handoff(handoff: &ArHandoff) -> ArHandoff {
    let path = handoff.path();
    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
    ArHandoff::parse_query(handoff.patient_id.clone(), query)
}

fn run_headless(args: &Args, config: &ViewerConfig, patient: Option<PatientSource>) -> anyhow::Result<()> {
    let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
    let ctx = HostContext {
        backend: backend.clone(),
        scheduler: FrameScheduler::shared(),
        events: EventRegistry::shared(),
    };
    let simulate = args.simulate_xr || config.simulate_xr;

    let mut page = match (&patient, args.ar) {
        (Some(source), false) => {
            ViewerPage::patient(ctx, source.detail.clone(), source.base_dir.clone())?
        }
        _ => ViewerPage::ar(ctx, initial_handoff(args, patient.as_ref()), xr_device(simulate))?,
    };

    let regions: Vec<Region> = page.regions().collect();
    for region in regions {
        page.set_region_size(region, config.window_width / 2, config.window_height);
    }
    if args.ar {
        if let Err(err) = page.enter_immersive() {
            warn!("{err}");
        }
    }

    let mut totals = TickReport::default();
    for _ in 0..args.frames {
        let report = page.tick();
        totals.window_frames += report.window_frames;
        totals.device_frames += report.device_frames;
        totals.meshes_applied += report.meshes_applied;
        if page.is_loading() {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    for region in page.regions() {
        info!("{region:?}: {:?}", page.availability(region));
    }
    println!(
        "window frames: {}, device frames: {}, meshes applied: {}, triangles uploaded: {}",
        totals.window_frames,
        totals.device_frames,
        totals.meshes_applied,
        backend.borrow().uploaded_triangles()
    );
    page.close();
    Ok(())
}

struct App {
    config: ViewerConfig,
    simulate_xr: bool,
    patient: Option<PatientSource>,
    pending_handoff: Option<ArHandoff>,

    window: Option<Arc<Window>>,
    gpu: Option<Rc<RefCell<GpuBackend>>>,
    host_ctx: Option<HostContext>,
    egui_state: Option<egui_winit::State>,
    egui_ctx: egui::Context,

    page: Option<ViewerPage>,
    ui_state: UiState,
    last_vsync_state: bool,
}

impl App {
    fn new(args: &Args, config: ViewerConfig, patient: Option<PatientSource>) -> Self {
        let screen = if args.ar { Screen::Ar } else { Screen::Patient };
        let pending_handoff = args.ar.then(|| initial_handoff(args, patient.as_ref()));
        Self {
            simulate_xr: args.simulate_xr || config.simulate_xr,
            ui_state: UiState::new(screen, config.vsync),
            last_vsync_state: config.vsync,
            config,
            patient,
            pending_handoff,
            window: None,
            gpu: None,
            host_ctx: None,
            egui_state: None,
            egui_ctx: egui::Context::default(),
            page: None,
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> implant3d::Result<()> {
        let gpu = pollster::block_on(GpuBackend::new(window.clone(), self.config.vsync))?;
        let gpu = Rc::new(RefCell::new(gpu));

        let egui_state = egui_winit::State::new(
            self.egui_ctx.clone(),
            self.egui_ctx.viewport_id(),
            &window,
            Some(window.scale_factor() as f32),
            None,
            Some(2048),
        );
        apply_theme(&self.egui_ctx);

        self.host_ctx = Some(HostContext {
            backend: gpu.clone(),
            scheduler: FrameScheduler::shared(),
            events: EventRegistry::shared(),
        });
        self.window = Some(window);
        self.gpu = Some(gpu);
        self.egui_state = Some(egui_state);

        match self.pending_handoff.take() {
            Some(handoff) => self.open_ar(handoff),
            None => self.open_patient(),
        }
        Ok(())
    }

    fn open_patient(&mut self) {
        let (Some(ctx), Some(source)) = (&self.host_ctx, &self.patient) else {
            return;
        };
        // The old page releases its surfaces before the new one mounts.
        self.page = None;
        match ViewerPage::patient(ctx.clone(), source.detail.clone(), source.base_dir.clone()) {
            Ok(page) => {
                self.page = Some(page);
                self.ui_state.screen = Screen::Patient;
                self.ui_state.notice = None;
            }
            Err(err) => error!("cannot open patient page: {err}"),
        }
    }

    fn open_ar(&mut self, handoff: ArHandoff) {
        let Some(ctx) = &self.host_ctx else {
            return;
        };
        let ctx = ctx.clone();
        self.page = None;
        info!("opening {}", handoff.path());
        match ViewerPage::ar(ctx, handoff, xr_device(self.simulate_xr)) {
            Ok(page) => {
                self.page = Some(page);
                self.ui_state.screen = Screen::Ar;
                self.ui_state.notice = None;
            }
            Err(err) => error!("cannot open AR page: {err}"),
        }
    }

    fn render(&mut self) {
        let (Some(window), Some(egui_state), Some(gpu), Some(page)) =
            (&self.window, &mut self.egui_state, &self.gpu, &mut self.page)
        else {
            return;
        };

        let raw_input = egui_state.take_egui_input(window);
        let textures = |element: ElementId| gpu.borrow().texture_id(element);
        let ui_state = &self.ui_state;

        let mut actions = UiActions::default();
        let mut inputs = Vec::new();
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            (actions, inputs) = match ui_state.screen {
                Screen::Patient => draw_patient_page(ctx, page, ui_state, &textures),
                Screen::Ar => draw_ar_page(ctx, page, ui_state, &textures),
            };
        });
        egui_state.handle_platform_output(window, full_output.platform_output);

        for input in inputs {
            page.set_region_size(input.region, input.size.0, input.size.1);
            for event in input.events {
                page.dispatch(input.region, event);
            }
        }

        page.tick();

        if self.ui_state.vsync_enabled != self.last_vsync_state {
            gpu.borrow_mut().set_vsync(self.ui_state.vsync_enabled);
            self.last_vsync_state = self.ui_state.vsync_enabled;
        }

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        if let Err(err) = gpu.borrow_mut().present_ui(
            &paint_jobs,
            full_output.textures_delta,
            full_output.pixels_per_point,
            ui::theme::page_clear(),
        ) {
            error!("{err}");
        }

        window.request_redraw();
        self.handle_ui_actions(actions);
    }

    fn handle_ui_actions(&mut self, actions: UiActions) {
        if let Some(bone) = actions.select_bone {
            if let Some(page) = &mut self.page {
                if let Err(err) = page.select_bone(bone) {
                    error!("cannot show {bone} model: {err}");
                    self.ui_state.notice = Some(format!("{bone} model not available"));
                }
            }
        }

        if actions.open_ar {
            if let Some(target) = self.page.as_ref().and_then(ViewerPage::ar_target) {
                self.open_ar(follow_handoff(&target));
            }
        }

        if actions.enter_ar {
            if let Some(page) = &mut self.page {
                if let Err(err) = page.enter_immersive() {
                    warn!("{err}");
                    self.ui_state.notice = Some("AR not available".to_string());
                }
            }
        }

        if actions.exit_ar {
            if let Some(page) = &mut self.page {
                page.exit_immersive();
            }
        }

        if actions.back {
            self.open_patient();
        }
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if let Some(axis) = Axis::from_key(key) {
            if let Some(page) = &mut self.page {
                page.broadcast(ViewEvent::Key { axis, pressed });
            }
            return;
        }
        match key {
            KeyCode::Escape if pressed => {
                if let Some(page) = &mut self.page {
                    page.exit_immersive();
                }
            }
            _ if pressed => {
                self.ui_state.toggle_for_key(key);
            }
            _ => {}
        }
    }

    fn release_keys(&mut self) {
        if let Some(page) = &mut self.page {
            for axis in Axis::ALL {
                page.broadcast(ViewEvent::Key {
                    axis,
                    pressed: false,
                });
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window_attrs = Window::default_attributes()
            .with_title(self.config.window_title.clone())
            .with_inner_size(PhysicalSize::new(self.config.window_width, self.config.window_height));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                error!("cannot create window: {err}");
                event_loop.exit();
                return;
            }
        };
        if let Err(err) = self.init_gpu(window) {
            error!("{err}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(egui_state) = &mut self.egui_state {
            if let Some(window) = &self.window {
                let response = egui_state.on_window_event(window, &event);
                if response.consumed {
                    return;
                }
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(mut page) = self.page.take() {
                    page.close();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(gpu) = &self.gpu {
                    gpu.borrow_mut().resize(size);
                }
            }

            WindowEvent::Focused(false) => self.release_keys(),

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.handle_key(key, event.state == ElementState::Pressed);
                }
            }

            WindowEvent::RedrawRequested => self.render(),

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ViewerConfig::load_or_default(args.config.as_deref())
        .context("loading viewer configuration")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_filter.as_str()),
    )
    .init();

    let patient = args.patient.as_deref().map(PatientSource::load).transpose()?;

    if args.headless {
        return run_headless(&args, &config, patient);
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(&args, config, patient);
    event_loop.run_app(&mut app)?;
    Ok(())
}
