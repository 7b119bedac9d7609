//! The two pages that host model views: the patient page (implant plus
//! anatomy) and the AR page. A page owns the host regions, routes window
//! events and refresh callbacks to the right view, and feeds mesh-load
//! completions back on the host thread.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::error::{Result, ViewError};
use crate::geometry::{Measurement, MeshLoader, MeshReference, ScaleProfile};
use crate::patient::{ArHandoff, BoneType, PatientDetail};
use crate::renderer::{HostContext, HostRegion, SharedHost};
use crate::runtime::{SessionState, ViewEvent, XrDevice};
use crate::view::{Availability, ModelView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    Implant,
    Anatomy,
    Immersive,
}

struct Slot {
    host: SharedHost,
    view: Option<ModelView>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub window_frames: usize,
    pub device_frames: usize,
    pub meshes_applied: usize,
}

pub struct ViewerPage {
    ctx: HostContext,
    loader: MeshLoader,
    slots: BTreeMap<Region, Slot>,
    patient: Option<PatientDetail>,
    handoff: Option<ArHandoff>,
    base_dir: PathBuf,
    bone: BoneType,
}

impl ViewerPage {
    /// Mounts the implant view from the record's screw measurements and the
    /// anatomy view for the default bone type.
    pub fn patient(ctx: HostContext, detail: PatientDetail, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut page = Self::empty(ctx);
        page.base_dir = base_dir.into();

        let measurement = Measurement::from_nullable(
            detail.summary.height_millimeter,
            detail.summary.width_millimeter,
            ScaleProfile::Display,
        );
        let host = HostRegion::shared(1, 1);
        let implant = ModelView::mount_implant(&host, &page.ctx, measurement)?;
        page.slots.insert(
            Region::Implant,
            Slot {
                host,
                view: Some(implant),
            },
        );

        page.patient = Some(detail);
        page.slots.insert(
            Region::Anatomy,
            Slot {
                host: HostRegion::shared(1, 1),
                view: None,
            },
        );
        page.mount_anatomy(BoneType::default())?;
        Ok(page)
    }

    /// Mounts the AR view for a hand-off. The window keeps drawing until the
    /// device session is entered.
    pub fn ar(ctx: HostContext, handoff: ArHandoff, device: Box<dyn XrDevice>) -> Result<Self> {
        let mut page = Self::empty(ctx);
        let measurement = Measurement::for_profile(
            handoff.height_mm as f32,
            handoff.radius_mm as f32,
            ScaleProfile::Immersive,
        );
        let host = HostRegion::shared(1, 1);
        let view = ModelView::mount_immersive(&host, &page.ctx, measurement, device)?;
        page.slots.insert(
            Region::Immersive,
            Slot {
                host,
                view: Some(view),
            },
        );
        page.handoff = Some(handoff);
        Ok(page)
    }

    fn empty(ctx: HostContext) -> Self {
        Self {
            ctx,
            loader: MeshLoader::new(),
            slots: BTreeMap::new(),
            patient: None,
            handoff: None,
            base_dir: PathBuf::from("."),
            bone: BoneType::default(),
        }
    }

    fn mount_anatomy(&mut self, bone: BoneType) -> Result<()> {
        let reference = self
            .patient
            .as_ref()
            .and_then(|p| p.model_urls.reference(bone))
            .map(|r| resolve_against(&self.base_dir, &r));

        let Some(slot) = self.slots.get_mut(&Region::Anatomy) else {
            return Ok(());
        };
        if let Some(mut old) = slot.view.take() {
            old.unmount();
        }
        let view = ModelView::mount_anatomy(&slot.host, &self.ctx, reference, &mut self.loader)?;
        slot.view = Some(view);
        self.bone = bone;
        Ok(())
    }

    /// Swaps the anatomy model, or remounts the current one after its view
    /// was stopped. Bone types without a model are refused.
    pub fn select_bone(&mut self, bone: BoneType) -> Result<bool> {
        let available = self
            .patient
            .as_ref()
            .is_some_and(|p| p.model_urls.is_available(bone));
        let mounted = self.view(Region::Anatomy).is_some();
        if !available || (bone == self.bone && mounted) {
            return Ok(false);
        }
        info!("switching anatomy model to {bone}");
        self.mount_anatomy(bone)?;
        Ok(true)
    }

    pub fn selected_bone(&self) -> BoneType {
        self.bone
    }

    pub fn patient_detail(&self) -> Option<&PatientDetail> {
        self.patient.as_ref()
    }

    pub fn handoff(&self) -> Option<&ArHandoff> {
        self.handoff.as_ref()
    }

    /// Navigation target for "View in AR".
    pub fn ar_target(&self) -> Option<ArHandoff> {
        let patient = self.patient.as_ref()?;
        self.view(Region::Implant)?.ar_handoff(&patient.summary.id)
    }

    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.slots.keys().copied()
    }

    pub fn host(&self, region: Region) -> Option<&SharedHost> {
        self.slots.get(&region).map(|s| &s.host)
    }

    pub fn view(&self, region: Region) -> Option<&ModelView> {
        self.slots.get(&region).and_then(|s| s.view.as_ref())
    }

    pub fn view_mut(&mut self, region: Region) -> Option<&mut ModelView> {
        self.slots.get_mut(&region).and_then(|s| s.view.as_mut())
    }

    /// What the page should render in place of a region's model.
    pub fn availability(&self, region: Region) -> Availability {
        self.view(region)
            .map(ModelView::availability)
            .unwrap_or(Availability::NotAvailable)
    }

    /// Applies the laid-out size of a region and lets its view follow.
    pub fn set_region_size(&mut self, region: Region, width: u32, height: u32) {
        let Some(slot) = self.slots.get_mut(&region) else {
            return;
        };
        if !slot.host.borrow_mut().set_content_size(width, height) {
            return;
        }
        if let Some(view) = slot.view.as_mut() {
            view.surface_mut().handle_event(ViewEvent::Resize);
        }
    }

    /// Pointer input goes to the view under the pointer only.
    pub fn dispatch(&mut self, region: Region, event: ViewEvent) {
        if let Some(view) = self.view_mut(region) {
            view.surface_mut().handle_event(event);
        }
    }

    /// Keyboard input reaches every view that listens for it.
    pub fn broadcast(&mut self, event: ViewEvent) {
        for slot in self.slots.values_mut() {
            if let Some(view) = slot.view.as_mut() {
                view.surface_mut().handle_event(event);
            }
        }
    }

    pub fn enter_immersive(&mut self) -> Result<()> {
        match self.view_mut(Region::Immersive) {
            Some(view) => view.surface_mut().enter_immersive(),
            None => Err(ViewError::DeviceCapabilityUnavailable),
        }
    }

    pub fn exit_immersive(&mut self) {
        if let Some(view) = self.view_mut(Region::Immersive) {
            view.surface_mut().exit_immersive();
        }
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.view(Region::Immersive)
            .and_then(|v| v.surface().session_state())
    }

    pub fn immersive_supported(&self) -> bool {
        self.view(Region::Immersive)
            .is_some_and(|v| v.surface().immersive_supported())
    }

    /// One host frame: due refresh callbacks, device frames, then finished
    /// mesh loads. A view whose draw fails is unmounted; the page carries on.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let due = self.ctx.scheduler.borrow_mut().take_due();
        for (handle, owner) in due {
            let Some((region, slot)) = self
                .slots
                .iter_mut()
                .find(|(_, s)| s.view.as_ref().is_some_and(|v| v.surface().id() == owner))
            else {
                continue;
            };
            let Some(view) = slot.view.as_mut() else {
                continue;
            };
            match view.surface_mut().on_refresh(handle) {
                Ok(true) => report.window_frames += 1,
                Ok(false) => {}
                Err(err) => {
                    error!("{region:?} view stopped: {err}");
                    if let Some(mut failed) = slot.view.take() {
                        failed.unmount();
                    }
                }
            }
        }

        for (region, slot) in self.slots.iter_mut() {
            let Some(view) = slot.view.as_mut() else {
                continue;
            };
            match view.surface_mut().pump_device() {
                Ok(frames) => report.device_frames += frames,
                Err(err) => {
                    error!("{region:?} view stopped: {err}");
                    if let Some(mut failed) = slot.view.take() {
                        failed.unmount();
                    }
                }
            }
        }

        while let Some(result) = self.loader.try_recv_result() {
            let target = self.slots.values_mut().find_map(|s| {
                s.view
                    .as_mut()
                    .filter(|v| v.pending_ticket() == Some(result.ticket))
            });
            match target {
                Some(view) => {
                    if view.apply_mesh_result(result) {
                        report.meshes_applied += 1;
                    }
                }
                None => debug!("no view waits on mesh load {:?}", result.ticket),
            }
        }

        report
    }

    /// Whether any view still waits on the mesh loader.
    pub fn is_loading(&self) -> bool {
        self.slots
            .values()
            .filter_map(|s| s.view.as_ref())
            .any(|v| v.availability() == Availability::Loading)
    }

    pub fn close(&mut self) {
        for slot in self.slots.values_mut() {
            if let Some(mut view) = slot.view.take() {
                view.unmount();
            }
        }
        self.loader.stop();
    }
}

impl Drop for ViewerPage {
    fn drop(&mut self) {
        self.close();
    }
}

/// Relative mesh paths in a record are relative to the record's own file.
fn resolve_against(base_dir: &Path, reference: &MeshReference) -> MeshReference {
    let locator = reference.as_str();
    if locator.contains("://") || Path::new(locator).is_absolute() || base_dir.as_os_str().is_empty() {
        return reference.clone();
    }
    match base_dir.join(locator).to_str() {
        Some(joined) => MeshReference::new(joined),
        None => {
            warn!("cannot resolve {locator} against {}", base_dir.display());
            reference.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::renderer::HeadlessBackend;
    use crate::runtime::{EventRegistry, FrameScheduler, SimulatedDevice};

    fn context() -> (Rc<RefCell<HeadlessBackend>>, HostContext) {
        let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
        let ctx = HostContext {
            backend: backend.clone(),
            scheduler: FrameScheduler::shared(),
            events: EventRegistry::shared(),
        };
        (backend, ctx)
    }

    fn detail(cancellous: Option<&str>) -> PatientDetail {
        let urls = match cancellous {
            Some(url) => format!(r#"{{"cancellous": "{url}", "cortical": null, "nerve_canal": null}}"#),
            None => r#"{"cancellous": null, "cortical": null, "nerve_canal": null}"#.to_string(),
        };
        PatientDetail::from_json(&format!(
            r#"{{"id": "p1", "name": "Sam", "age": 40,
                "height_millimeter": 11.0, "width_millimeter": 4.0,
                "modal_urls": {urls}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn patient_page_mounts_both_views() {
        let (backend, ctx) = context();
        let mut page = ViewerPage::patient(ctx, detail(None), "").unwrap();

        assert_eq!(page.availability(Region::Implant), Availability::Available);
        assert_eq!(page.availability(Region::Anatomy), Availability::NotAvailable);

        let report = page.tick();
        assert_eq!(report.window_frames, 2);
        assert_eq!(backend.borrow().draw_count(), 2);
        assert_eq!(
            page.ar_target().unwrap().path(),
            "/user/p1/ar?height=11&radius=4"
        );
    }

    #[test]
    fn unavailable_bone_is_not_selectable() {
        let (_, ctx) = context();
        let mut page = ViewerPage::patient(ctx, detail(None), "").unwrap();
        assert!(!page.select_bone(BoneType::Cortical).unwrap());
        assert_eq!(page.selected_bone(), BoneType::Cancellous);
    }

    #[test]
    fn region_resize_reaches_the_view() {
        let (backend, ctx) = context();
        let mut page = ViewerPage::patient(ctx, detail(None), "").unwrap();
        page.set_region_size(Region::Implant, 640, 0);

        let view = page.view(Region::Implant).unwrap();
        assert_eq!(view.surface().size(), (640, 1));
        assert_eq!(backend.borrow().target_size(view.surface().element()), Some((640, 1)));
        assert!(view.surface().camera().aspect.is_finite());
    }

    #[test]
    fn ar_page_switches_clocks_on_entry() {
        let (backend, ctx) = context();
        let handoff = ArHandoff::parse_query("p1", "height=10&radius=5");
        let mut page = ViewerPage::ar(ctx, handoff, Box::new(SimulatedDevice::new())).unwrap();

        assert_eq!(page.tick().window_frames, 1);
        page.enter_immersive().unwrap();
        assert_eq!(page.session_state(), Some(SessionState::Requesting));

        let report = page.tick();
        assert_eq!(page.session_state(), Some(SessionState::Active));
        assert!(report.device_frames >= 1);
        assert_eq!(page.tick().window_frames, 0);
        assert!(backend.borrow().composited_draw_count() >= 1);
    }

    #[test]
    fn unsupported_device_reports_capability_error() {
        let (_, ctx) = context();
        let handoff = ArHandoff::parse_query("p1", "");
        let mut page = ViewerPage::ar(ctx, handoff, Box::new(SimulatedDevice::unsupported())).unwrap();

        assert!(!page.immersive_supported());
        assert_eq!(page.enter_immersive(), Err(ViewError::DeviceCapabilityUnavailable));
        assert_eq!(page.session_state(), Some(SessionState::Inactive));
    }

    #[test]
    fn close_releases_everything() {
        let (backend, ctx) = context();
        let scheduler = ctx.scheduler.clone();
        let mut page = ViewerPage::patient(ctx, detail(None), "").unwrap();
        page.close();

        assert_eq!(scheduler.borrow().pending_count(), 0);
        assert_eq!(backend.borrow().live_targets(), 0);
        assert_eq!(backend.borrow().live_meshes(), 0);
        assert!(page.view(Region::Implant).is_none());
    }

    #[test]
    fn bone_selected_after_close_is_not_left_loading() {
        let (_, ctx) = context();
        let mut page = ViewerPage::patient(ctx, detail(Some("cancellous.obj")), "").unwrap();
        page.close();
        assert!(page.view(Region::Anatomy).is_none());

        assert!(page.select_bone(BoneType::Cancellous).unwrap());
        assert_eq!(page.availability(Region::Anatomy), Availability::NotAvailable);
        assert!(!page.is_loading());
    }

    #[test]
    fn relative_references_follow_the_record() {
        let base = Path::new("records");
        let resolved = resolve_against(base, &MeshReference::new("meshes/a.obj"));
        assert_eq!(Path::new(resolved.as_str()), base.join("meshes/a.obj"));

        let remote = MeshReference::new("https://cdn.example/a.obj");
        assert_eq!(resolve_against(base, &remote), remote);
    }
}
