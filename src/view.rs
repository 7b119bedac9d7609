//! Mount/unmount lifecycle of the three model views and the observable
//! "model not available" state their pages render.

use glam::Vec3;
use log::{debug, error, info, warn};

use crate::error::Result;
use crate::geometry::{
    LoadTicket, LoadedMesh, Measurement, MeshLoadResult, MeshLoader, MeshReference, ScaleProfile,
    build, tessellate,
};
use crate::patient::ArHandoff;
use crate::renderer::{HostContext, Material, RenderSurface, SharedHost, Transform, ViewVariant};
use crate::runtime::XrDevice;

/// Uniform scale applied to every loaded anatomy mesh.
pub const ANATOMY_SCALE: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Loading,
    Available,
    NotAvailable,
}

/// Recentres on the bounding-box centre, then scales. Both apply to the
/// group's local transform, so the centre offset itself is not scaled.
pub fn anatomy_transform(mesh: &LoadedMesh) -> Transform {
    let center = mesh.bounds().map(|b| b.center()).unwrap_or(Vec3::ZERO);
    Transform {
        translation: -center,
        scale: ANATOMY_SCALE,
    }
}

pub struct ModelView {
    surface: RenderSurface,
    availability: Availability,
    measurement: Option<Measurement>,
    pending: Option<LoadTicket>,
}

impl ModelView {
    /// Orbit view of the generated implant. An invalid measurement mounts a
    /// working surface with nothing in it.
    pub fn mount_implant(host: &SharedHost, ctx: &HostContext, measurement: Measurement) -> Result<Self> {
        let surface = RenderSurface::create(host, ViewVariant::Implant, ctx)?;
        let mut view = Self {
            surface,
            availability: Availability::NotAvailable,
            measurement: Some(measurement),
            pending: None,
        };
        view.populate_implant(measurement, ScaleProfile::Display)?;
        view.surface.start_render_loop();
        Ok(view)
    }

    /// AR view of the generated implant. Frames come from the window until the
    /// device session starts.
    pub fn mount_immersive(
        host: &SharedHost,
        ctx: &HostContext,
        measurement: Measurement,
        device: Box<dyn XrDevice>,
    ) -> Result<Self> {
        let surface = RenderSurface::create(host, ViewVariant::ImmersiveImplant, ctx)?;
        let mut view = Self {
            surface,
            availability: Availability::NotAvailable,
            measurement: Some(measurement),
            pending: None,
        };
        view.populate_implant(measurement, ScaleProfile::Immersive)?;
        view.surface.start_immersive(device);
        Ok(view)
    }

    /// Anatomy view. The mesh arrives later through [`ModelView::apply_mesh_result`].
    pub fn mount_anatomy(
        host: &SharedHost,
        ctx: &HostContext,
        reference: Option<MeshReference>,
        loader: &mut MeshLoader,
    ) -> Result<Self> {
        let mut surface = RenderSurface::create(host, ViewVariant::Anatomy, ctx)?;
        surface.start_render_loop();

        let (availability, pending) = match reference {
            Some(reference) => {
                info!("loading anatomy mesh {}", reference.as_str());
                match loader.load(reference, surface.liveness()) {
                    Ok(ticket) => (Availability::Loading, Some(ticket)),
                    Err(err) => {
                        warn!("anatomy not shown: {err}");
                        (Availability::NotAvailable, None)
                    }
                }
            }
            None => (Availability::NotAvailable, None),
        };

        Ok(Self {
            surface,
            availability,
            measurement: None,
            pending,
        })
    }

    fn populate_implant(&mut self, measurement: Measurement, profile: ScaleProfile) -> Result<()> {
        let solid = match build(measurement, profile) {
            Ok(solid) => solid,
            Err(err) => {
                warn!("implant not shown: {err}");
                return Ok(());
            }
        };
        let transform = Transform::from_translation(self.surface.variant().placement());
        self.surface
            .add_mesh("implant", &tessellate(&solid), Material::implant(), transform)?;
        self.surface.set_labels(solid.labels);
        self.availability = Availability::Available;
        Ok(())
    }

    /// Applies a finished mesh load. Returns whether the scene was touched.
    ///
    /// Results for an unmounted surface, or for a load this view no longer
    /// waits on, are dropped without looking at them.
    pub fn apply_mesh_result(&mut self, result: MeshLoadResult) -> bool {
        if !result.liveness.is_alive() || self.surface.is_disposed() {
            debug!("discarding mesh load {:?} for an unmounted view", result.ticket);
            return false;
        }
        if self.pending != Some(result.ticket) {
            debug!("discarding superseded mesh load {:?}", result.ticket);
            return false;
        }
        self.pending = None;

        let loaded = match result.outcome {
            Ok(loaded) => loaded,
            Err(err) => {
                error!("{err}");
                self.availability = Availability::NotAvailable;
                return true;
            }
        };

        let transform = anatomy_transform(&loaded);
        for part in &loaded.parts {
            if let Err(err) =
                self.surface
                    .add_mesh(part.name.clone(), &part.mesh, Material::anatomy(), transform)
            {
                error!("failed to upload anatomy part {}: {err}", part.name);
                self.availability = Availability::NotAvailable;
                return true;
            }
        }
        self.availability = Availability::Available;
        true
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn is_not_available(&self) -> bool {
        self.availability == Availability::NotAvailable
    }

    pub fn measurement(&self) -> Option<Measurement> {
        self.measurement
    }

    pub fn pending_ticket(&self) -> Option<LoadTicket> {
        self.pending
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut RenderSurface {
        &mut self.surface
    }

    /// Navigation target for the AR page. Only the orbit implant view offers one.
    pub fn ar_handoff(&self, patient_id: &str) -> Option<ArHandoff> {
        if self.surface.variant() != ViewVariant::Implant {
            return None;
        }
        let measurement = self.measurement?;
        Some(ArHandoff {
            patient_id: patient_id.to_string(),
            height_mm: measurement.height_mm as f64,
            radius_mm: measurement.radius_mm as f64,
        })
    }

    pub fn unmount(&mut self) {
        self.pending = None;
        self.surface.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::geometry::{MeshPart, TriangleMesh};
    use crate::renderer::{HeadlessBackend, HostRegion};
    use crate::runtime::{EventRegistry, FrameScheduler, Liveness, SimulatedDevice};
    use approx::assert_relative_eq;

    fn context() -> (Rc<RefCell<HeadlessBackend>>, HostContext) {
        let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
        let ctx = HostContext {
            backend: backend.clone(),
            scheduler: FrameScheduler::shared(),
            events: EventRegistry::shared(),
        };
        (backend, ctx)
    }

    fn cube(offset: Vec3) -> LoadedMesh {
        let mut mesh = TriangleMesh::default();
        for corner in [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE * 2.0] {
            mesh.vertices.extend((corner + offset).to_array());
        }
        mesh.indices = vec![0, 1, 2, 1, 3, 2];
        mesh.compute_normals();
        LoadedMesh {
            parts: vec![MeshPart {
                name: "bone".into(),
                mesh,
            }],
        }
    }

    #[test]
    fn implant_view_shows_the_generated_solid() {
        let (backend, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let view = ModelView::mount_implant(&host, &ctx, Measurement::new(10.0, 5.0, 0.2)).unwrap();

        assert_eq!(view.availability(), Availability::Available);
        assert_eq!(view.surface().scene().drawable_count(), 1);
        assert_eq!(view.surface().scene().labels().len(), 2);
        assert_eq!(view.surface().scene().labels()[0].text, "Height: 10mm");
        assert!(backend.borrow().uploaded_triangles() > 0);
        assert!(view.surface().is_animating());
    }

    #[test]
    fn invalid_measurement_degrades_to_not_available() {
        let (_, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let measurement = Measurement::from_nullable(None, Some(4.0), ScaleProfile::Display);
        let view = ModelView::mount_implant(&host, &ctx, measurement).unwrap();

        assert!(view.is_not_available());
        assert_eq!(view.surface().scene().drawable_count(), 0);
        assert!(view.surface().is_animating());
    }

    #[test]
    fn handoff_only_from_the_orbit_implant_view() {
        let (_, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let view = ModelView::mount_implant(&host, &ctx, Measurement::new(12.0, 4.5, 0.2)).unwrap();
        assert_eq!(
            view.ar_handoff("p1").unwrap().path(),
            "/user/p1/ar?height=12&radius=4.5"
        );

        let ar = ModelView::mount_immersive(
            &host,
            &ctx,
            Measurement::for_profile(12.0, 4.5, ScaleProfile::Immersive),
            Box::new(SimulatedDevice::new()),
        )
        .unwrap();
        assert!(ar.ar_handoff("p1").is_none());
    }

    #[test]
    fn immersive_implant_is_placed_in_front_of_the_viewer() {
        let (_, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let view = ModelView::mount_immersive(
            &host,
            &ctx,
            Measurement::for_profile(10.0, 5.0, ScaleProfile::Immersive),
            Box::new(SimulatedDevice::new()),
        )
        .unwrap();
        let object = &view.surface().scene().objects()[0];
        assert_eq!(object.transform.translation, Vec3::new(-0.2, 0.0, -0.5));
        assert!(view.surface().scene().labels().is_empty());
    }

    #[test]
    fn absent_reference_is_not_available_without_error() {
        let (_, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let mut loader = MeshLoader::new();
        let view = ModelView::mount_anatomy(&host, &ctx, None, &mut loader).unwrap();

        assert!(view.is_not_available());
        assert!(view.pending_ticket().is_none());
        assert_eq!(view.surface().scene().drawable_count(), 0);
        assert!(loader.last_error().is_none());
    }

    #[test]
    fn loaded_mesh_is_recentred_scaled_and_restyled() {
        let (_, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let mut loader = MeshLoader::new();
        let mut view = ModelView::mount_anatomy(
            &host,
            &ctx,
            Some(MeshReference::new("never-read.obj")),
            &mut loader,
        )
        .unwrap();
        let ticket = view.pending_ticket().unwrap();

        let applied = view.apply_mesh_result(MeshLoadResult {
            ticket,
            liveness: view.surface().liveness(),
            outcome: Ok(cube(Vec3::new(10.0, 0.0, 0.0))),
        });
        assert!(applied);
        assert_eq!(view.availability(), Availability::Available);

        let object = &view.surface().scene().objects()[0];
        assert_eq!(object.material, Material::anatomy());
        assert_relative_eq!(object.transform.scale, 0.75);
        assert_relative_eq!(object.transform.translation.x, -11.0);
        assert_relative_eq!(object.transform.translation.y, -1.0);
    }

    #[test]
    fn failed_load_keeps_the_loop_running() {
        let (_, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let mut loader = MeshLoader::new();
        let reference = MeshReference::new("https://example.org/bone.obj");
        let mut view =
            ModelView::mount_anatomy(&host, &ctx, Some(reference.clone()), &mut loader).unwrap();
        let ticket = view.pending_ticket().unwrap();

        let outcome = crate::geometry::loader::load_obj(&reference);
        assert!(outcome.is_err());
        assert!(view.apply_mesh_result(MeshLoadResult {
            ticket,
            liveness: view.surface().liveness(),
            outcome,
        }));
        assert!(view.is_not_available());
        assert!(view.surface().is_animating());
    }

    #[test]
    fn late_result_after_unmount_is_ignored() {
        let (backend, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let mut loader = MeshLoader::new();
        let mut view = ModelView::mount_anatomy(
            &host,
            &ctx,
            Some(MeshReference::new("never-read.obj")),
            &mut loader,
        )
        .unwrap();
        let ticket = view.pending_ticket().unwrap();
        let liveness = view.surface().liveness();
        view.unmount();

        assert!(!view.apply_mesh_result(MeshLoadResult {
            ticket,
            liveness,
            outcome: Ok(cube(Vec3::ZERO)),
        }));
        assert!(view.surface().scene().is_empty());
        assert_eq!(backend.borrow().live_meshes(), 0);
    }

    #[test]
    fn stopped_loader_shows_not_available_instead_of_loading() {
        let (_, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let mut loader = MeshLoader::new();
        loader.stop();

        let view = ModelView::mount_anatomy(
            &host,
            &ctx,
            Some(MeshReference::new("cancellous.obj")),
            &mut loader,
        )
        .unwrap();
        assert_eq!(view.availability(), Availability::NotAvailable);
        assert!(view.pending_ticket().is_none());
        assert!(view.surface().is_animating());
    }

    #[test]
    fn superseded_ticket_is_ignored() {
        let (_, ctx) = context();
        let host = HostRegion::shared(300, 300);
        let mut loader = MeshLoader::new();
        let mut view = ModelView::mount_anatomy(
            &host,
            &ctx,
            Some(MeshReference::new("never-read.obj")),
            &mut loader,
        )
        .unwrap();
        let other = loader
            .load(MeshReference::new("other.obj"), Liveness::new())
            .unwrap();
        assert_ne!(Some(other), view.pending_ticket());

        assert!(!view.apply_mesh_result(MeshLoadResult {
            ticket: other,
            liveness: view.surface().liveness(),
            outcome: Ok(cube(Vec3::ZERO)),
        }));
        assert_eq!(view.availability(), Availability::Loading);
    }
}
