use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use glam::Vec3;

use implant3d::geometry::{MeshLoader, MeshReference};
use implant3d::patient::{BoneType, PatientDetail};
use implant3d::renderer::{HeadlessBackend, HostContext, HostRegion, Material};
use implant3d::runtime::{EventRegistry, FrameScheduler, Liveness};
use implant3d::{Availability, ModelView, Region, ViewError, ViewerPage};

/// Two objects spanning x in [2, 6], y in [0, 2], z in [-1, 1].
const TWO_PARTS: &str = "\
o cortex
v 2 0 -1
v 4 0 -1
v 4 2 -1
v 2 2 -1
f 1 2 3
f 1 3 4
o marrow
v 4 0 1
v 6 0 1
v 6 2 1
f 5 6 7
";

const SINGLE: &str = "\
o canal
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
";

fn context() -> (Rc<RefCell<HeadlessBackend>>, HostContext) {
    let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
    let ctx = HostContext {
        backend: backend.clone(),
        scheduler: FrameScheduler::shared(),
        events: EventRegistry::shared(),
    };
    (backend, ctx)
}

fn record(cancellous: Option<&str>, cortical: Option<&str>) -> PatientDetail {
    let url = |u: Option<&str>| u.map(|u| format!("\"{u}\"")).unwrap_or_else(|| "null".into());
    PatientDetail::from_json(&format!(
        r#"{{"id": "p5", "name": "Lee", "age": 47,
            "height_millimeter": 10.0, "width_millimeter": 5.0,
            "modal_urls": {{"cancellous": {}, "cortical": {}, "nerve_canal": null}}}}"#,
        url(cancellous),
        url(cortical)
    ))
    .unwrap()
}

fn tick_until_loaded(page: &mut ViewerPage) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while page.is_loading() && Instant::now() < deadline {
        page.tick();
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(!page.is_loading(), "mesh load did not finish");
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn worker_parses_obj_parts() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "bone.obj", TWO_PARTS);
    let reference = MeshReference::new(dir.path().join("bone.obj").to_string_lossy());

    let mut loader = MeshLoader::new();
    let ticket = loader.load(reference, Liveness::new()).unwrap();
    let result = loader.recv_result_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(result.ticket, ticket);
    let mesh = result.outcome.unwrap();
    assert_eq!(mesh.parts.len(), 2);
    assert_eq!(mesh.parts[0].mesh.triangle_count(), 2);
    let bounds = mesh.bounds().unwrap();
    assert_eq!(bounds.center(), Vec3::new(4.0, 1.0, 0.0));
    assert!(loader.last_error().is_none());
}

#[test]
fn loaded_anatomy_is_recentred_and_restyled() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "cancellous.obj", TWO_PARTS);
    let (backend, ctx) = context();
    let mut page = ViewerPage::patient(ctx, record(Some("cancellous.obj"), None), dir.path()).unwrap();
    assert_eq!(page.availability(Region::Anatomy), Availability::Loading);

    tick_until_loaded(&mut page);

    assert_eq!(page.availability(Region::Anatomy), Availability::Available);
    let scene = page.view(Region::Anatomy).unwrap().surface().scene();
    assert_eq!(scene.drawable_count(), 2);
    for object in scene.objects() {
        assert_eq!(object.material, Material::anatomy());
        assert_relative_eq!(object.transform.scale, 0.75);
        assert_eq!(object.transform.translation, Vec3::new(-4.0, -1.0, 0.0));
    }
    // one implant mesh plus the two anatomy parts
    assert_eq!(backend.borrow().live_meshes(), 3);
}

#[test]
fn missing_file_shows_not_available_and_keeps_drawing() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, ctx) = context();
    let mut page = ViewerPage::patient(ctx, record(Some("absent.obj"), None), dir.path()).unwrap();

    tick_until_loaded(&mut page);

    assert_eq!(page.availability(Region::Anatomy), Availability::NotAvailable);
    let view = page.view(Region::Anatomy).unwrap();
    assert_eq!(view.surface().scene().drawable_count(), 0);
    assert!(view.surface().is_animating());

    let before = backend.borrow().draw_count();
    page.tick();
    assert!(backend.borrow().draw_count() > before);
}

#[test]
fn switching_bone_discards_the_superseded_load() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "cancellous.obj", TWO_PARTS);
    write(dir.path(), "cortical.obj", SINGLE);
    let (_, ctx) = context();
    let mut page = ViewerPage::patient(
        ctx,
        record(Some("cancellous.obj"), Some("cortical.obj")),
        dir.path(),
    )
    .unwrap();

    assert!(page.select_bone(BoneType::Cortical).unwrap());
    assert!(!page.select_bone(BoneType::NerveCanal).unwrap());
    tick_until_loaded(&mut page);
    // a late result for the first load must not land either
    std::thread::sleep(Duration::from_millis(20));
    page.tick();

    let scene = page.view(Region::Anatomy).unwrap().surface().scene();
    let names: Vec<_> = scene.objects().iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["canal"]);
    assert_eq!(page.selected_bone(), BoneType::Cortical);
}

#[test]
fn result_arriving_after_unmount_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "bone.obj", SINGLE);
    let reference = MeshReference::new(dir.path().join("bone.obj").to_string_lossy());
    let (backend, ctx) = context();
    let host = HostRegion::shared(320, 240);
    let mut loader = MeshLoader::new();

    let mut view = ModelView::mount_anatomy(&host, &ctx, Some(reference), &mut loader).unwrap();
    view.unmount();

    // The worker may skip the load entirely once the owner is gone.
    if let Some(result) = loader.recv_result_timeout(Duration::from_millis(500)) {
        assert!(!view.apply_mesh_result(result));
    }
    assert!(view.surface().scene().is_empty());
    assert_eq!(backend.borrow().live_meshes(), 0);
    assert!(host.borrow().children().is_empty());
}

#[test]
fn remote_reference_fails_without_fetching() {
    let mut loader = MeshLoader::new();
    loader
        .load(MeshReference::new("https://cdn.example.org/bone.obj"), Liveness::new())
        .unwrap();
    let result = loader.recv_result_timeout(Duration::from_secs(5)).unwrap();

    assert!(matches!(result.outcome, Err(ViewError::MeshLoadFailure { .. })));
    assert!(loader.last_error().unwrap().contains("remote"));
}
