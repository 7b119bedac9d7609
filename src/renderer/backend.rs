use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Result, ViewError};
use crate::geometry::TriangleMesh;
use crate::renderer::camera::Camera;
use crate::renderer::host::ElementId;
use crate::renderer::scene::SceneState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// The surface's own drawing target inside its host region.
    Surface,
    /// The device-provided frame of an immersive session.
    Composited,
}

/// GPU-side resources owned per drawing element.
pub trait GraphicsBackend {
    fn create_target(&mut self, element: ElementId, width: u32, height: u32) -> Result<()>;

    fn resize_target(&mut self, element: ElementId, width: u32, height: u32);

    fn upload_mesh(&mut self, element: ElementId, mesh: &TriangleMesh) -> Result<MeshHandle>;

    fn release_mesh(&mut self, handle: MeshHandle);

    fn draw(
        &mut self,
        element: ElementId,
        output: OutputTarget,
        scene: &SceneState,
        camera: &Camera,
    ) -> Result<()>;

    /// Frees the target and anything still uploaded for it.
    fn release_target(&mut self, element: ElementId);
}

pub type SharedBackend = Rc<RefCell<dyn GraphicsBackend>>;

/// Bookkeeping-only backend for runs without a GPU.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    targets: HashMap<ElementId, (u32, u32)>,
    meshes: HashMap<MeshHandle, (ElementId, usize)>,
    next_mesh: u64,
    draws: u64,
    composited_draws: u64,
    last_drawn_objects: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_size(&self, element: ElementId) -> Option<(u32, u32)> {
        self.targets.get(&element).copied()
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn uploaded_triangles(&self) -> usize {
        self.meshes.values().map(|(_, triangles)| triangles).sum()
    }

    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    pub fn composited_draw_count(&self) -> u64 {
        self.composited_draws
    }

    pub fn last_drawn_objects(&self) -> usize {
        self.last_drawn_objects
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn create_target(&mut self, element: ElementId, width: u32, height: u32) -> Result<()> {
        self.targets.insert(element, (width.max(1), height.max(1)));
        Ok(())
    }

    fn resize_target(&mut self, element: ElementId, width: u32, height: u32) {
        if let Some(size) = self.targets.get_mut(&element) {
            *size = (width.max(1), height.max(1));
        }
    }

    fn upload_mesh(&mut self, element: ElementId, mesh: &TriangleMesh) -> Result<MeshHandle> {
        if !self.targets.contains_key(&element) {
            return Err(ViewError::DrawFailure(format!(
                "no target for {element:?}"
            )));
        }
        self.next_mesh += 1;
        let handle = MeshHandle(self.next_mesh);
        self.meshes
            .insert(handle, (element, mesh.triangle_count()));
        Ok(handle)
    }

    fn release_mesh(&mut self, handle: MeshHandle) {
        self.meshes.remove(&handle);
    }

    fn draw(
        &mut self,
        element: ElementId,
        output: OutputTarget,
        scene: &SceneState,
        _camera: &Camera,
    ) -> Result<()> {
        if !self.targets.contains_key(&element) {
            return Err(ViewError::DrawFailure(format!(
                "no target for {element:?}"
            )));
        }
        self.draws += 1;
        if output == OutputTarget::Composited {
            self.composited_draws += 1;
        }
        self.last_drawn_objects = scene.drawable_count();
        Ok(())
    }

    fn release_target(&mut self, element: ElementId) {
        self.targets.remove(&element);
        self.meshes.retain(|_, (owner, _)| *owner != element);
    }
}
