use glam::{Mat4, Vec3};

use crate::geometry::DimensionLabel;
use crate::renderer::backend::MeshHandle;

pub fn rgb(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub color: [f32; 3],
    pub metalness: f32,
    pub roughness: f32,
}

impl Material {
    pub fn implant() -> Self {
        Self {
            color: rgb(0xc0c0c0),
            metalness: 0.7,
            roughness: 0.3,
        }
    }

    /// Applied to every drawable of a loaded anatomy mesh, whatever it was authored with.
    pub fn anatomy() -> Self {
        Self {
            color: rgb(0xffffff),
            metalness: 0.8,
            roughness: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    pub sky: [f32; 3],
    pub ground: [f32; 3],
    pub intensity: f32,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: [f32; 3],
    pub intensity: f32,
    /// Lights shine from here towards the origin.
    pub position: Vec3,
}

pub const MAX_DIRECTIONAL_LIGHTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct LightSet {
    pub hemisphere: HemisphereLight,
    pub directional: Vec<DirectionalLight>,
}

impl LightSet {
    pub fn implant() -> Self {
        let white = rgb(0xffffff);
        Self {
            hemisphere: HemisphereLight {
                sky: white,
                ground: rgb(0x8888bb),
                intensity: 1.0,
                position: Vec3::Y,
            },
            directional: vec![
                DirectionalLight {
                    color: white,
                    intensity: 1.5,
                    position: Vec3::new(0.0, 0.0, 5.0),
                },
                DirectionalLight {
                    color: white,
                    intensity: 1.0,
                    position: Vec3::new(0.0, 5.0, 0.0),
                },
                DirectionalLight {
                    color: white,
                    intensity: 0.8,
                    position: Vec3::new(5.0, 0.0, 0.0),
                },
            ],
        }
    }

    pub fn anatomy() -> Self {
        let white = rgb(0xffffff);
        Self {
            hemisphere: HemisphereLight {
                sky: white,
                ground: rgb(0xbbbbff),
                intensity: 1.0,
                position: Vec3::new(0.5, 1.0, 0.25),
            },
            directional: vec![DirectionalLight {
                color: white,
                intensity: 1.0,
                position: Vec3::new(5.0, 5.0, 5.0),
            }],
        }
    }
}

/// `world = translation + scale * local`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: 1.0,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            scale: 1.0,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translation) * Mat4::from_scale(Vec3::splat(self.scale))
    }

    pub fn apply(&self, point: Vec3) -> Vec3 {
        self.translation + point * self.scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    Opaque([f32; 3]),
    Transparent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub mesh: MeshHandle,
    pub material: Material,
    pub transform: Transform,
}

#[derive(Debug, Clone)]
pub struct SceneState {
    pub background: Background,
    pub lights: LightSet,
    objects: Vec<SceneObject>,
    labels: Vec<DimensionLabel>,
}

impl SceneState {
    pub fn new(background: Background, lights: LightSet) -> Self {
        Self {
            background,
            lights,
            objects: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn add_object(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn drawable_count(&self) -> usize {
        self.objects.len()
    }

    pub fn set_labels(&mut self, labels: Vec<DimensionLabel>) {
        self.labels = labels;
    }

    pub fn labels(&self) -> &[DimensionLabel] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.labels.is_empty()
    }

    /// Empties the scene, handing back the objects so their GPU meshes can be released.
    pub fn drain(&mut self) -> Vec<SceneObject> {
        self.labels.clear();
        std::mem::take(&mut self.objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colours_decode() {
        assert_eq!(rgb(0xffffff), [1.0, 1.0, 1.0]);
        let grey = rgb(0xc0c0c0);
        assert!((grey[0] - 192.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn light_sets_stay_within_limits() {
        for set in [LightSet::implant(), LightSet::anatomy()] {
            assert!(!set.directional.is_empty());
            assert!(set.directional.len() <= MAX_DIRECTIONAL_LIGHTS);
        }
    }

    #[test]
    fn transform_translates_after_scaling() {
        let t = Transform {
            translation: Vec3::new(-2.0, 0.0, 0.0),
            scale: 0.75,
        };
        assert_eq!(t.apply(Vec3::new(4.0, 0.0, 0.0)), Vec3::new(1.0, 0.0, 0.0));
        let via_matrix = t.matrix().transform_point3(Vec3::new(4.0, 0.0, 0.0));
        assert!((via_matrix - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn drain_leaves_scene_empty() {
        let mut scene = SceneState::new(Background::Transparent, LightSet::implant());
        scene.add_object(SceneObject {
            name: "implant".into(),
            mesh: MeshHandle(7),
            material: Material::implant(),
            transform: Transform::default(),
        });
        scene.set_labels(vec![DimensionLabel {
            text: "Height: 10mm".into(),
            anchor: Vec3::ZERO,
        }]);

        let drained = scene.drain();
        assert_eq!(drained.len(), 1);
        assert!(scene.is_empty());
    }
}
