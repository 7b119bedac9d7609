use glam::Vec3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn union(self, other: Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

impl TriangleMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn position(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[index * 3..index * 3 + 3])
    }

    pub fn bounds(&self) -> Option<Aabb> {
        let mut points = self.vertices.chunks_exact(3).map(Vec3::from_slice);
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Aabb { min, max })
    }

    /// Area-weighted smooth normals, for sources that ship positions only.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertex_count()];

        for face in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (face[0] as usize, face[1] as usize, face[2] as usize);
            let p0 = self.position(i0);
            let face_normal = (self.position(i1) - p0).cross(self.position(i2) - p0);
            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        self.normals = normals
            .into_iter()
            .flat_map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
            .collect();
    }

    pub fn append(&mut self, other: &TriangleMesh) {
        let base = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.normals.extend_from_slice(&other.normals);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }
}
