pub mod loader;
pub mod measurement;
pub mod mesh;
pub mod solid;

pub use loader::{LoadTicket, LoadedMesh, MeshLoadResult, MeshLoader, MeshPart, MeshReference};
pub use measurement::{Measurement, ScaleProfile};
pub use mesh::{Aabb, TriangleMesh};
pub use solid::{CylinderDescriptor, DimensionLabel, SolidDescription, build, tessellate};
