//! Geomipmapped terrain meshes.
//!
//! A [`HeightField`] holds elevation samples on a regular grid spanning
//! the X/Z plane, with Y up. [`GeomipGrid`] turns it into one shared
//! vertex buffer plus one index buffer containing every LOD level and
//! edge-stitching permutation, selects a per-patch level from the camera
//! distance each frame, and emits exactly one indexed draw per visible
//! patch through a [`PatchRenderer`].

pub mod generate;
pub mod geomip_grid;
pub mod height_field;
pub mod lod_manager;
pub mod math;
pub mod terrain;

pub use geomip_grid::{GeomipGrid, IndexRange, PatchDraw, PatchRenderer, TerrainVertex};
pub use height_field::HeightField;
pub use lod_manager::{EdgeFlags, LodManager, PatchLod, TerrainError};
pub use math::{BoundingBox, Frustum, Plane};
pub use terrain::{HeightFieldProvider, Terrain};
