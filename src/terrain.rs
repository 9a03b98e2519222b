use glam::{IVec2, UVec2};

use crate::height_field::HeightField;

/// Height data capabilities the mesh builder needs from a terrain.
pub trait HeightFieldProvider {
    /// X and Z extents counted in samples.
    fn size(&self) -> UVec2;

    /// Elevation at a grid node. Out-of-range nodes clamp to the nearest
    /// edge.
    fn height_at(&self, node: IVec2) -> f32;

    /// World-space distance between adjacent grid nodes.
    fn world_scale(&self) -> f32;

    /// Multiplier applied to normalized grid coordinates when generating
    /// texture coordinates.
    fn texture_scale(&self) -> f32;
}

/// A height field together with its world-space scaling. This is the
/// concrete terrain a host hands to [`GeomipGrid`](crate::GeomipGrid).
pub struct Terrain {
    height_field: HeightField,
    world_scale: f32,
    texture_scale: f32,
}

impl Terrain {
    pub fn new(height_field: HeightField, world_scale: f32, texture_scale: f32) -> Self {
        debug_assert!(world_scale > 0.0, "world scale must be positive");

        Self {
            height_field,
            world_scale,
            texture_scale,
        }
    }

    pub fn height_field(&self) -> &HeightField {
        &self.height_field
    }

    pub fn height_field_mut(&mut self) -> &mut HeightField {
        &mut self.height_field
    }
}

impl HeightFieldProvider for Terrain {
    fn size(&self) -> UVec2 {
        self.height_field.size()
    }

    fn height_at(&self, node: IVec2) -> f32 {
        self.height_field.at(node)
    }

    fn world_scale(&self) -> f32 {
        self.world_scale
    }

    fn texture_scale(&self) -> f32 {
        self.texture_scale
    }
}
