use bitflags::bitflags;
use glam::{UVec2, Vec3};

/// Terrain configuration rejected at construction time.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("Invalid patch size {patch_size}; must be at least 3 and one more than a power of two")]
    InvalidPatchSize { patch_size: u32 },

    #[error(
        "Terrain {dim} ({size}) minus 1 must be divisible by patch size ({patch_size}) minus 1; try {dim} = {recommended}"
    )]
    DimensionMismatch {
        dim: &'static str,
        size: u32,
        patch_size: u32,
        recommended: u32,
    },
}

bitflags! {
    /// Patch edges whose neighbor renders at a coarser level.
    ///
    /// `TOP`/`BOTTOM` refer to the patch's +Z/-Z neighbors. The raw bits
    /// index the stitching permutation table.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EdgeFlags : u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const TOP = 1 << 2;
        const BOTTOM = 1 << 3;
    }
}

/// Per-patch LOD state: the level of the patch interior plus the edges
/// that must stitch down to a coarser neighbor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchLod {
    pub core: u32,
    pub edges: EdgeFlags,
}

/// Selects a LOD level for every terrain patch from the camera distance.
///
/// The view range `[0, max_view_distance]` is split into one region per
/// level, region `i` getting a width proportional to `i + 1`. Patches
/// whose center falls in region `i` render at level `i`; edge flags mark
/// sides facing a coarser neighbor. Flags are booleans, so when adjacent
/// patches differ by more than one level the stitch still only bridges a
/// single level.
pub struct LodManager {
    max_lod: u32,
    patch_size: u32,
    patch_dim: UVec2,
    world_scale: f32,
    regions: Vec<f32>,
    map: Vec<PatchLod>,
}

impl LodManager {
    pub fn new(
        patch_size: u32,
        patch_dim: UVec2,
        world_scale: f32,
        max_view_distance: f32,
    ) -> Result<Self, TerrainError> {
        validate_patch_size(patch_size)?;

        debug_assert!(patch_dim.x > 0 && patch_dim.y > 0);
        debug_assert!(world_scale > 0.0);
        debug_assert!(max_view_distance > 0.0);

        let max_lod = (patch_size - 1).ilog2() - 1;
        let regions = calc_lod_regions(max_lod, max_view_distance);

        let patch_extent = (patch_size - 1) as f32 * world_scale;
        if regions[0] < patch_extent {
            tracing::warn!(
                "LOD region 0 ({:.1}) is narrower than a patch ({:.1}); adjacent patches can differ by more than one level",
                regions[0],
                patch_extent
            );
        }

        Ok(Self {
            max_lod,
            patch_size,
            patch_dim,
            world_scale,
            regions,
            map: vec![PatchLod::default(); patch_dim.x as usize * patch_dim.y as usize],
        })
    }

    /// Recomputes the LOD map for the given camera position. Rewrites the
    /// whole map in place; calling it again with the same position yields
    /// the same map.
    pub fn update(&mut self, camera_pos: Vec3) {
        self.update_core_levels(camera_pos);
        self.update_edge_flags();
    }

    /// Distance is measured to the patch center at elevation zero, as if
    /// the terrain were flat.
    fn update_core_levels(&mut self, camera_pos: Vec3) {
        let center_step = self.patch_size / 2;

        for pz in 0..self.patch_dim.y {
            for px in 0..self.patch_dim.x {
                let x = px * (self.patch_size - 1) + center_step;
                let z = pz * (self.patch_size - 1) + center_step;

                let center = Vec3::new(
                    x as f32 * self.world_scale,
                    0.0,
                    z as f32 * self.world_scale,
                );
                let distance = camera_pos.distance(center);

                let index = (pz * self.patch_dim.x + px) as usize;
                self.map[index].core = self.distance_to_lod(distance);
            }
        }
    }

    /// Grid-boundary sides have no neighbor and stay clear.
    fn update_edge_flags(&mut self) {
        let dim = self.patch_dim;

        for pz in 0..dim.y {
            for px in 0..dim.x {
                let index = (pz * dim.x + px) as usize;
                let core = self.map[index].core;

                let mut edges = EdgeFlags::empty();

                if px > 0 && self.map[index - 1].core > core {
                    edges |= EdgeFlags::LEFT;
                }
                if px < dim.x - 1 && self.map[index + 1].core > core {
                    edges |= EdgeFlags::RIGHT;
                }
                if pz > 0 && self.map[index - dim.x as usize].core > core {
                    edges |= EdgeFlags::BOTTOM;
                }
                if pz < dim.y - 1 && self.map[index + dim.x as usize].core > core {
                    edges |= EdgeFlags::TOP;
                }

                self.map[index].edges = edges;
            }
        }
    }

    pub fn patch_lod(&self, coord: UVec2) -> PatchLod {
        debug_assert!(coord.x < self.patch_dim.x && coord.y < self.patch_dim.y);

        self.map[(coord.y * self.patch_dim.x + coord.x) as usize]
    }

    /// First region whose threshold exceeds the distance; anything at or
    /// beyond the last threshold falls open to the coarsest level.
    pub fn distance_to_lod(&self, distance: f32) -> u32 {
        for (lod, &region) in self.regions.iter().enumerate() {
            if distance < region {
                return lod as u32;
            }
        }

        self.max_lod
    }

    pub fn max_lod(&self) -> u32 {
        self.max_lod
    }

    pub fn patch_dim(&self) -> UVec2 {
        self.patch_dim
    }

    /// Cumulative region thresholds, one per LOD level.
    pub fn regions(&self) -> &[f32] {
        &self.regions
    }
}

/// A patch must be odd-sized with a power-of-two cell count per side so
/// that every level's fan step divides it, e.g. 5, 9, 17, 33.
pub(crate) fn validate_patch_size(patch_size: u32) -> Result<(), TerrainError> {
    if patch_size < 3 || !(patch_size - 1).is_power_of_two() {
        return Err(TerrainError::InvalidPatchSize { patch_size });
    }

    Ok(())
}

fn calc_lod_regions(max_lod: u32, max_view_distance: f32) -> Vec<f32> {
    let sum = (1..=max_lod + 1).sum::<u32>() as f32;
    let width = max_view_distance / sum;

    let mut regions = Vec::with_capacity(max_lod as usize + 1);
    let mut total = 0.0;
    for i in 0..=max_lod {
        total += width * (i + 1) as f32;
        regions.push(total);
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(patch_size: u32, patch_dim: UVec2, max_view_distance: f32) -> LodManager {
        LodManager::new(patch_size, patch_dim, 1.0, max_view_distance).unwrap()
    }

    #[test]
    fn rejects_invalid_patch_sizes() {
        for patch_size in [0, 1, 2, 4, 6, 7, 10] {
            let result = LodManager::new(patch_size, UVec2::ONE, 1.0, 100.0);
            assert!(
                matches!(result, Err(TerrainError::InvalidPatchSize { patch_size: p }) if p == patch_size),
                "patch size {patch_size} should be rejected"
            );
        }

        for patch_size in [3, 5, 9, 17, 33] {
            assert!(
                LodManager::new(patch_size, UVec2::ONE, 1.0, 100.0).is_ok(),
                "patch size {patch_size} should be accepted"
            );
        }
    }

    #[test]
    fn max_lod_follows_the_patch_size() {
        assert_eq!(manager(3, UVec2::ONE, 100.0).max_lod(), 0);
        assert_eq!(manager(5, UVec2::ONE, 100.0).max_lod(), 1);
        assert_eq!(manager(9, UVec2::ONE, 100.0).max_lod(), 2);
        assert_eq!(manager(17, UVec2::ONE, 100.0).max_lod(), 3);
        assert_eq!(manager(33, UVec2::ONE, 100.0).max_lod(), 4);
    }

    #[test]
    fn regions_partition_the_view_range() {
        // patch size 9 -> 3 levels with widths 1:2:3 of 60.
        let m = manager(9, UVec2::ONE, 60.0);

        assert_eq!(m.regions(), &[10.0, 30.0, 60.0]);
    }

    #[test]
    fn distance_to_lod_uses_strict_thresholds() {
        let m = manager(9, UVec2::ONE, 60.0);

        assert_eq!(m.distance_to_lod(0.0), 0);
        assert_eq!(m.distance_to_lod(9.99), 0);
        // A boundary distance falls into the next region.
        assert_eq!(m.distance_to_lod(10.0), 1);
        assert_eq!(m.distance_to_lod(29.9), 1);
        assert_eq!(m.distance_to_lod(30.0), 2);
        // At or past the end of the last region: coarsest level.
        assert_eq!(m.distance_to_lod(60.0), 2);
        assert_eq!(m.distance_to_lod(1e9), 2);
    }

    #[test]
    fn lod_is_monotonic_in_distance() {
        let m = manager(17, UVec2::ONE, 500.0);

        let mut previous = 0;
        for step in 0..1000 {
            let lod = m.distance_to_lod(step as f32);
            assert!(lod >= previous);
            previous = lod;
        }
    }

    #[test]
    fn distant_camera_selects_the_coarsest_level_everywhere() {
        // 65x65 grid of patch size 9 -> 8x8 patches.
        let mut m = manager(9, UVec2::new(8, 8), 60.0);
        m.update(Vec3::new(0.0, 1000.0, 0.0));

        for pz in 0..8 {
            for px in 0..8 {
                let patch = m.patch_lod(UVec2::new(px, pz));
                assert_eq!(patch.core, 2);
                assert_eq!(patch.edges, EdgeFlags::empty());
            }
        }
    }

    #[test]
    fn near_camera_raises_edge_flags_toward_coarser_neighbors() {
        let mut m = manager(9, UVec2::new(3, 3), 30.0);

        // Directly over the center of patch (0, 0). Patch centers are 8
        // apart, so its neighbors land in region 1 and the far row and
        // column in region 2.
        m.update(Vec3::new(4.0, 0.0, 4.0));

        assert_eq!(
            m.patch_lod(UVec2::new(0, 0)),
            PatchLod {
                core: 0,
                edges: EdgeFlags::RIGHT | EdgeFlags::TOP,
            }
        );

        // The facing edges of the coarser neighbors stay clear.
        assert_eq!(
            m.patch_lod(UVec2::new(1, 0)),
            PatchLod {
                core: 1,
                edges: EdgeFlags::RIGHT,
            }
        );
        assert_eq!(
            m.patch_lod(UVec2::new(0, 1)),
            PatchLod {
                core: 1,
                edges: EdgeFlags::TOP,
            }
        );
        assert_eq!(
            m.patch_lod(UVec2::new(1, 1)),
            PatchLod {
                core: 1,
                edges: EdgeFlags::RIGHT | EdgeFlags::TOP,
            }
        );
        assert_eq!(m.patch_lod(UVec2::new(2, 2)).core, 2);
    }

    #[test]
    fn update_is_idempotent_for_a_fixed_camera() {
        let mut m = manager(9, UVec2::new(4, 4), 60.0);
        let camera = Vec3::new(13.0, 5.0, 27.0);

        m.update(camera);
        let first: Vec<PatchLod> = (0..16)
            .map(|i| m.patch_lod(UVec2::new(i % 4, i / 4)))
            .collect();

        m.update(camera);
        let second: Vec<PatchLod> = (0..16)
            .map(|i| m.patch_lod(UVec2::new(i % 4, i / 4)))
            .collect();

        assert_eq!(first, second);
    }
}
