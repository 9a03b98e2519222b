use std::ops::Range;

use glam::{IVec2, Mat4, UVec2, Vec2, Vec3};

use crate::lod_manager::{EdgeFlags, LodManager, PatchLod, TerrainError, validate_patch_size};
use crate::math::{BoundingBox, Frustum};
use crate::terrain::HeightFieldProvider;

/// A vertex of the shared terrain mesh.
#[derive(Clone, Copy, Debug, bytemuck::NoUninit)]
#[repr(C)]
pub struct TerrainVertex {
    pub position: Vec3,
    pub tex_coord: Vec2,
    pub normal: Vec3,
}

/// Location of one stitching permutation inside the shared index buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexRange {
    pub start: u32,
    pub count: u32,
}

/// Plain-old-data draw arguments a host can copy straight into an
/// indirect draw buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::NoUninit)]
pub struct PatchDraw {
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
}

/// Issues indexed draws for visible patches.
///
/// [`GeomipGrid::render`] calls this exactly once per visible patch, with
/// a range into [`GeomipGrid::indices`] and the patch's offset into
/// [`GeomipGrid::vertices`].
pub trait PatchRenderer {
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32);
}

/// Captures draws as plain draw arguments instead of issuing them.
impl PatchRenderer for Vec<PatchDraw> {
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32) {
        self.push(PatchDraw {
            index_count: indices.end - indices.start,
            first_index: indices.start,
            base_vertex,
        });
    }
}

/// Per-edge levels for one triangle fan.
#[derive(Clone, Copy)]
struct FanLods {
    core: u32,
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
}

/// A terrain mesh split into square patches that all share one vertex
/// buffer and one pre-baked index buffer.
///
/// The index buffer holds, for every LOD level, all 16 edge-stitching
/// permutations as contiguous ranges. Indices are patch-relative (built
/// with the full-grid row stride), so a single table serves every patch
/// through its base vertex.
pub struct GeomipGrid {
    width: u32,
    depth: u32,
    patch_size: u32,
    world_scale: f32,
    num_patches: UVec2,
    max_lod: u32,
    vertices: Vec<TerrainVertex>,
    indices: Vec<u32>,
    /// One range per 4-bit edge mask, per LOD level.
    lod_ranges: Vec<[IndexRange; 16]>,
    /// Per-patch elevation bounds, row-major.
    patch_bounds: Vec<(f32, f32)>,
    lod_manager: LodManager,
}

impl GeomipGrid {
    pub fn new(
        width: u32,
        depth: u32,
        patch_size: u32,
        max_view_distance: f32,
        terrain: &impl HeightFieldProvider,
    ) -> Result<Self, TerrainError> {
        validate_patch_size(patch_size)?;
        check_dimension("width", width, patch_size)?;
        check_dimension("depth", depth, patch_size)?;

        let num_patches = UVec2::new(
            (width - 1) / (patch_size - 1),
            (depth - 1) / (patch_size - 1),
        );
        let world_scale = terrain.world_scale();

        let lod_manager =
            LodManager::new(patch_size, num_patches, world_scale, max_view_distance)?;
        let max_lod = lod_manager.max_lod();

        let mut grid = Self {
            width,
            depth,
            patch_size,
            world_scale,
            num_patches,
            max_lod,
            vertices: Vec::new(),
            indices: Vec::new(),
            lod_ranges: Vec::new(),
            patch_bounds: Vec::new(),
            lod_manager,
        };

        grid.init_vertices(terrain);
        grid.init_indices();
        grid.calc_normals();
        grid.build_patch_bounds(terrain);

        tracing::info!(
            "Created geomip grid ({}x{}): {} patches, {} LOD levels, {} vertices, {} indices",
            width,
            depth,
            num_patches.x * num_patches.y,
            max_lod + 1,
            grid.vertices.len(),
            grid.indices.len()
        );

        Ok(grid)
    }

    /// Updates the LOD map for the camera position, culls patches against
    /// the view frustum and issues one indexed draw per visible patch.
    ///
    /// Culling tests the eight corners of each patch's bounding box, so a
    /// box that overlaps the frustum without placing a corner inside it is
    /// skipped (see [`Frustum::contains_box_corner`]).
    pub fn render(
        &mut self,
        camera_pos: Vec3,
        view_proj: Mat4,
        renderer: &mut impl PatchRenderer,
    ) {
        self.lod_manager.update(camera_pos);

        let frustum = Frustum::from(view_proj);

        for pz in 0..self.num_patches.y {
            for px in 0..self.num_patches.x {
                let patch = UVec2::new(px, pz);

                if !frustum.contains_box_corner(&self.patch_bounding_box(patch)) {
                    continue;
                }

                let PatchLod { core, edges } = self.lod_manager.patch_lod(patch);
                let range = self.index_range(core, edges);

                let x = px * (self.patch_size - 1);
                let z = pz * (self.patch_size - 1);
                let base_vertex = (z * self.width + x) as i32;

                renderer.draw_indexed(range.start..range.start + range.count, base_vertex);
            }
        }
    }

    pub fn vertices(&self) -> &[TerrainVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn index_range(&self, lod: u32, edges: EdgeFlags) -> IndexRange {
        debug_assert!(lod <= self.max_lod);

        self.lod_ranges[lod as usize][edges.bits() as usize]
    }

    pub fn lod_manager(&self) -> &LodManager {
        &self.lod_manager
    }

    pub fn num_patches(&self) -> UVec2 {
        self.num_patches
    }

    pub fn max_lod(&self) -> u32 {
        self.max_lod
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    fn init_vertices(&mut self, terrain: &impl HeightFieldProvider) {
        let size = terrain.size().as_vec2();
        let texture_scale = terrain.texture_scale();

        let mut vertices = Vec::with_capacity(self.width as usize * self.depth as usize);

        for z in 0..self.depth {
            for x in 0..self.width {
                let height = terrain.height_at(IVec2::new(x as i32, z as i32));

                vertices.push(TerrainVertex {
                    position: Vec3::new(
                        x as f32 * self.world_scale,
                        height,
                        z as f32 * self.world_scale,
                    ),
                    tex_coord: Vec2::new(
                        texture_scale * x as f32 / size.x,
                        texture_scale * z as f32 / size.y,
                    ),
                    normal: Vec3::ZERO,
                });
            }
        }

        self.vertices = vertices;
    }

    fn init_indices(&mut self) {
        let mut indices = Vec::with_capacity(self.index_capacity());
        let mut lod_ranges = Vec::with_capacity(self.max_lod as usize + 1);

        for lod in 0..=self.max_lod {
            let mut ranges = [IndexRange::default(); 16];

            for bits in 0..16_u8 {
                let edges = EdgeFlags::from_bits_truncate(bits);
                let start = indices.len() as u32;

                self.init_indices_single(&mut indices, lod, edges);

                ranges[bits as usize] = IndexRange {
                    start,
                    count: indices.len() as u32 - start,
                };
            }

            lod_ranges.push(ranges);
        }

        self.indices = indices;
        self.lod_ranges = lod_ranges;
    }

    /// Reservation upper bound: every level's full-detail quad count times
    /// 16 permutations. Stitched permutations emit fewer indices.
    fn index_capacity(&self) -> usize {
        let mut num_quads = ((self.patch_size - 1) * (self.patch_size - 1)) as usize;
        let mut total = 0;
        for _ in 0..=self.max_lod {
            total += num_quads * 6 * 16;
            num_quads /= 4;
        }

        total
    }

    /// Emits the triangle fans of one `(level, edge mask)` permutation.
    /// Only fans on the patch boundary see the neighboring level.
    fn init_indices_single(&self, indices: &mut Vec<u32>, core: u32, edges: EdgeFlags) {
        let lod_left = edge_lod(core, edges, EdgeFlags::LEFT);
        let lod_right = edge_lod(core, edges, EdgeFlags::RIGHT);
        let lod_top = edge_lod(core, edges, EdgeFlags::TOP);
        let lod_bottom = edge_lod(core, edges, EdgeFlags::BOTTOM);

        let fan_step = 1 << (core + 1);
        let end_pos = self.patch_size - 1 - fan_step;

        for z in (0..=end_pos).step_by(fan_step as usize) {
            for x in (0..=end_pos).step_by(fan_step as usize) {
                let lods = FanLods {
                    core,
                    left: if x == 0 { lod_left } else { core },
                    right: if x == end_pos { lod_right } else { core },
                    top: if z == end_pos { lod_top } else { core },
                    bottom: if z == 0 { lod_bottom } else { core },
                };

                self.create_triangle_fan(indices, UVec2::new(x, z), lods);
            }
        }
    }

    /// Walks the fan perimeter counterclockwise from the bottom-left
    /// corner, emitting one triangle per perimeter step. An edge at a
    /// coarser level takes a single full-length step, which is what keeps
    /// the seam free of T-junctions.
    fn create_triangle_fan(&self, indices: &mut Vec<u32>, fan: UVec2, lods: FanLods) {
        let step_left = 1 << lods.left;
        let step_right = 1 << lods.right;
        let step_top = 1 << lods.top;
        let step_bottom = 1 << lods.bottom;
        let step_center = 1 << lods.core;

        let width = self.width;
        let (x, z) = (fan.x, fan.y);

        let center = (z + step_center) * width + x + step_center;

        // Up the left edge.
        let mut current = z * width + x;
        let mut next = (z + step_left) * width + x;
        push_triangle(indices, center, current, next);

        if lods.left == lods.core {
            current = next;
            next += step_left * width;
            push_triangle(indices, center, current, next);
        }

        // Along the top edge.
        current = next;
        next += step_top;
        push_triangle(indices, center, current, next);

        if lods.top == lods.core {
            current = next;
            next += step_top;
            push_triangle(indices, center, current, next);
        }

        // Down the right edge.
        current = next;
        next -= step_right * width;
        push_triangle(indices, center, current, next);

        if lods.right == lods.core {
            current = next;
            next -= step_right * width;
            push_triangle(indices, center, current, next);
        }

        // Back along the bottom edge.
        current = next;
        next -= step_bottom;
        push_triangle(indices, center, current, next);

        if lods.bottom == lods.core {
            current = next;
            next -= step_bottom;
            push_triangle(indices, center, current, next);
        }
    }

    /// Face normals are accumulated from the full-detail triangles of
    /// every patch; coarser levels reuse the same vertex normals.
    fn calc_normals(&mut self) {
        let full_detail = self.lod_ranges[0][0];
        let range = full_detail.start as usize..(full_detail.start + full_detail.count) as usize;

        for pz in 0..self.num_patches.y {
            for px in 0..self.num_patches.x {
                let base_vertex =
                    pz * (self.patch_size - 1) * self.width + px * (self.patch_size - 1);

                for triangle in self.indices[range.clone()].chunks_exact(3) {
                    let i0 = (base_vertex + triangle[0]) as usize;
                    let i1 = (base_vertex + triangle[1]) as usize;
                    let i2 = (base_vertex + triangle[2]) as usize;

                    let v1 = self.vertices[i1].position - self.vertices[i0].position;
                    let v2 = self.vertices[i2].position - self.vertices[i0].position;
                    let normal = v1.cross(v2).normalize_or_zero();

                    self.vertices[i0].normal += normal;
                    self.vertices[i1].normal += normal;
                    self.vertices[i2].normal += normal;
                }
            }
        }

        for vertex in self.vertices.iter_mut() {
            vertex.normal = vertex.normal.normalize_or_zero();
        }
    }

    fn build_patch_bounds(&mut self, terrain: &impl HeightFieldProvider) {
        let area = self.num_patches.x as usize * self.num_patches.y as usize;
        let mut bounds = Vec::with_capacity(area);

        for pz in 0..self.num_patches.y {
            for px in 0..self.num_patches.x {
                let min_node = UVec2::new(px, pz) * (self.patch_size - 1);
                let max_node = min_node + UVec2::splat(self.patch_size - 1);

                let mut min_height = f32::INFINITY;
                let mut max_height = f32::NEG_INFINITY;

                for z in min_node.y..=max_node.y {
                    for x in min_node.x..=max_node.x {
                        let height = terrain.height_at(IVec2::new(x as i32, z as i32));
                        min_height = min_height.min(height);
                        max_height = max_height.max(height);
                    }
                }

                bounds.push((min_height, max_height));
            }
        }

        self.patch_bounds = bounds;
    }

    fn patch_bounding_box(&self, patch: UVec2) -> BoundingBox {
        let (min_height, max_height) =
            self.patch_bounds[(patch.y * self.num_patches.x + patch.x) as usize];

        let base = patch * (self.patch_size - 1);

        BoundingBox {
            min: Vec3::new(
                base.x as f32 * self.world_scale,
                min_height,
                base.y as f32 * self.world_scale,
            ),
            max: Vec3::new(
                (base.x + self.patch_size - 1) as f32 * self.world_scale,
                max_height,
                (base.y + self.patch_size - 1) as f32 * self.world_scale,
            ),
        }
    }
}

fn edge_lod(core: u32, edges: EdgeFlags, flag: EdgeFlags) -> u32 {
    if edges.contains(flag) { core + 1 } else { core }
}

fn push_triangle(indices: &mut Vec<u32>, v0: u32, v1: u32, v2: u32) {
    indices.extend_from_slice(&[v0, v1, v2]);
}

fn check_dimension(dim: &'static str, size: u32, patch_size: u32) -> Result<(), TerrainError> {
    if size >= patch_size && (size - 1) % (patch_size - 1) == 0 {
        return Ok(());
    }

    let cells = patch_size - 1;
    let recommended = size.saturating_sub(1).div_ceil(cells).max(1) * cells + 1;

    Err(TerrainError::DimensionMismatch {
        dim,
        size,
        patch_size,
        recommended,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::height_field::HeightField;
    use crate::terrain::Terrain;

    fn flat_terrain(size: u32) -> Terrain {
        Terrain::new(HeightField::new(UVec2::splat(size)), 1.0, 1.0)
    }

    #[test]
    fn rejects_untileable_dimensions() {
        let terrain = flat_terrain(60);

        let result = GeomipGrid::new(60, 60, 9, 100.0, &terrain);
        assert!(matches!(
            result,
            Err(TerrainError::DimensionMismatch {
                dim: "width",
                size: 60,
                recommended: 65,
                ..
            })
        ));

        let result = GeomipGrid::new(65, 60, 9, 100.0, &terrain);
        assert!(matches!(
            result,
            Err(TerrainError::DimensionMismatch { dim: "depth", .. })
        ));
    }

    #[test]
    fn rejects_invalid_patch_sizes_before_dimensions() {
        let terrain = flat_terrain(65);

        assert!(matches!(
            GeomipGrid::new(65, 65, 4, 100.0, &terrain),
            Err(TerrainError::InvalidPatchSize { patch_size: 4 })
        ));
        assert!(matches!(
            GeomipGrid::new(65, 65, 6, 100.0, &terrain),
            Err(TerrainError::InvalidPatchSize { patch_size: 6 })
        ));
    }

    #[test]
    fn full_detail_index_counts_follow_the_level() {
        let terrain = flat_terrain(65);
        let grid = GeomipGrid::new(65, 65, 9, 100.0, &terrain).unwrap();

        // 6 * ((patch_size - 1) / 2^lod)^2 when nothing is stitched.
        assert_eq!(grid.index_range(0, EdgeFlags::empty()).count, 384);
        assert_eq!(grid.index_range(1, EdgeFlags::empty()).count, 96);
        assert_eq!(grid.index_range(2, EdgeFlags::empty()).count, 24);
    }

    #[test]
    fn stitched_edges_drop_one_triangle_per_boundary_fan() {
        let terrain = flat_terrain(65);
        let grid = GeomipGrid::new(65, 65, 9, 100.0, &terrain).unwrap();

        // Four fans per side at LOD 0 (fan step 2 across 8 cells).
        let fans_per_side = 4;
        let full = grid.index_range(0, EdgeFlags::empty()).count;

        for flag in [
            EdgeFlags::LEFT,
            EdgeFlags::RIGHT,
            EdgeFlags::TOP,
            EdgeFlags::BOTTOM,
        ] {
            assert_eq!(grid.index_range(0, flag).count, full - 3 * fans_per_side);
        }

        assert_eq!(
            grid.index_range(0, EdgeFlags::LEFT | EdgeFlags::TOP).count,
            full - 3 * fans_per_side * 2
        );
        assert_eq!(
            grid.index_range(0, EdgeFlags::all()).count,
            full - 3 * fans_per_side * 4
        );
    }

    #[test]
    fn permutation_ranges_tile_the_index_buffer() {
        let terrain = flat_terrain(33);
        let grid = GeomipGrid::new(33, 33, 5, 100.0, &terrain).unwrap();

        let mut expected_start = 0;
        for lod in 0..=grid.max_lod() {
            for bits in 0..16_u8 {
                let range = grid.index_range(lod, EdgeFlags::from_bits_truncate(bits));
                assert_eq!(range.start, expected_start);
                assert!(range.count > 0);
                expected_start += range.count;
            }
        }

        assert_eq!(expected_start as usize, grid.indices().len());
    }

    #[test]
    fn patch_relative_indices_stay_inside_the_vertex_buffer() {
        let terrain = flat_terrain(65);
        let grid = GeomipGrid::new(65, 65, 9, 100.0, &terrain).unwrap();

        // The highest patch-relative index is the far corner of a patch.
        let max_index = grid.indices().iter().copied().max().unwrap();
        assert_eq!(max_index, 8 * 65 + 8);

        // Offset by the last patch's base vertex it addresses the last
        // vertex of the grid.
        let last_base = 56 * 65 + 56;
        assert_eq!(last_base + max_index, grid.vertices().len() as u32 - 1);
    }

    #[test]
    fn vertices_follow_the_height_field_and_scales() {
        let mut field = HeightField::new(UVec2::splat(5));
        field.set(UVec2::new(2, 3), 7.5);
        let terrain = Terrain::new(field, 2.0, 10.0);

        let grid = GeomipGrid::new(5, 5, 5, 100.0, &terrain).unwrap();

        let vertex = &grid.vertices()[3 * 5 + 2];
        assert_eq!(vertex.position, Vec3::new(4.0, 7.5, 6.0));
        assert_eq!(vertex.tex_coord, Vec2::new(4.0, 6.0));
    }

    #[test]
    fn flat_field_normals_point_straight_up() {
        let terrain = flat_terrain(17);
        let grid = GeomipGrid::new(17, 17, 5, 100.0, &terrain).unwrap();

        for vertex in grid.vertices() {
            assert_eq!(vertex.normal, Vec3::Y);
        }
    }

    #[test]
    fn render_emits_one_draw_per_visible_patch() {
        let terrain = flat_terrain(65);
        let mut grid = GeomipGrid::new(65, 65, 9, 200.0, &terrain).unwrap();

        // Looking straight down from high above the center: every patch
        // is inside the frustum and beyond the last LOD region.
        let camera_pos = Vec3::new(32.0, 500.0, 32.0);
        let projection = Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, 0.1, 1000.0);
        let view = Mat4::look_at_rh(camera_pos, Vec3::new(32.0, 0.0, 32.0), Vec3::Z);

        let mut draws: Vec<PatchDraw> = Vec::new();
        grid.render(camera_pos, projection * view, &mut draws);

        assert_eq!(draws.len(), 64);

        let expected = grid.index_range(2, EdgeFlags::empty());
        for draw in &draws {
            assert_eq!(draw.first_index, expected.start);
            assert_eq!(draw.index_count, expected.count);
        }

        let mut bases: Vec<i32> = draws.iter().map(|draw| draw.base_vertex).collect();
        bases.sort_unstable();
        bases.dedup();
        assert_eq!(bases.len(), 64);
    }

    #[test]
    fn render_culls_patches_behind_the_camera() {
        let terrain = flat_terrain(65);
        let mut grid = GeomipGrid::new(65, 65, 9, 200.0, &terrain).unwrap();

        // Beyond the field, looking further away from it.
        let camera_pos = Vec3::new(32.0, 5.0, 200.0);
        let projection = Mat4::perspective_rh(60.0_f32.to_radians(), 1.0, 0.1, 1000.0);
        let view = Mat4::look_at_rh(camera_pos, Vec3::new(32.0, 5.0, 400.0), Vec3::Y);

        let mut draws: Vec<PatchDraw> = Vec::new();
        grid.render(camera_pos, projection * view, &mut draws);

        assert!(draws.is_empty());
    }

    #[test]
    fn render_selects_stitching_permutations_from_the_lod_map() {
        // 3x3 patches of size 9.
        let terrain = flat_terrain(25);
        let mut grid = GeomipGrid::new(25, 25, 9, 30.0, &terrain).unwrap();

        // Hovering just over the center of patch (0, 0): its core stays in
        // region 0 while both neighbors land in region 1, and the 90
        // degree downward frustum only reaches the four near patches.
        let camera_pos = Vec3::new(4.0, 4.9, 4.0);
        let projection = Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(camera_pos, Vec3::new(4.0, 0.0, 4.0), Vec3::Z);

        let mut draws: Vec<PatchDraw> = Vec::new();
        grid.render(camera_pos, projection * view, &mut draws);

        assert_eq!(draws.len(), 4);

        let expect = |core, edges| grid.index_range(core, edges);

        assert_eq!(draws[0].base_vertex, 0);
        assert_eq!(
            draws[0].first_index,
            expect(0, EdgeFlags::RIGHT | EdgeFlags::TOP).start
        );
        assert_eq!(
            draws[0].index_count,
            expect(0, EdgeFlags::RIGHT | EdgeFlags::TOP).count
        );

        assert_eq!(draws[1].base_vertex, 8);
        assert_eq!(draws[1].first_index, expect(1, EdgeFlags::RIGHT).start);

        assert_eq!(draws[2].base_vertex, 8 * 25);
        assert_eq!(draws[2].first_index, expect(1, EdgeFlags::TOP).start);

        assert_eq!(draws[3].base_vertex, 8 * 25 + 8);
        assert_eq!(
            draws[3].first_index,
            expect(1, EdgeFlags::RIGHT | EdgeFlags::TOP).start
        );
    }

    #[test]
    fn recommends_the_next_tileable_dimension() {
        let err = check_dimension("width", 60, 9).unwrap_err();
        assert!(matches!(
            err,
            TerrainError::DimensionMismatch {
                recommended: 65,
                ..
            }
        ));

        let err = check_dimension("width", 1, 9).unwrap_err();
        assert!(matches!(
            err,
            TerrainError::DimensionMismatch { recommended: 9, .. }
        ));

        assert!(check_dimension("width", 65, 9).is_ok());
        assert!(check_dimension("width", 9, 9).is_ok());
    }
}
