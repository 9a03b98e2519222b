use glam::{IVec2, UVec2};
use rand::Rng;

use crate::height_field::HeightField;

/// Builds a square field by repeatedly choosing a random dividing line and
/// raising every sample on one side of it, with the raise amount decaying
/// linearly over the iterations. A four-direction FIR filter smooths the
/// result before it is normalized into `[min_height, max_height]`.
///
/// `filter` in `[0, 1)` controls the smoothing strength; `0.0` disables it.
pub fn fault_formation(
    size: u32,
    iterations: u32,
    min_height: f32,
    max_height: f32,
    filter: f32,
    rng: &mut impl Rng,
) -> HeightField {
    debug_assert!(size > 1);
    debug_assert!(min_height <= max_height);
    debug_assert!((0.0..1.0).contains(&filter));

    let mut field = HeightField::new(UVec2::splat(size));
    let delta_height = max_height - min_height;

    for iteration in 0..iterations {
        let ratio = iteration as f32 / iterations as f32;
        let height = max_height - ratio * delta_height;

        let (p1, p2) = random_dividing_line(size, rng);
        let dir = p2 - p1;

        for z in 0..size {
            for x in 0..size {
                let dir_in = IVec2::new(x as i32, z as i32) - p1;
                if dir_in.perp_dot(dir) > 0 {
                    let node = UVec2::new(x, z);
                    let raised = field.at(node.as_ivec2()) + height;
                    field.set(node, raised);
                }
            }
        }
    }

    apply_fir_filter(&mut field, filter);
    field.normalize(min_height, max_height);

    tracing::info!(
        "Generated fault formation height field ({0}x{0}, {1} iterations)",
        size,
        iterations
    );

    field
}

fn random_point(size: u32, rng: &mut impl Rng) -> IVec2 {
    IVec2::new(
        rng.random_range(0..size as i32),
        rng.random_range(0..size as i32),
    )
}

fn random_dividing_line(size: u32, rng: &mut impl Rng) -> (IVec2, IVec2) {
    let p1 = random_point(size, rng);
    let mut p2 = random_point(size, rng);
    // Coincident points would leave the whole field on one side.
    while p2 == p1 {
        p2 = random_point(size, rng);
    }

    (p1, p2)
}

/// One smoothing pass per sweep direction. Each sample becomes
/// `filter * previous + (1 - filter) * current`, carrying `previous` along
/// the sweep.
fn apply_fir_filter(field: &mut HeightField, filter: f32) {
    let size = field.size();

    // Left to right.
    for z in 0..size.y {
        let mut prev = field.at(IVec2::new(0, z as i32));
        for x in 1..size.x {
            prev = fir_single_point(field, UVec2::new(x, z), prev, filter);
        }
    }

    // Right to left.
    for z in 0..size.y {
        let mut prev = field.at(IVec2::new(size.x as i32 - 1, z as i32));
        for x in (0..size.x - 1).rev() {
            prev = fir_single_point(field, UVec2::new(x, z), prev, filter);
        }
    }

    // Bottom to top.
    for x in 0..size.x {
        let mut prev = field.at(IVec2::new(x as i32, 0));
        for z in 1..size.y {
            prev = fir_single_point(field, UVec2::new(x, z), prev, filter);
        }
    }

    // Top to bottom.
    for x in 0..size.x {
        let mut prev = field.at(IVec2::new(x as i32, size.y as i32 - 1));
        for z in (0..size.y - 1).rev() {
            prev = fir_single_point(field, UVec2::new(x, z), prev, filter);
        }
    }
}

fn fir_single_point(field: &mut HeightField, node: UVec2, prev: f32, filter: f32) -> f32 {
    let new_value = filter * prev + (1.0 - filter) * field.at(node.as_ivec2());
    field.set(node, new_value);
    new_value
}

/// Diamond/square displacement over a square field. The working rect size
/// starts at the next power of two >= `size` and halves every round while
/// the random amplitude shrinks by `2^-roughness`; neighbor reads wrap
/// around the field edges. The result is normalized into
/// `[min_height, max_height]`.
pub fn midpoint_displacement(
    size: u32,
    roughness: f32,
    min_height: f32,
    max_height: f32,
    rng: &mut impl Rng,
) -> HeightField {
    debug_assert!(size > 1);
    debug_assert!(roughness > 0.0);
    debug_assert!(min_height <= max_height);

    let mut field = HeightField::new(UVec2::splat(size));

    let mut rect_size = size.next_power_of_two();
    let mut cur_height = rect_size as f32 / 2.0;
    let height_reduce = 2.0_f32.powf(-roughness);

    while rect_size > 0 {
        diamond_step(&mut field, rect_size, cur_height, rng);
        square_step(&mut field, rect_size, cur_height, rng);

        rect_size /= 2;
        cur_height *= height_reduce;
    }

    field.normalize(min_height, max_height);

    tracing::info!(
        "Generated midpoint displacement height field ({0}x{0}, roughness {1})",
        size,
        roughness
    );

    field
}

/// `(x + step) % size`, snapped to the last node when it wraps past the
/// edge mid-row.
fn wrap_next(x: u32, step: u32, size: u32) -> u32 {
    let next = (x + step) % size;
    if next < x { size - 1 } else { next }
}

fn diamond_step(field: &mut HeightField, rect_size: u32, cur_height: f32, rng: &mut impl Rng) {
    let size = field.size().x;
    let half = rect_size / 2;

    for z in (0..size).step_by(rect_size as usize) {
        for x in (0..size).step_by(rect_size as usize) {
            let next_x = wrap_next(x, rect_size, size);
            let next_z = wrap_next(z, rect_size, size);

            let top_left = field.at(IVec2::new(x as i32, z as i32));
            let top_right = field.at(IVec2::new(next_x as i32, z as i32));
            let bottom_left = field.at(IVec2::new(x as i32, next_z as i32));
            let bottom_right = field.at(IVec2::new(next_x as i32, next_z as i32));

            let mid = UVec2::new((x + half) % size, (z + half) % size);

            let average = (top_left + top_right + bottom_left + bottom_right) / 4.0;
            let offset = rng.random_range(-cur_height..=cur_height);

            field.set(mid, average + offset);
        }
    }
}

fn square_step(field: &mut HeightField, rect_size: u32, cur_height: f32, rng: &mut impl Rng) {
    let size = field.size().x;
    let half = rect_size / 2;

    for z in (0..size).step_by(rect_size as usize) {
        for x in (0..size).step_by(rect_size as usize) {
            let next_x = wrap_next(x, rect_size, size);
            let next_z = wrap_next(z, rect_size, size);

            let mid_x = (x + half) % size;
            let mid_z = (z + half) % size;
            let prev_mid_x = (x + size - half) % size;
            let prev_mid_z = (z + size - half) % size;

            let cur_top_left = field.at(IVec2::new(x as i32, z as i32));
            let cur_top_right = field.at(IVec2::new(next_x as i32, z as i32));
            let cur_center = field.at(IVec2::new(mid_x as i32, mid_z as i32));
            let prev_z_center = field.at(IVec2::new(mid_x as i32, prev_mid_z as i32));
            let cur_bottom_left = field.at(IVec2::new(x as i32, next_z as i32));
            let prev_x_center = field.at(IVec2::new(prev_mid_x as i32, mid_z as i32));

            let left_mid = (cur_top_left + cur_center + cur_bottom_left + prev_x_center) / 4.0
                + rng.random_range(-cur_height..=cur_height);
            let top_mid = (cur_top_left + cur_center + cur_top_right + prev_z_center) / 4.0
                + rng.random_range(-cur_height..=cur_height);

            field.set(UVec2::new(mid_x, z), top_mid);
            field.set(UVec2::new(x, mid_z), left_mid);
        }
    }
}
