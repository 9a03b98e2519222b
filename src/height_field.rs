use std::io::{Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{IVec2, UVec2};

/// A rectangular grid of evenly spaced elevation samples.
///
/// Samples are the vertices of the grid, stored row-major at
/// `z * size.x + x`.
pub struct HeightField {
    /// X and Z sizes counted in amount of samples (*not* cells!).
    size: UVec2,
    heights: Vec<f32>,
}

impl HeightField {
    /// A zero-filled field.
    pub fn new(size: UVec2) -> Self {
        debug_assert!(size.x > 0 && size.y > 0, "empty height field");
        Self {
            size,
            heights: vec![0.0; size.x as usize * size.y as usize],
        }
    }

    /// Wraps an existing row-major sample buffer. The buffer length must
    /// equal `size.x * size.y`.
    pub fn from_samples(size: UVec2, heights: Vec<f32>) -> Result<Self, std::io::Error> {
        if heights.len() != size.x as usize * size.y as usize {
            return Err(std::io::ErrorKind::InvalidData.into());
        }

        Ok(Self { size, heights })
    }

    /// Reads `size.x * size.y` little-endian `f32` samples.
    pub fn from_reader<R>(size: UVec2, r: &mut R) -> std::io::Result<Self>
    where
        R: Read,
    {
        let mut heights = vec![0.0_f32; size.x as usize * size.y as usize];
        for height in heights.iter_mut() {
            *height = r.read_f32::<LittleEndian>()?;
        }

        Ok(Self { size, heights })
    }

    /// Loads a raw file of little-endian `f32` samples. The field is
    /// assumed square and the side length is derived from the file size;
    /// anything that is not a square count of floats is `InvalidData`.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        if data.is_empty() || data.len() % 4 != 0 {
            return Err(std::io::ErrorKind::InvalidData.into());
        }

        let count = data.len() / 4;
        let side = (count as f64).sqrt().round() as u32;
        if side as usize * side as usize != count {
            return Err(std::io::ErrorKind::InvalidData.into());
        }

        let field = Self::from_reader(UVec2::splat(side), &mut std::io::Cursor::new(data))?;

        tracing::info!(
            "Loaded height field ({}x{}) from {}",
            field.size.x,
            field.size.y,
            path.as_ref().display()
        );

        Ok(field)
    }

    /// Writes all samples as little-endian `f32`s, the inverse of
    /// [`HeightField::from_reader`].
    pub fn write_to<W>(&self, w: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        for &height in &self.heights {
            w.write_f32::<LittleEndian>(height)?;
        }

        Ok(())
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn samples(&self) -> &[f32] {
        &self.heights
    }

    /// Returns the sample at the specified grid node.
    ///
    /// NOTE: Coordinates outside the field are clamped to the nearest edge,
    /// creating a flat outer border.
    pub fn at(&self, node: IVec2) -> f32 {
        let x = node.x.clamp(0, self.size.x as i32 - 1);
        let z = node.y.clamp(0, self.size.y as i32 - 1);

        let index = z as usize * self.size.x as usize + x as usize;

        self.heights[index]
    }

    pub fn set(&mut self, node: UVec2, height: f32) {
        debug_assert!(node.x < self.size.x && node.y < self.size.y);

        let index = node.y as usize * self.size.x as usize + node.x as usize;
        self.heights[index] = height;
    }

    pub fn min_max(&self) -> (f32, f32) {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &height in &self.heights {
            min = min.min(height);
            max = max.max(height);
        }

        (min, max)
    }

    /// Remaps all samples into `[min_range, max_range]`. A flat field maps
    /// to `min_range`.
    pub fn normalize(&mut self, min_range: f32, max_range: f32) {
        let (min, max) = self.min_max();
        if max <= min {
            self.heights.fill(min_range);
            return;
        }

        let delta = max - min;
        let range = max_range - min_range;
        for height in self.heights.iter_mut() {
            *height = (*height - min) / delta * range + min_range;
        }
    }
}
