use glam::{Mat4, Vec3, Vec4};

/// A plane of the form `normal . p + distance = 0`.
///
/// Planes extracted from a view-projection matrix are left unnormalized;
/// only the sign of [`Plane::signed_distance`] is ever used.
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    fn from_row(row: Vec4) -> Self {
        Self {
            normal: row.truncate(),
            distance: row.w,
        }
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Six view frustum planes, with normals pointing into the frustum.
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl From<Mat4> for Frustum {
    fn from(view_proj: Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let left = Plane::from_row(r3 + r0);
        let right = Plane::from_row(r3 - r0);
        let bottom = Plane::from_row(r3 + r1);
        let top = Plane::from_row(r3 - r1);
        let near = Plane::from_row(r2); // wgpu (D3D/Metal, 0..1 Z)
        let far = Plane::from_row(r3 - r2);

        Frustum {
            planes: [left, right, bottom, top, near, far],
        }
    }
}

impl Frustum {
    /// A point is inside when it is on the positive side of all six planes.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) >= 0.0)
    }

    /// Whether any corner of the box lies inside the frustum.
    ///
    /// NOTE: A box can overlap the frustum without placing a corner inside
    /// it (e.g. a box much larger than the frustum); such boxes are
    /// reported as outside.
    pub fn contains_box_corner(&self, b: &BoundingBox) -> bool {
        b.corners()
            .iter()
            .any(|&corner| self.contains_point(corner))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ]
    }
}
