use glam::{vec3, Mat4, Vec3};

// --- AABB ---
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for AABB {
    fn default() -> Self {
        Self::empty()
    }
}

impl AABB {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Union identity: contains nothing, absorbs into anything.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Bounds of a triangle, padded along any axis where it is flat so the
    /// box never collapses to zero thickness.
    pub fn from_triangle(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        let min = v0.min(v1).min(v2);
        let max = v0.max(v1).max(v2);

        let size = max - min;
        let eps = 1e-5;
        let pad = vec3(
            if size.x < eps { eps } else { 0. },
            if size.y < eps { eps } else { 0. },
            if size.z < eps { eps } else { 0. },
        );

        AABB {
            min: min - pad * 0.5,
            max: max + pad * 0.5,
        }
    }

    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Overlap of two boxes. May be inverted (see [`AABB::is_empty`]).
    pub fn intersection(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Surface area, zero for empty or inverted boxes.
    pub fn area(&self) -> f32 {
        let d = self.max - self.min;
        if d.x < 0.0 || d.y < 0.0 || d.z < 0.0 {
            0.0
        } else {
            2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// 0 = x, 1 = y, 2 = z.
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Finite and not inverted. Builders only accept boxes that pass this.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && !self.is_empty()
    }

    pub fn contains(&self, other: &AABB) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// Bounds of this box after an affine transform.
    pub fn transform(&self, m: Mat4) -> AABB {
        if self.is_empty() {
            return *self;
        }
        let mut out = AABB::empty();
        for i in 0..8 {
            let corner = vec3(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.grow(m.transform_point3(corner));
        }
        out
    }

    /// Clip against the plane `axis = pos`, returning the left and right parts.
    /// A side the box does not reach comes back empty.
    pub fn split(&self, axis: usize, pos: f32) -> (AABB, AABB) {
        let mut left = *self;
        let mut right = *self;
        left.max[axis] = left.max[axis].min(pos);
        right.min[axis] = right.min[axis].max(pos);
        if left.is_empty() {
            left = AABB::empty();
        }
        if right.is_empty() {
            right = AABB::empty();
        }
        (left, right)
    }
}
