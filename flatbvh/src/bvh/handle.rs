use super::Bvh;
use crate::error::{Error, Result};
use crate::primitives::AABB;

/// Owning handle to a built tree.
///
/// The tree is released by [`BvhHandle::destroy`] or on drop, whichever comes
/// first. Destroying twice is a no-op; any other use of a destroyed handle
/// returns [`Error::InvalidHandle`].
#[derive(Debug)]
pub struct BvhHandle {
    bvh: Option<Bvh>,
}

impl BvhHandle {
    pub(crate) fn new(bvh: Bvh) -> Self {
        Self { bvh: Some(bvh) }
    }

    pub fn get(&self) -> Result<&Bvh> {
        self.bvh.as_ref().ok_or(Error::InvalidHandle)
    }

    pub fn destroy(&mut self) {
        if let Some(bvh) = self.bvh.take() {
            log::debug!("releasing BVH with {} nodes", bvh.node_count());
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.bvh.is_none()
    }

    /// Take the tree out of the handle, leaving it destroyed.
    pub fn take(&mut self) -> Result<Bvh> {
        self.bvh.take().ok_or(Error::InvalidHandle)
    }

    pub fn node_count(&self) -> Result<usize> {
        Ok(self.get()?.node_count())
    }

    pub fn bounds(&self) -> Result<AABB> {
        Ok(self.get()?.bounds())
    }

    pub fn permutation(&self) -> Result<&[u32]> {
        Ok(self.get()?.permutation())
    }
}

impl From<Bvh> for BvhHandle {
    fn from(bvh: Bvh) -> Self {
        Self::new(bvh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::{create_bvh, BuildConfig};
    use glam::Vec3;

    fn handle() -> BvhHandle {
        let boxes = [
            AABB::new(Vec3::ZERO, Vec3::ONE),
            AABB::new(Vec3::splat(2.0), Vec3::splat(3.0)),
        ];
        create_bvh(&boxes, &BuildConfig::default()).unwrap()
    }

    #[test]
    fn destroy_twice_is_a_no_op() {
        let mut h = handle();
        assert!(!h.is_destroyed());
        h.destroy();
        assert!(h.is_destroyed());
        h.destroy();
        assert!(h.is_destroyed());
    }

    #[test]
    fn destroyed_handle_reports_invalid() {
        let mut h = handle();
        assert_eq!(h.node_count().unwrap(), 3);
        h.destroy();
        assert!(matches!(h.get(), Err(Error::InvalidHandle)));
        assert!(matches!(h.bounds(), Err(Error::InvalidHandle)));
        assert!(matches!(h.take(), Err(Error::InvalidHandle)));
    }

    #[test]
    fn take_leaves_handle_destroyed() {
        let mut h = handle();
        let bvh = h.take().unwrap();
        assert_eq!(bvh.primitive_count(), 2);
        assert!(h.is_destroyed());
        let h2 = BvhHandle::from(bvh);
        assert_eq!(h2.permutation().unwrap().len(), 2);
    }
}
