// src/bvh/binned.rs
use super::{BuildConfig, Bvh, TreeNode};
use crate::primitives::AABB;
use glam::Vec3;
use std::cmp::Ordering;

// Below this extent an axis is treated as flat and not binned.
const MIN_EXTENT: f32 = 1e-6;

#[derive(Clone, Copy, Debug, Default)]
struct Bin {
    bounds: AABB,
    count: u32,
}

/// Best object split found by [`find_object_split`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct ObjectSplit {
    pub axis: usize,
    /// Items whose centroid falls in a bin `<= bin` go left.
    pub bin: usize,
    pub cost: f32,
    pub left: AABB,
    pub right: AABB,
    origin: f32,
    scale: f32,
    num_bins: usize,
}

impl ObjectSplit {
    pub fn goes_left(&self, center: Vec3) -> bool {
        bin_index(center[self.axis], self.origin, self.scale, self.num_bins) <= self.bin
    }
}

fn bin_index(val: f32, origin: f32, scale: f32, num_bins: usize) -> usize {
    let idx = ((val - origin) * scale) as usize;
    idx.min(num_bins - 1)
}

/// SAH cost of splitting into two children, normalized by the parent area.
pub(crate) fn split_cost(
    config: &BuildConfig,
    parent_area: f32,
    left_area: f32,
    left_count: u32,
    right_area: f32,
    right_count: u32,
) -> f32 {
    let inv = if parent_area > 0.0 { 1.0 / parent_area } else { 1.0 };
    config.traversal_cost
        + (left_area * left_count as f32 + right_area * right_count as f32) * inv
}

/// Binned SAH sweep over the centroids of `items` on all three axes.
///
/// `items` yields `(bounds, centroid)` and is walked once per axis. Returns
/// `None` when every axis is flat or no bin boundary separates the items.
pub(crate) fn find_object_split<I>(
    items: I,
    parent_area: f32,
    centroid_bounds: &AABB,
    config: &BuildConfig,
) -> Option<ObjectSplit>
where
    I: Iterator<Item = (AABB, Vec3)> + Clone,
{
    let num_bins = config.num_bins;
    let mut best: Option<ObjectSplit> = None;

    let mut bins = vec![Bin::default(); num_bins];
    let mut right_area = vec![0.0f32; num_bins];
    let mut right_count = vec![0u32; num_bins];
    let mut right_box = vec![AABB::empty(); num_bins];

    for axis in 0..3 {
        let split_len = centroid_bounds.extent()[axis];
        if split_len < MIN_EXTENT {
            continue;
        }
        let origin = centroid_bounds.min[axis];
        let scale = num_bins as f32 / split_len;

        bins.iter_mut().for_each(|b| *b = Bin::default());
        for (bounds, center) in items.clone() {
            let b = &mut bins[bin_index(center[axis], origin, scale, num_bins)];
            b.count += 1;
            b.bounds = b.bounds.union(&bounds);
        }

        let mut curr_box = AABB::empty();
        let mut curr_sum = 0;
        for i in (0..num_bins).rev() {
            curr_sum += bins[i].count;
            curr_box = curr_box.union(&bins[i].bounds);
            right_area[i] = curr_box.area();
            right_count[i] = curr_sum;
            right_box[i] = curr_box;
        }

        curr_box = AABB::empty();
        curr_sum = 0;
        for i in 0..(num_bins - 1) {
            curr_sum += bins[i].count;
            curr_box = curr_box.union(&bins[i].bounds);
            if curr_sum == 0 || right_count[i + 1] == 0 {
                continue;
            }
            let cost = split_cost(
                config,
                parent_area,
                curr_box.area(),
                curr_sum,
                right_area[i + 1],
                right_count[i + 1],
            );
            if best.map_or(true, |b| cost < b.cost) {
                best = Some(ObjectSplit {
                    axis,
                    bin: i,
                    cost,
                    left: curr_box,
                    right: right_box[i + 1],
                    origin,
                    scale,
                    num_bins,
                });
            }
        }
    }

    best
}

/// In-place partition. Returns the number of elements satisfying `pred`,
/// which end up at the front.
pub(crate) fn partition<T, F>(slice: &mut [T], pred: F) -> usize
where
    F: Fn(&T) -> bool,
{
    let mut left = 0;
    let mut right = slice.len();
    while left < right {
        if pred(&slice[left]) {
            left += 1;
        } else {
            right -= 1;
            slice.swap(left, right);
        }
    }
    left
}

pub(crate) fn cmp_axis(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Object-split builder: every primitive lands in exactly one leaf, one
/// primitive per leaf, so a tree over `n` boxes always has `2n - 1` nodes.
pub struct BinnedBuilder<'a> {
    config: &'a BuildConfig,
    prim_aabbs: &'a [AABB],
    prim_centers: Vec<Vec3>,
    prim_indices: Vec<u32>,
    node_count: usize,
}

impl<'a> BinnedBuilder<'a> {
    pub fn new(prim_aabbs: &'a [AABB], config: &'a BuildConfig) -> Self {
        let prim_centers = prim_aabbs.iter().map(AABB::center).collect();
        let prim_indices = (0..prim_aabbs.len() as u32).collect();
        Self {
            config,
            prim_aabbs,
            prim_centers,
            prim_indices,
            node_count: 0,
        }
    }

    pub fn build(mut self) -> Bvh {
        let count = self.prim_aabbs.len();
        let root = self.subdivide(0, count);
        Bvh::from_parts(root, self.prim_indices, self.node_count, count)
    }

    fn range_bounds(&self, first: usize, count: usize) -> (AABB, AABB) {
        let mut aabb = AABB::empty();
        let mut centroids = AABB::empty();
        for &prim in &self.prim_indices[first..first + count] {
            aabb = aabb.union(&self.prim_aabbs[prim as usize]);
            centroids.grow(self.prim_centers[prim as usize]);
        }
        (aabb, centroids)
    }

    fn subdivide(&mut self, first: usize, count: usize) -> TreeNode {
        self.node_count += 1;
        let (aabb, centroid_bounds) = self.range_bounds(first, count);

        if count == 1 {
            return TreeNode::Leaf {
                bounds: aabb,
                start: first,
                count,
            };
        }

        let left_count = if self.config.use_sah {
            self.sah_partition(first, count, &aabb, &centroid_bounds)
        } else {
            None
        }
        .unwrap_or_else(|| self.median_partition(first, count, &centroid_bounds));

        let left = self.subdivide(first, left_count);
        let right = self.subdivide(first + left_count, count - left_count);
        TreeNode::Interior {
            bounds: aabb,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn sah_partition(
        &mut self,
        first: usize,
        count: usize,
        aabb: &AABB,
        centroid_bounds: &AABB,
    ) -> Option<usize> {
        let items = self.prim_indices[first..first + count]
            .iter()
            .map(|&p| (self.prim_aabbs[p as usize], self.prim_centers[p as usize]));
        let split = find_object_split(items, aabb.area(), centroid_bounds, self.config)?;

        let centers = &self.prim_centers;
        let left_count = partition(&mut self.prim_indices[first..first + count], |&p| {
            split.goes_left(centers[p as usize])
        });
        if left_count == 0 || left_count == count {
            return None;
        }
        Some(left_count)
    }

    fn median_partition(&mut self, first: usize, count: usize, centroid_bounds: &AABB) -> usize {
        let axis = centroid_bounds.longest_axis();
        let mid = count / 2;
        let centers = &self.prim_centers;
        self.prim_indices[first..first + count].select_nth_unstable_by(mid, |&a, &b| {
            cmp_axis(centers[a as usize][axis], centers[b as usize][axis])
        });
        mid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    fn boxes_along_x(n: usize) -> Vec<AABB> {
        (0..n)
            .map(|i| {
                let c = vec3(i as f32 * 2.0, 0.0, 0.0);
                AABB::new(c - Vec3::splat(0.5), c + Vec3::splat(0.5))
            })
            .collect()
    }

    fn check_leaves(node: &TreeNode, seen: &mut Vec<usize>) {
        match node {
            TreeNode::Leaf { start, count, .. } => {
                assert_eq!(*count, 1);
                seen.push(*start);
            }
            TreeNode::Interior { bounds, left, right } => {
                assert!(bounds.contains(left.bounds()));
                assert!(bounds.contains(right.bounds()));
                check_leaves(left, seen);
                check_leaves(right, seen);
            }
        }
    }

    #[test]
    fn sah_and_median_build_full_binary_trees() {
        let prims = boxes_along_x(37);
        for use_sah in [true, false] {
            let config = BuildConfig::default().with_sah(use_sah);
            let bvh = BinnedBuilder::new(&prims, &config).build();
            assert_eq!(bvh.node_count(), 2 * 37 - 1);
            assert_eq!(bvh.root().subtree_size(), bvh.node_count());

            let mut starts = Vec::new();
            check_leaves(bvh.root(), &mut starts);
            // Leaves appear in permutation order.
            assert_eq!(starts, (0..37).collect::<Vec<_>>());

            let mut perm = bvh.permutation().to_vec();
            perm.sort_unstable();
            assert_eq!(perm, (0..37).collect::<Vec<u32>>());
        }
    }

    #[test]
    fn coincident_boxes_fall_back_to_median() {
        let prims = vec![AABB::new(Vec3::ZERO, Vec3::ONE); 8];
        let config = BuildConfig::default();
        let bvh = BinnedBuilder::new(&prims, &config).build();
        assert_eq!(bvh.node_count(), 15);
        assert_eq!(bvh.root().depth(), 4);
    }

    #[test]
    fn sah_separates_clusters() {
        let mut prims = boxes_along_x(4);
        prims.extend((0..4).map(|i| {
            let c = vec3(100.0 + i as f32 * 2.0, 0.0, 0.0);
            AABB::new(c - Vec3::splat(0.5), c + Vec3::splat(0.5))
        }));
        let config = BuildConfig::default();
        let bvh = BinnedBuilder::new(&prims, &config).build();
        let TreeNode::Interior { left, right, .. } = bvh.root() else {
            panic!("root should be interior");
        };
        assert!(left.bounds().max.x < 50.0);
        assert!(right.bounds().min.x > 50.0);
    }

    #[test]
    fn partition_moves_matches_to_front() {
        let mut v = [5, 2, 8, 1, 9, 3];
        let n = partition(&mut v, |&x| x < 5);
        assert_eq!(n, 3);
        assert!(v[..n].iter().all(|&x| x < 5));
        assert!(v[n..].iter().all(|&x| x >= 5));
    }
}
