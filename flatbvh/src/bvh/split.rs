// src/bvh/split.rs
//! Spatial-split builder.
//!
//! Object splits as in [`super::binned`], plus spatial splits for nodes whose
//! best object split leaves the two children overlapping by more than
//! `min_overlap` of the root area. A spatial split cuts the node with an
//! axis-aligned plane; references that straddle it are duplicated, each copy
//! clipped to its side. Leaves still hold one reference each.

use super::binned::{cmp_axis, find_object_split, partition, split_cost};
use super::{BuildConfig, Bvh, TreeNode};
use crate::primitives::AABB;

const MIN_EXTENT: f32 = 1e-6;

#[derive(Clone, Copy, Debug)]
struct Reference {
    bounds: AABB,
    prim: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct SpatialBin {
    bounds: AABB,
    enter: u32,
    exit: u32,
}

#[derive(Clone, Copy, Debug)]
struct SpatialSplit {
    axis: usize,
    pos: f32,
    cost: f32,
}

pub struct SplitBuilder<'a> {
    config: &'a BuildConfig,
    prim_aabbs: &'a [AABB],
    root_area: f32,
    permutation: Vec<u32>,
    node_count: usize,
    duplicated: usize,
}

impl<'a> SplitBuilder<'a> {
    pub fn new(prim_aabbs: &'a [AABB], config: &'a BuildConfig) -> Self {
        let root_area = prim_aabbs
            .iter()
            .fold(AABB::empty(), |acc, b| acc.union(b))
            .area();
        Self {
            config,
            prim_aabbs,
            root_area,
            permutation: Vec::with_capacity(prim_aabbs.len()),
            node_count: 0,
            duplicated: 0,
        }
    }

    pub fn build(mut self) -> Bvh {
        let refs = self
            .prim_aabbs
            .iter()
            .enumerate()
            .map(|(i, &bounds)| Reference {
                bounds,
                prim: i as u32,
            })
            .collect();
        let root = self.subdivide(refs, 0);
        if self.duplicated > 0 {
            log::debug!(
                "spatial splits duplicated {} references over {} primitives",
                self.duplicated,
                self.prim_aabbs.len()
            );
        }
        Bvh::from_parts(root, self.permutation, self.node_count, self.prim_aabbs.len())
    }

    fn subdivide(&mut self, mut refs: Vec<Reference>, depth: usize) -> TreeNode {
        self.node_count += 1;

        let mut aabb = AABB::empty();
        let mut centroid_bounds = AABB::empty();
        for r in &refs {
            aabb = aabb.union(&r.bounds);
            centroid_bounds.grow(r.bounds.center());
        }

        if refs.len() == 1 {
            let start = self.permutation.len();
            self.permutation.push(refs[0].prim);
            return TreeNode::Leaf {
                bounds: aabb,
                start,
                count: 1,
            };
        }

        let items = refs.iter().map(|r| (r.bounds, r.bounds.center()));
        let object = find_object_split(items, aabb.area(), &centroid_bounds, self.config);

        let overlap = object.map_or(0.0, |s| s.left.intersection(&s.right).area());
        let spatial = if depth < self.config.split_depth
            && overlap > self.config.min_overlap * self.root_area
        {
            self.find_spatial_split(&refs, &aabb)
                .filter(|s| object.map_or(true, |o| s.cost < o.cost))
        } else {
            None
        };

        let spatial_children = spatial.and_then(|s| spatial_partition(&refs, s));
        let (left, right) = match spatial_children {
            Some((left, right)) => {
                self.duplicated += left.len() + right.len() - refs.len();
                (left, right)
            }
            None => {
                let mut left_count = object
                    .map(|s| partition(&mut refs, |r| s.goes_left(r.bounds.center())))
                    .unwrap_or(0);
                if left_count == 0 || left_count == refs.len() {
                    let axis = centroid_bounds.longest_axis();
                    left_count = refs.len() / 2;
                    refs.select_nth_unstable_by(left_count, |a, b| {
                        cmp_axis(a.bounds.center()[axis], b.bounds.center()[axis])
                    });
                }
                let right = refs.split_off(left_count);
                (refs, right)
            }
        };

        let left = self.subdivide(left, depth + 1);
        let right = self.subdivide(right, depth + 1);
        TreeNode::Interior {
            bounds: aabb,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn find_spatial_split(&self, refs: &[Reference], aabb: &AABB) -> Option<SpatialSplit> {
        let num_bins = self.config.num_bins;
        let parent_area = aabb.area();
        let mut best: Option<SpatialSplit> = None;
        let mut bins = vec![SpatialBin::default(); num_bins];
        let mut right_area = vec![0.0f32; num_bins];
        let mut right_count = vec![0u32; num_bins];

        for axis in 0..3 {
            let extent = aabb.extent()[axis];
            if extent < MIN_EXTENT {
                continue;
            }
            let origin = aabb.min[axis];
            let width = extent / num_bins as f32;
            let bin_of = |v: f32| (((v - origin) / width) as usize).min(num_bins - 1);

            bins.iter_mut().for_each(|b| *b = SpatialBin::default());
            for r in refs {
                let first = bin_of(r.bounds.min[axis]);
                let last = bin_of(r.bounds.max[axis]);
                let mut rest = r.bounds;
                for (b, bin) in bins.iter_mut().enumerate().take(last + 1).skip(first) {
                    let (inside, right) = if b < last {
                        rest.split(axis, origin + width * (b + 1) as f32)
                    } else {
                        (rest, AABB::empty())
                    };
                    bin.bounds = bin.bounds.union(&inside);
                    rest = right;
                }
                bins[first].enter += 1;
                bins[last].exit += 1;
            }

            let mut curr_box = AABB::empty();
            let mut curr_sum = 0;
            for i in (0..num_bins).rev() {
                curr_sum += bins[i].exit;
                curr_box = curr_box.union(&bins[i].bounds);
                right_area[i] = curr_box.area();
                right_count[i] = curr_sum;
            }

            curr_box = AABB::empty();
            curr_sum = 0;
            for i in 0..(num_bins - 1) {
                curr_sum += bins[i].enter;
                curr_box = curr_box.union(&bins[i].bounds);
                if curr_sum == 0 || right_count[i + 1] == 0 {
                    continue;
                }
                let cost = split_cost(
                    self.config,
                    parent_area,
                    curr_box.area(),
                    curr_sum,
                    right_area[i + 1],
                    right_count[i + 1],
                );
                if best.map_or(true, |b| cost < b.cost) {
                    best = Some(SpatialSplit {
                        axis,
                        pos: origin + width * (i + 1) as f32,
                        cost,
                    });
                }
            }
        }

        best
    }
}

/// Distribute references around the split plane, duplicating straddlers.
/// `None` when a side would be empty or nothing would be separated.
fn spatial_partition(
    refs: &[Reference],
    split: SpatialSplit,
) -> Option<(Vec<Reference>, Vec<Reference>)> {
    let SpatialSplit { axis, pos, .. } = split;
    let mut left = Vec::with_capacity(refs.len());
    let mut right = Vec::with_capacity(refs.len());

    for r in refs {
        if r.bounds.max[axis] <= pos {
            left.push(*r);
        } else if r.bounds.min[axis] >= pos {
            right.push(*r);
        } else {
            let (l, rb) = r.bounds.split(axis, pos);
            left.push(Reference { bounds: l, ..*r });
            right.push(Reference { bounds: rb, ..*r });
        }
    }

    let stuck = left.len() == refs.len() && right.len() == refs.len();
    if left.is_empty() || right.is_empty() || stuck {
        return None;
    }
    Some((left, right))
}
