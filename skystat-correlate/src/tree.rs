//! Spatial trees over weighted point catalogs.
//!
//! A [`PointTree`] buckets a catalog by pixel key at a top level sized
//! for ~200 points per leaf, then splits overfull leaves into child
//! cells. Every node carries its aggregate weight, point count, and a
//! bounding cap, so the dual-tree walk in [`PointTree::find_pairs`] can
//! credit whole node products into an angular bin whenever the cap
//! separation range falls entirely inside the bin, and prune whenever it
//! misses every bin.
//!
//! Region tags propagate up from the points: a node wholly inside one
//! jackknife region credits at node granularity; a mixed node forces the
//! walk to descend so the leave-one-out bookkeeping stays exact.

use rayon::prelude::*;

use skystat_core::constants::MAX_LEVEL;
use skystat_core::{CircleBound, PixelKey, SkyError, SkyPoint, SkyResult, Vector3};

use crate::bins::{AngularBin, PairCounter};
use crate::region::RegionMap;

/// Target points per leaf.
const BUCKET_SIZE: usize = 200;

/// Jackknife region ownership of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionTag {
    /// Regions have not been assigned.
    Unset,
    /// Every point below this node lies in one region.
    Uniform(usize),
    /// Points below this node span several regions (or fall outside the
    /// region map).
    Mixed,
}

impl RegionTag {
    fn as_option(self) -> Option<usize> {
        match self {
            RegionTag::Uniform(k) => Some(k),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct TreePoint {
    point: SkyPoint,
    region: Option<usize>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(Vec<TreePoint>),
    Internal(Vec<TreeNode>),
}

#[derive(Debug, Clone)]
struct TreeNode {
    key: PixelKey,
    cap: CircleBound,
    weight: f64,
    count: usize,
    region: RegionTag,
    kind: NodeKind,
}

impl TreeNode {
    fn build(key: PixelKey, points: Vec<TreePoint>) -> Self {
        let weight = points.iter().map(|tp| tp.point.weight()).sum();
        let count = points.len();
        let cap = bounding_cap(&points);

        let kind = if count <= BUCKET_SIZE || key.level() == MAX_LEVEL {
            NodeKind::Leaf(points)
        } else {
            let child_level = key.level() + 1;
            let mut buckets: [Vec<TreePoint>; 4] =
                [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
            let children = key.children();
            for tp in points {
                let child_key = PixelKey::from_sky_point(&tp.point, child_level);
                buckets[child_key.child_position()].push(tp);
            }
            let nodes: Vec<TreeNode> = children
                .into_iter()
                .zip(buckets)
                .filter(|(_, bucket)| !bucket.is_empty())
                .map(|(child_key, bucket)| TreeNode::build(child_key, bucket))
                .collect();
            NodeKind::Internal(nodes)
        };

        Self {
            key,
            cap,
            weight,
            count,
            region: RegionTag::Unset,
            kind,
        }
    }

    fn assign_regions(&mut self, regions: &RegionMap) -> RegionTag {
        let tag = match &mut self.kind {
            NodeKind::Leaf(points) => {
                let mut tag: Option<RegionTag> = None;
                for tp in points.iter_mut() {
                    tp.region = regions.region_of_point(&tp.point);
                    let point_tag = match tp.region {
                        Some(k) => RegionTag::Uniform(k),
                        None => RegionTag::Mixed,
                    };
                    tag = Some(match tag {
                        None => point_tag,
                        Some(t) if t == point_tag => t,
                        Some(_) => RegionTag::Mixed,
                    });
                }
                tag.unwrap_or(RegionTag::Mixed)
            }
            NodeKind::Internal(children) => {
                let mut tag: Option<RegionTag> = None;
                for child in children.iter_mut() {
                    let child_tag = child.assign_regions(regions);
                    tag = Some(match tag {
                        None => child_tag,
                        Some(t) if t == child_tag => t,
                        Some(_) => RegionTag::Mixed,
                    });
                }
                tag.unwrap_or(RegionTag::Mixed)
            }
        };
        self.region = tag;
        tag
    }
}

/// Axis at the mean direction, grown to the farthest point.
fn bounding_cap(points: &[TreePoint]) -> CircleBound {
    let mut axis = Vector3::zeros();
    for tp in points {
        axis = axis + *tp.point.vector();
    }
    let axis = axis.normalize();
    let axis = if axis.magnitude() == 0.0 {
        *points[0].point.vector()
    } else {
        axis
    };
    let mut cap = CircleBound::from_point(axis);
    for tp in points {
        cap.add_vector(tp.point.vector());
    }
    cap
}

/// An immutable spatial index over a weighted point catalog.
#[derive(Debug, Clone)]
pub struct PointTree {
    roots: Vec<TreeNode>,
    total_weight: f64,
    n_points: usize,
}

impl PointTree {
    /// Builds a tree over the catalog.
    ///
    /// The top bucketing level is sized so a uniform catalog would put
    /// about 200 points in each occupied cell; denser cells keep
    /// splitting until the leaves fit.
    pub fn build(points: &[SkyPoint]) -> SkyResult<Self> {
        if points.is_empty() {
            return Err(SkyError::invalid_input("cannot build a tree from no points"));
        }
        for p in points {
            if !p.weight().is_finite() || p.weight() < 0.0 {
                return Err(SkyError::invalid_input(format!(
                    "point weight {} is not a finite non-negative number",
                    p.weight()
                )));
            }
        }

        let top_level = top_level_for(points.len());
        let mut buckets: std::collections::BTreeMap<PixelKey, Vec<TreePoint>> =
            std::collections::BTreeMap::new();
        for &point in points {
            let key = PixelKey::from_sky_point(&point, top_level);
            buckets.entry(key).or_default().push(TreePoint {
                point,
                region: None,
            });
        }
        let roots: Vec<TreeNode> = buckets
            .into_iter()
            .map(|(key, bucket)| TreeNode::build(key, bucket))
            .collect();

        Ok(Self {
            roots,
            total_weight: points.iter().map(|p| p.weight()).sum(),
            n_points: points.len(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.n_points
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_points == 0
    }

    /// Sum of all point weights.
    #[inline]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Tags every node and point with its jackknife region. Must run
    /// before a region-aware [`find_pairs`](Self::find_pairs).
    pub fn assign_regions(&mut self, regions: &RegionMap) {
        for root in &mut self.roots {
            root.assign_regions(regions);
        }
    }

    /// Counts weighted pairs between this tree and `other` into the
    /// bins' `kind` channel. Every ordered (a, b) pair with a from
    /// `self` and b from `other` whose separation falls in a bin is
    /// credited once; an autocorrelation therefore counts each unordered
    /// pair twice, consistently across GG, GR, RG and RR.
    ///
    /// Work fans out over this tree's root cells with rayon; per-worker
    /// accumulators merge in root order, so results are bit-identical
    /// run to run.
    pub fn find_pairs(
        &self,
        other: &PointTree,
        bins: &mut [AngularBin],
        kind: PairCounter,
        use_regions: bool,
    ) {
        let template: Vec<AngularBin> = bins.iter().map(|bin| bin.fresh_copy()).collect();
        let locals: Vec<Vec<AngularBin>> = self
            .roots
            .par_iter()
            .map(|root| {
                let mut local = template.clone();
                for other_root in &other.roots {
                    walk_pair(root, other_root, &mut local, kind, use_regions);
                }
                local
            })
            .collect();

        for local in locals {
            for (bin, partial) in bins.iter_mut().zip(&local) {
                bin.merge(partial);
            }
        }
    }
}

fn top_level_for(n_points: usize) -> u8 {
    let mut level = 0u8;
    while level < MAX_LEVEL
        && n_points as f64 / (6.0 * libm::exp2(2.0 * level as f64)) > BUCKET_SIZE as f64
    {
        level += 1;
    }
    level
}

/// The dual-tree recursion: credit, prune, or descend the larger node.
fn walk_pair(
    a: &TreeNode,
    b: &TreeNode,
    bins: &mut [AngularBin],
    kind: PairCounter,
    use_regions: bool,
) {
    let (lo, hi) = a.cap.separation_range(&b.cap);

    let mut fully_inside = None;
    let mut partial = false;
    for (idx, bin) in bins.iter().enumerate() {
        if hi < bin.theta_min() || lo > bin.theta_max() {
            continue;
        }
        if lo >= bin.theta_min() && hi <= bin.theta_max() {
            fully_inside = Some(idx);
        } else {
            partial = true;
        }
    }

    if let Some(idx) = fully_inside {
        if !partial {
            let regions_resolved = !use_regions
                || (a.region != RegionTag::Mixed && b.region != RegionTag::Mixed);
            if regions_resolved {
                let (region_a, region_b) = if use_regions {
                    (a.region.as_option(), b.region.as_option())
                } else {
                    (None, None)
                };
                bins[idx].accumulate_pair(
                    kind,
                    a.weight * b.weight,
                    (a.count * b.count) as f64,
                    region_a,
                    region_b,
                );
                return;
            }
            // Regions unresolved: fall through and descend.
        }
    } else if !partial {
        // The separation range misses every bin.
        return;
    }

    match (&a.kind, &b.kind) {
        (NodeKind::Leaf(points_a), NodeKind::Leaf(points_b)) => {
            for pa in points_a {
                for pb in points_b {
                    let cos = pa.point.cos_separation(&pb.point);
                    for bin in bins.iter_mut() {
                        if bin.is_within_cos(cos) {
                            let (region_a, region_b) = if use_regions {
                                (pa.region, pb.region)
                            } else {
                                (None, None)
                            };
                            bin.accumulate_pair(
                                kind,
                                pa.point.weight() * pb.point.weight(),
                                1.0,
                                region_a,
                                region_b,
                            );
                            break;
                        }
                    }
                }
            }
        }
        (NodeKind::Internal(children), NodeKind::Leaf(_)) => {
            for child in children {
                walk_pair(child, b, bins, kind, use_regions);
            }
        }
        (NodeKind::Leaf(_), NodeKind::Internal(children)) => {
            for child in children {
                walk_pair(a, child, bins, kind, use_regions);
            }
        }
        (NodeKind::Internal(children_a), NodeKind::Internal(children_b)) => {
            // Split the larger node; ties split the wider cap.
            let split_a = match a.count.cmp(&b.count) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => a.cap.height() >= b.cap.height(),
            };
            if split_a {
                for child in children_a {
                    walk_pair(child, b, bins, kind, use_regions);
                }
            } else {
                for child in children_b {
                    walk_pair(a, child, bins, kind, use_regions);
                }
            }
        }
    }
}
