//! Static line-segment colliders and their spatial index

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Material;
use crate::geometry::{Aabb, LineSegment, Position};

/// Stable identifier of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u64);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile#{}", self.0)
    }
}

/// An immovable line-segment collider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub collider: LineSegment,
    pub material: Material,
}

/// Pending request to place a tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlaceRequest {
    pub collider: LineSegment,
    pub material: Material,
}

impl TilePlaceRequest {
    pub fn new(collider: LineSegment) -> Self {
        Self {
            collider,
            material: Material::IRON,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }
}

/// Leaves holding more tiles than this are split
const SPLIT_THRESHOLD: usize = 8;
/// Nodes at this depth are never split
const MAX_DEPTH: u32 = 24;
/// Marks a leaf node
const NO_CHILDREN: u32 = 0;

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb,
    depth: u32,
    /// Index of the first of four consecutive children, or `NO_CHILDREN`
    first_child: u32,
    /// Tiles that fit in this node but in none of its children
    items: Vec<u32>,
}

impl Node {
    fn new(bounds: Aabb, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            first_child: NO_CHILDREN,
            items: Vec::new(),
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.first_child == NO_CHILDREN
    }
}

/// Quadtree over tile bounding boxes with fixed outer bounds
///
/// Nodes live in one arena; every tile is stored in the deepest node that
/// fully contains its bounding box, so a query never reports a tile twice.
/// Tiles outside the outer bounds are kept in the root. There is no removal:
/// tiles are immutable for the lifetime of a scene.
#[derive(Debug, Clone)]
pub struct TileTree {
    nodes: Vec<Node>,
    tiles: Vec<Tile>,
    tile_bounds: Vec<Aabb>,
}

impl TileTree {
    pub fn new(bounds: Aabb) -> Self {
        Self {
            nodes: vec![Node::new(bounds, 0)],
            tiles: Vec::new(),
            tile_bounds: Vec::new(),
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes[0].bounds
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile stored at `index` (as reported by [`TileTree::query`])
    #[inline]
    pub fn tile(&self, index: u32) -> &Tile {
        &self.tiles[index as usize]
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn insert(&mut self, tile: Tile) {
        let index = self.tiles.len() as u32;
        let bounds = tile.collider.bounds();
        self.tiles.push(tile);
        self.tile_bounds.push(bounds);

        let mut node = 0usize;
        while !self.nodes[node].is_leaf() {
            match self.child_containing(node, &bounds) {
                Some(child) => node = child,
                None => break,
            }
        }

        self.nodes[node].items.push(index);
        if self.nodes[node].is_leaf()
            && self.nodes[node].items.len() > SPLIT_THRESHOLD
            && self.nodes[node].depth < MAX_DEPTH
        {
            self.split(node);
        }
    }

    fn child_containing(&self, node: usize, bounds: &Aabb) -> Option<usize> {
        let first = self.nodes[node].first_child as usize;
        (first..first + 4).find(|&child| self.nodes[child].bounds.contains(bounds))
    }

    fn split(&mut self, node: usize) {
        let Aabb { min, max } = self.nodes[node].bounds;
        let center = self.nodes[node].bounds.center();
        let depth = self.nodes[node].depth + 1;

        let first = self.nodes.len();
        self.nodes.push(Node::new(Aabb::new(min, center), depth));
        self.nodes.push(Node::new(Aabb::new(Position::new(center.x, min.y), Position::new(max.x, center.y)), depth));
        self.nodes.push(Node::new(Aabb::new(Position::new(min.x, center.y), Position::new(center.x, max.y)), depth));
        self.nodes.push(Node::new(Aabb::new(center, max), depth));
        self.nodes[node].first_child = first as u32;

        let items = std::mem::take(&mut self.nodes[node].items);
        for index in items {
            let bounds = self.tile_bounds[index as usize];
            match self.child_containing(node, &bounds) {
                Some(child) => self.nodes[child].items.push(index),
                None => self.nodes[node].items.push(index),
            }
        }
    }

    /// Collect the index of every tile whose bounding box overlaps `area`
    ///
    /// Results are appended to `out`; `work` is scratch space for the
    /// traversal. Both buffers are meant to be reused between queries.
    pub fn query(&self, area: &Aabb, out: &mut Vec<u32>, work: &mut Vec<u32>) {
        work.clear();
        work.push(0);

        while let Some(node_index) = work.pop() {
            let node = &self.nodes[node_index as usize];
            // The root also holds tiles outside its bounds
            if node_index != 0 && !node.bounds.intersects(area) {
                continue;
            }

            for &index in &node.items {
                if self.tile_bounds[index as usize].intersects(area) {
                    out.push(index);
                }
            }

            if !node.is_leaf() {
                work.extend(node.first_child..node.first_child + 4);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Distance;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn world() -> TileTree {
        TileTree::new(Aabb::around(Position::ORIGIN, Distance::meters(10_000.0)))
    }

    fn tile(id: u64, collider: LineSegment) -> Tile {
        Tile {
            id: TileId(id),
            collider,
            material: Material::IRON,
        }
    }

    #[test]
    fn test_query_simple() {
        let mut tree = world();
        tree.insert(tile(1, LineSegment::meters(0.0, 0.0, 1.0, 0.0)));
        tree.insert(tile(2, LineSegment::meters(5.0, 5.0, 0.0, 1.0)));
        tree.insert(tile(3, LineSegment::meters(-3.0, 2.0, 0.0, 0.0)));

        let mut out = Vec::new();
        let mut work = Vec::new();
        tree.query(
            &Aabb::new(Position::meters(-1.0, -1.0), Position::meters(0.5, 0.5)),
            &mut out,
            &mut work,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(tree.tile(out[0]).id, TileId(1));

        out.clear();
        tree.query(
            &Aabb::new(Position::meters(-3.0, 0.0), Position::meters(5.0, 5.0)),
            &mut out,
            &mut work,
        );
        let mut ids: Vec<u64> = out.iter().map(|&index| tree.tile(index).id.0).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_tiles_outside_bounds_are_found() {
        let mut tree = TileTree::new(Aabb::around(Position::ORIGIN, Distance::meters(10.0)));
        tree.insert(tile(1, LineSegment::meters(50.0, 50.0, 1.0, 1.0)));

        let mut out = Vec::new();
        tree.query(
            &Aabb::around(Position::meters(50.0, 50.0), Distance::meters(2.0)),
            &mut out,
            &mut Vec::new(),
        );
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_query_matches_brute_force() {
        let mut rng = Pcg32::seed_from_u64(1234);
        let mut tree = world();
        for id in 0..2000u64 {
            let collider = LineSegment::meters(
                rng.random_range(-500.0..500.0),
                rng.random_range(-500.0..500.0),
                rng.random_range(-20.0..20.0),
                rng.random_range(-20.0..20.0),
            );
            tree.insert(tile(id, collider));
        }
        assert_eq!(tree.len(), 2000);

        let mut out = Vec::new();
        let mut work = Vec::new();
        for _ in 0..200 {
            let center = Position::meters(rng.random_range(-500.0..500.0), rng.random_range(-500.0..500.0));
            let area = Aabb::around(center, Distance::meters(rng.random_range(0.0..60.0)));

            out.clear();
            tree.query(&area, &mut out, &mut work);
            let mut found: Vec<u64> = out.iter().map(|&index| tree.tile(index).id.0).collect();
            found.sort_unstable();

            let expected: Vec<u64> = tree
                .tiles()
                .iter()
                .filter(|tile| tile.collider.bounds().intersects(&area))
                .map(|tile| tile.id.0)
                .collect();
            assert_eq!(found, expected);
        }
    }
}
