//! Uniform-grid broad-phase for entities, rebuilt every tick
//!
//! Entities are referred to by their index in the scene's entity list, which
//! is stable for the duration of a tick. Buckets live in an arena and each
//! entity remembers the buckets it was inserted into, so a neighbour query
//! never has to hash a cell coordinate.

use std::collections::HashMap;

use crate::consts::CLUSTER_CELL_SIZE;
use crate::geometry::Position;
use crate::units::Distance;

#[derive(Debug, Default)]
pub(crate) struct EntityClustering {
    cells: HashMap<(i64, i64), u32>,
    buckets: Vec<Vec<u32>>,
    free_buckets: Vec<u32>,
    entity_buckets: Vec<Vec<u32>>,
    present: Vec<bool>,
}

#[inline]
fn cell_index(coordinate: Distance) -> i64 {
    coordinate.raw().div_euclid(CLUSTER_CELL_SIZE.raw())
}

impl EntityClustering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty all buckets, dropping the ones that stayed unused since the last reset
    pub fn reset(&mut self) {
        let buckets = &mut self.buckets;
        let free_buckets = &mut self.free_buckets;
        self.cells.retain(|_, bucket| {
            let entities = &mut buckets[*bucket as usize];
            if entities.is_empty() {
                free_buckets.push(*bucket);
                false
            } else {
                entities.clear();
                true
            }
        });

        for buckets in &mut self.entity_buckets {
            buckets.clear();
        }
    }

    /// Register entity `index` in every cell its safe box overlaps
    pub fn insert(&mut self, index: u32, position: Position, safe_radius: Distance) {
        let slot = index as usize;
        if self.entity_buckets.len() <= slot {
            self.entity_buckets.resize_with(slot + 1, Vec::new);
            self.present.resize(slot + 1, false);
        }
        self.entity_buckets[slot].clear();

        let min_x = cell_index(position.x - safe_radius);
        let min_y = cell_index(position.y - safe_radius);
        let max_x = cell_index(position.x + safe_radius);
        let max_y = cell_index(position.y + safe_radius);

        for cell_x in min_x..=max_x {
            for cell_y in min_y..=max_y {
                let bucket = match self.cells.get(&(cell_x, cell_y)) {
                    Some(&bucket) => bucket,
                    None => {
                        let bucket = match self.free_buckets.pop() {
                            Some(bucket) => bucket,
                            None => {
                                self.buckets.push(Vec::new());
                                (self.buckets.len() - 1) as u32
                            }
                        };
                        self.cells.insert((cell_x, cell_y), bucket);
                        bucket
                    }
                };
                self.buckets[bucket as usize].push(index);
                self.entity_buckets[slot].push(bucket);
            }
        }
    }

    /// Collect every other entity that shares a cell with entity `index`
    ///
    /// `out` must be empty; each neighbour is reported once.
    pub fn query(&mut self, index: u32, out: &mut Vec<u32>) {
        debug_assert!(out.is_empty());
        let slot = index as usize;
        if slot >= self.entity_buckets.len() {
            return;
        }

        self.present[slot] = true;
        for &bucket in &self.entity_buckets[slot] {
            for &candidate in &self.buckets[bucket as usize] {
                let flag = &mut self.present[candidate as usize];
                if !*flag {
                    *flag = true;
                    out.push(candidate);
                }
            }
        }

        for &neighbour in out.iter() {
            self.present[neighbour as usize] = false;
        }
        self.present[slot] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn neighbours(clustering: &mut EntityClustering, index: u32) -> Vec<u32> {
        let mut out = Vec::new();
        clustering.query(index, &mut out);
        out.sort_unstable();
        out
    }

    #[test]
    fn test_basic() {
        let mut clustering = EntityClustering::new();
        let safe = Distance::meters(20.0);
        let positions = [
            Position::meters(100.0, 1000.0),
            Position::meters(101.0, 1000.0),
            Position::meters(-100.0, -1000.0),
            Position::meters(-100.0, -1000.0),
            Position::meters(300.0, 1000.0),
            Position::meters(-300.0, -1000.0),
        ];
        for (index, position) in positions.iter().enumerate() {
            clustering.insert(index as u32, *position, safe);
        }

        assert_eq!(neighbours(&mut clustering, 0), vec![1]);
        assert_eq!(neighbours(&mut clustering, 1), vec![0]);
        assert_eq!(neighbours(&mut clustering, 2), vec![3]);
        assert_eq!(neighbours(&mut clustering, 3), vec![2]);
        assert!(neighbours(&mut clustering, 4).is_empty());
        assert!(neighbours(&mut clustering, 5).is_empty());
    }

    #[test]
    fn test_same_position() {
        let mut clustering = EntityClustering::new();
        let position = Position::meters(12.0, 123.0);
        clustering.insert(0, position, Distance::millimeters(2.0));
        clustering.insert(1, position, Distance::millimeters(2.0));

        assert_eq!(neighbours(&mut clustering, 0), vec![1]);
        assert_eq!(neighbours(&mut clustering, 1), vec![0]);
    }

    #[test]
    fn test_negative_cells() {
        assert_eq!(cell_index(Distance::from_micros(-1)), -1);
        assert_eq!(cell_index(Distance::meters(-1.0)), -1);
        assert_eq!(cell_index(Distance::ZERO), 0);
        assert_eq!(cell_index(Distance::meters(1.5)), 1);
    }

    #[test]
    fn test_reset_forgets_entities() {
        let mut clustering = EntityClustering::new();
        clustering.insert(0, Position::ORIGIN, Distance::meters(0.5));
        clustering.insert(1, Position::meters(0.2, 0.0), Distance::meters(0.5));
        clustering.reset();

        clustering.insert(0, Position::ORIGIN, Distance::meters(0.5));
        assert!(neighbours(&mut clustering, 0).is_empty());

        // Unused buckets are recycled on the next reset
        clustering.reset();
        clustering.reset();
        assert!(clustering.cells.is_empty());
        assert!(!clustering.free_buckets.is_empty());
    }

    #[test]
    fn test_random() {
        let mut rng = Pcg32::seed_from_u64(123);
        let radius = Distance::meters(1.0);
        let positions: Vec<Position> = (0..2000)
            .map(|_| Position::millimeters(rng.random_range(-20_000.0..20_000.0), rng.random_range(-20_000.0..20_000.0)))
            .collect();

        let mut clustering = EntityClustering::new();
        for _ in 0..2 {
            clustering.reset();
            for (index, position) in positions.iter().enumerate() {
                clustering.insert(index as u32, *position, radius * 2);
            }

            for (index, position) in positions.iter().enumerate() {
                let actual = neighbours(&mut clustering, index as u32);
                assert!(!actual.contains(&(index as u32)));

                for (candidate, other) in positions.iter().enumerate() {
                    if candidate == index {
                        continue;
                    }
                    let distance = position.distance(*other);
                    let safe = (radius + radius) * 2;
                    if distance <= safe {
                        assert!(actual.binary_search(&(candidate as u32)).is_ok());
                    }
                    if distance > safe * 10 {
                        assert!(actual.binary_search(&(candidate as u32)).is_err());
                    }
                }
            }
        }
    }
}
