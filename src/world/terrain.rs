use crate::world::position::{Direction, Position};
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;

const SIGHT_CACHE_CAPACITY: usize = 512;

/// Sparse tile map for the precondition gate. The full shard map loader
/// would feed this; the core only needs the three per-tile flags below.
pub struct TileMap {
    blocked: HashSet<Position>,
    opaque: HashSet<Position>,
    protected: HashSet<Position>,
    sight_cache: LruCache<(Position, Position), bool>,
}

impl Default for TileMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TileMap {
    pub fn new() -> Self {
        let capacity = NonZeroUsize::new(SIGHT_CACHE_CAPACITY.max(1)).unwrap();
        TileMap {
            blocked: HashSet::new(),
            opaque: HashSet::new(),
            protected: HashSet::new(),
            sight_cache: LruCache::new(capacity),
        }
    }

    /// Mark a tile as a wall: not walkable and blocking sight.
    pub fn set_wall(&mut self, position: Position) {
        self.blocked.insert(position);
        self.opaque.insert(position);
        self.sight_cache.clear();
    }

    pub fn set_blocked(&mut self, position: Position) {
        self.blocked.insert(position);
    }

    pub fn set_opaque(&mut self, position: Position) {
        self.opaque.insert(position);
        self.sight_cache.clear();
    }

    pub fn set_protected(&mut self, position: Position) {
        self.protected.insert(position);
    }

    pub fn is_blocked(&self, position: Position) -> bool {
        self.blocked.contains(&position)
    }

    pub fn is_protected(&self, position: Position) -> bool {
        self.protected.contains(&position)
    }

    /// Straight-line visibility on the viewer's floor. Endpoints do not
    /// block themselves; repeated queries hit the LRU cache until the map
    /// is mutated.
    pub fn line_of_sight(&mut self, from: Position, to: Position) -> bool {
        if from == to {
            return true;
        }
        let key = (from, to);
        if let Some(cached) = self.sight_cache.get(&key) {
            return *cached;
        }
        let clear = self.trace_sight(from, to);
        self.sight_cache.put(key, clear);
        clear
    }

    fn trace_sight(&self, from: Position, to: Position) -> bool {
        let mut x = i32::from(from.x);
        let mut y = i32::from(from.y);
        let target_x = i32::from(to.x);
        let target_y = i32::from(to.y);
        let dx = (target_x - x).abs();
        let dy = -(target_y - y).abs();
        let step_x = if x < target_x { 1 } else { -1 };
        let step_y = if y < target_y { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            if x == target_x && y == target_y {
                return true;
            }
            let doubled = 2 * err;
            if doubled >= dy {
                err += dy;
                x += step_x;
            }
            if doubled <= dx {
                err += dx;
                y += step_y;
            }
            if x == target_x && y == target_y {
                return true;
            }
            let tile = Position {
                x: x as u16,
                y: y as u16,
                z: from.z,
            };
            if self.opaque.contains(&tile) {
                return false;
            }
        }
    }

    /// First open walkable tile adjacent to `center`, if any. Used to
    /// decide whether an incapacitated target has room to be raised.
    pub fn clear_landing_around(&self, center: Position) -> Option<Position> {
        center
            .neighbors()
            .find(|neighbor| !self.is_blocked(*neighbor))
    }

    /// Whether the greedy step-by-step walk from `from` toward `to` runs
    /// into a blocked tile. Deliberately ignores detours: the gate uses it
    /// to flag initiators acting through an obstacle they could not walk
    /// straight through.
    pub fn direct_path_blocked(&self, from: Position, to: Position) -> bool {
        let mut current = from;
        while current != to {
            let Some(direction) = Direction::toward(current, to) else {
                return false;
            };
            let Some(next) = current.step(direction) else {
                return true;
            };
            if next == to {
                return false;
            }
            if self.is_blocked(next) {
                return true;
            }
            current = next;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: u16, y: u16) -> Position {
        Position { x, y, z: 0 }
    }

    #[test]
    fn sight_is_clear_on_an_empty_map() {
        let mut map = TileMap::new();
        assert!(map.line_of_sight(at(0, 0), at(10, 4)));
        assert!(map.line_of_sight(at(10, 4), at(0, 0)));
    }

    #[test]
    fn opaque_tile_between_endpoints_blocks_sight() {
        let mut map = TileMap::new();
        map.set_wall(at(5, 5));
        assert!(!map.line_of_sight(at(3, 5), at(8, 5)));
        // Endpoints themselves never block.
        assert!(map.line_of_sight(at(5, 5), at(6, 5)));
    }

    #[test]
    fn sight_cache_is_invalidated_by_map_edits() {
        let mut map = TileMap::new();
        assert!(map.line_of_sight(at(0, 2), at(6, 2)));
        map.set_wall(at(3, 2));
        assert!(!map.line_of_sight(at(0, 2), at(6, 2)));
    }

    #[test]
    fn landing_search_skips_blocked_tiles() {
        let mut map = TileMap::new();
        let center = at(10, 10);
        for neighbor in center.neighbors() {
            map.set_blocked(neighbor);
        }
        assert_eq!(map.clear_landing_around(center), None);

        let mut partial = TileMap::new();
        for neighbor in center.neighbors() {
            if neighbor != at(11, 10) {
                partial.set_blocked(neighbor);
            }
        }
        assert_eq!(partial.clear_landing_around(center), Some(at(11, 10)));
    }

    #[test]
    fn direct_path_blocked_ignores_detours() {
        let mut map = TileMap::new();
        map.set_blocked(at(6, 5));
        // Straight east walk from (5,5) to (8,5) hits the block even though
        // a dodge through (6,4) exists.
        assert!(map.direct_path_blocked(at(5, 5), at(8, 5)));
        assert!(!map.direct_path_blocked(at(5, 5), at(5, 8)));
        // Adjacent tiles have no intervening step.
        assert!(!map.direct_path_blocked(at(5, 5), at(6, 5)));
    }
}
