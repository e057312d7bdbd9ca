//! Navigation: reachable sets and cheapest paths under the tile cost model.
//!
//! Tile costs are 0 (ice), 1 or 2 (water), so plain breadth-first search
//! would get both the ice discount and the water surcharge wrong. Every
//! query here is a uniform-cost (Dijkstra) expansion.
//!
//! # Determinism
//!
//! Neighbors are always visited up, down, left, right, and the frontier
//! breaks cost ties by discovery order. A tile's predecessor is only
//! replaced by a *strictly* cheaper route, so among equal-cost paths the
//! first one discovered wins.
//!
//! All functions are pure. Out-of-bounds inputs yield empty results.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet, VecDeque};

use gridclash_protocol::Position;

use crate::Grid;

/// Orthogonal in-bounds neighbors of `position` on a `size × size` grid,
/// in the fixed order up, down, left, right.
pub fn neighbors(position: Position, size: usize) -> Vec<Position> {
    if !position.in_bounds(size) {
        return Vec::new();
    }
    let Position { row, col } = position;
    [
        Position::new(row - 1, col),
        Position::new(row + 1, col),
        Position::new(row, col - 1),
        Position::new(row, col + 1),
    ]
    .into_iter()
    .filter(|p| p.in_bounds(size))
    .collect()
}

/// Every tile a player at `origin` can end a move on with `budget`
/// movement points.
///
/// Tiles in `occupied` (other players) can be neither crossed nor entered.
/// The origin itself is not included.
pub fn reachable_tiles(
    origin: Position,
    budget: u32,
    grid: &Grid,
    occupied: &HashSet<Position>,
) -> BTreeSet<Position> {
    let search = Search::run(grid, origin, Some(budget), None, |p| occupied.contains(&p));
    search
        .settled()
        .filter(|&p| p != origin)
        .collect()
}

/// The cheapest path from `origin` to `destination`, ignoring other
/// players. Used for path previews and bot planning.
///
/// The path excludes `origin` and ends with `destination`. Empty when the
/// destination is unreachable or equal to the origin.
pub fn fastest_path(origin: Position, destination: Position, grid: &Grid) -> Vec<Position> {
    fastest_path_avoiding(origin, destination, grid, &HashSet::new())
}

/// Like [`fastest_path`], but tiles in `occupied` block the way.
pub fn fastest_path_avoiding(
    origin: Position,
    destination: Position,
    grid: &Grid,
    occupied: &HashSet<Position>,
) -> Vec<Position> {
    if origin == destination || !grid.contains(destination) {
        return Vec::new();
    }
    let search = Search::run(grid, origin, None, Some(destination), |p| {
        occupied.contains(&p)
    });
    search.path_to(destination)
}

/// Sum of entry costs along `path`. `None` if any step is impassable.
pub fn path_cost(path: &[Position], grid: &Grid) -> Option<u32> {
    path.iter().map(|&p| grid.cost(p)).sum()
}

/// The closest tile to `origin` (by steps over passable tiles, origin
/// included) that satisfies `accept`. Breadth-first, same neighbor order.
pub fn nearest_tile(
    origin: Position,
    grid: &Grid,
    accept: impl Fn(Position) -> bool,
) -> Option<Position> {
    if !grid.contains(origin) {
        return None;
    }
    let mut seen = HashSet::from([origin]);
    let mut queue = VecDeque::from([origin]);
    while let Some(current) = queue.pop_front() {
        if accept(current) {
            return Some(current);
        }
        for next in neighbors(current, grid.size()) {
            if grid.cost(next).is_some() && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Uniform-cost search
// ---------------------------------------------------------------------------

struct Search {
    size: usize,
    cost: Vec<Option<u32>>,
    parent: Vec<Option<Position>>,
}

impl Search {
    fn run(
        grid: &Grid,
        origin: Position,
        budget: Option<u32>,
        target: Option<Position>,
        blocked: impl Fn(Position) -> bool,
    ) -> Self {
        let size = grid.size();
        let mut search = Self {
            size,
            cost: vec![None; size * size],
            parent: vec![None; size * size],
        };
        if !grid.contains(origin) {
            return search;
        }

        // (cost, discovery sequence) orders the frontier; the sequence
        // number makes equal-cost pops FIFO.
        let mut frontier = BinaryHeap::new();
        let mut seq: u64 = 0;
        let origin_idx = search.idx(origin);
        search.cost[origin_idx] = Some(0);
        frontier.push(Reverse((0u32, seq, origin)));

        while let Some(Reverse((cost, _, current))) = frontier.pop() {
            if search.cost[search.idx(current)] != Some(cost) {
                continue; // stale entry
            }
            if Some(current) == target {
                break;
            }
            for next in neighbors(current, size) {
                let Some(step) = grid.cost(next) else {
                    continue;
                };
                if blocked(next) {
                    continue;
                }
                let total = cost + step;
                if budget.is_some_and(|b| total > b) {
                    continue;
                }
                let idx = search.idx(next);
                if search.cost[idx].is_none_or(|known| total < known) {
                    search.cost[idx] = Some(total);
                    search.parent[idx] = Some(current);
                    seq += 1;
                    frontier.push(Reverse((total, seq, next)));
                }
            }
        }
        search
    }

    fn idx(&self, pos: Position) -> usize {
        pos.row as usize * self.size + pos.col as usize
    }

    fn settled(&self) -> impl Iterator<Item = Position> + '_ {
        let size = self.size as i32;
        (0..size)
            .flat_map(move |row| (0..size).map(move |col| Position::new(row, col)))
            .filter(|&p| self.cost[self.idx(p)].is_some())
    }

    fn path_to(&self, destination: Position) -> Vec<Position> {
        if self.cost[self.idx(destination)].is_none() {
            return Vec::new();
        }
        let mut path = vec![destination];
        let mut current = destination;
        while let Some(prev) = self.parent[self.idx(current)] {
            path.push(prev);
            current = prev;
        }
        // Drop the origin (the only node without a parent).
        path.pop();
        path.reverse();
        path
    }
}
