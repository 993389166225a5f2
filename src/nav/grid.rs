//! Grid-based walkable surface with A* path search.
//!
//! The floor plan is a horizontal occupancy grid at a fixed height. Routes
//! are searched on the 8-connected grid (no corner cutting) and then pruned
//! with line-of-sight checks so straight corridors collapse to a single
//! segment.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::domain::types::Vec3;

use super::{PathGraph, WalkableSurface};

/// Character marking a walkable cell in row strings
const WALKABLE: char = '.';

/// Node in the A* open set.
#[derive(Clone, Copy, Debug)]
struct SearchNode {
    cell: usize,
    f_score: f32,
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell
    }
}

impl Eq for SearchNode {}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (lower f_score = higher priority)
        other.f_score.partial_cmp(&self.f_score).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Occupancy grid navigation surface for one floor.
#[derive(Clone, Debug)]
pub struct GridNavMesh {
    /// World x of the grid's min corner
    origin_x: f32,
    /// World z of the grid's min corner
    origin_z: f32,
    cell_size: f32,
    /// Floor height (world y)
    height: f32,
    cols: usize,
    rows: usize,
    walkable: Vec<bool>,
}

impl GridNavMesh {
    /// Build a grid from row strings, `.` walkable and anything else blocked.
    ///
    /// Row 0 is at `origin_z`, column 0 at `origin_x`.
    pub fn from_rows<S: AsRef<str>>(
        origin: [f32; 2],
        cell_size: f32,
        height: f32,
        rows: &[S],
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(cell_size > 0.0, "cell_size must be positive, got {cell_size}");
        anyhow::ensure!(!rows.is_empty(), "navmesh has no rows");

        let cols = rows[0].as_ref().chars().count();
        anyhow::ensure!(cols > 0, "navmesh rows are empty");

        let mut walkable = Vec::with_capacity(cols * rows.len());
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            anyhow::ensure!(
                row.chars().count() == cols,
                "navmesh row {i} has {} cells, expected {cols}",
                row.chars().count()
            );
            walkable.extend(row.chars().map(|c| c == WALKABLE));
        }

        Ok(Self {
            origin_x: origin[0],
            origin_z: origin[1],
            cell_size,
            height,
            cols,
            rows: rows.len(),
            walkable,
        })
    }

    /// Fully walkable rectangular floor
    pub fn open(origin: [f32; 2], cell_size: f32, height: f32, cols: usize, rows: usize) -> Self {
        Self {
            origin_x: origin[0],
            origin_z: origin[1],
            cell_size,
            height,
            cols,
            rows,
            walkable: vec![true; cols * rows],
        }
    }

    fn index(&self, col: usize, row: usize) -> usize {
        row * self.cols + col
    }

    fn col_row(&self, cell: usize) -> (usize, usize) {
        (cell % self.cols, cell / self.cols)
    }

    fn is_walkable(&self, col: i64, row: i64) -> bool {
        if col < 0 || row < 0 || col >= self.cols as i64 || row >= self.rows as i64 {
            return false;
        }
        self.walkable[self.index(col as usize, row as usize)]
    }

    /// Cell containing a world point (ignoring height)
    fn cell_of(&self, p: Vec3) -> Option<(i64, i64)> {
        let col = ((p.x - self.origin_x) / self.cell_size).floor();
        let row = ((p.z - self.origin_z) / self.cell_size).floor();
        if !col.is_finite() || !row.is_finite() {
            return None;
        }
        Some((col as i64, row as i64))
    }

    fn walkable_cell_of(&self, p: Vec3) -> Option<usize> {
        let (col, row) = self.cell_of(p)?;
        self.is_walkable(col, row).then(|| self.index(col as usize, row as usize))
    }

    fn cell_center(&self, cell: usize) -> Vec3 {
        let (col, row) = self.col_row(cell);
        Vec3::new(
            self.origin_x + (col as f32 + 0.5) * self.cell_size,
            self.height,
            self.origin_z + (row as f32 + 0.5) * self.cell_size,
        )
    }

    /// Closest point of a cell's footprint to `p`, on the floor plane
    fn closest_point_in_cell(&self, col: i64, row: i64, p: Vec3) -> Vec3 {
        let min_x = self.origin_x + col as f32 * self.cell_size;
        let min_z = self.origin_z + row as f32 * self.cell_size;
        Vec3::new(
            p.x.clamp(min_x, min_x + self.cell_size),
            self.height,
            p.z.clamp(min_z, min_z + self.cell_size),
        )
    }

    /// True if every sample along the segment lies on walkable cells
    fn line_of_sight(&self, a: Vec3, b: Vec3) -> bool {
        let step = self.cell_size * 0.25;
        let dist = Vec3::new(a.x, 0.0, a.z).distance(Vec3::new(b.x, 0.0, b.z));
        let samples = (dist / step).ceil().max(1.0) as usize;
        (0..=samples).all(|i| {
            let t = i as f32 / samples as f32;
            let p = a + (b - a) * t;
            self.walkable_cell_of(p).is_some()
        })
    }

    fn heuristic(&self, a: usize, b: usize) -> f32 {
        self.cell_center(a).distance(self.cell_center(b))
    }

    /// A* over the 8-connected grid, returning the cell sequence
    fn astar(&self, start: usize, goal: usize) -> Option<Vec<usize>> {
        let n = self.walkable.len();
        let mut g_score = vec![f32::INFINITY; n];
        let mut parent = vec![usize::MAX; n];
        let mut closed = vec![false; n];
        let mut open_set = BinaryHeap::new();

        g_score[start] = 0.0;
        open_set.push(SearchNode { cell: start, f_score: self.heuristic(start, goal) });

        const NEIGHBORS: [(i64, i64); 8] =
            [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (1, -1), (-1, 1), (1, 1)];

        while let Some(SearchNode { cell: current, .. }) = open_set.pop() {
            if current == goal {
                let mut path = vec![goal];
                let mut cell = goal;
                while cell != start {
                    cell = parent[cell];
                    path.push(cell);
                }
                path.reverse();
                return Some(path);
            }

            if closed[current] {
                continue;
            }
            closed[current] = true;

            let (col, row) = self.col_row(current);
            let (col, row) = (col as i64, row as i64);

            for &(dc, dr) in &NEIGHBORS {
                let (nc, nr) = (col + dc, row + dr);
                if !self.is_walkable(nc, nr) {
                    continue;
                }
                // No squeezing diagonally between two blocked cells
                if dc != 0 && dr != 0 && !(self.is_walkable(col + dc, row) && self.is_walkable(col, row + dr)) {
                    continue;
                }

                let neighbor = self.index(nc as usize, nr as usize);
                if closed[neighbor] {
                    continue;
                }

                let step = if dc != 0 && dr != 0 { std::f32::consts::SQRT_2 } else { 1.0 };
                let tentative = g_score[current] + step * self.cell_size;
                if tentative < g_score[neighbor] {
                    g_score[neighbor] = tentative;
                    parent[neighbor] = current;
                    open_set.push(SearchNode {
                        cell: neighbor,
                        f_score: tentative + self.heuristic(neighbor, goal),
                    });
                }
            }
        }

        None
    }

    /// Drop intermediate waypoints that are visible from the last kept one
    fn prune(&self, points: Vec<Vec3>) -> Vec<Vec3> {
        if points.len() <= 2 {
            return points;
        }

        let mut pruned = vec![points[0]];
        let mut anchor = points[0];
        for i in 1..points.len() - 1 {
            if !self.line_of_sight(anchor, points[i + 1]) {
                anchor = points[i];
                pruned.push(anchor);
            }
        }
        pruned.push(points[points.len() - 1]);
        pruned
    }
}

impl WalkableSurface for GridNavMesh {
    fn sample_position(&self, p: Vec3, max_distance: f32) -> Option<Vec3> {
        if !p.is_finite() || max_distance < 0.0 {
            return None;
        }

        let (pc, pr) = self.cell_of(p)?;
        let reach = ((max_distance / self.cell_size).ceil() as i64).saturating_add(1);

        // Scan window limited to the grid; far-off samples scan nothing
        let row_lo = pr.saturating_sub(reach).max(0);
        let row_hi = pr.saturating_add(reach).min(self.rows as i64 - 1);
        let col_lo = pc.saturating_sub(reach).max(0);
        let col_hi = pc.saturating_add(reach).min(self.cols as i64 - 1);

        let mut best: Option<(f32, Vec3)> = None;
        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                if !self.is_walkable(col, row) {
                    continue;
                }
                let candidate = self.closest_point_in_cell(col, row, p);
                let d2 = candidate.distance_squared(p);
                if best.map_or(true, |(bd, _)| d2 < bd) {
                    best = Some((d2, candidate));
                }
            }
        }

        best.filter(|(d2, _)| *d2 <= max_distance * max_distance).map(|(_, hit)| hit)
    }
}

impl PathGraph for GridNavMesh {
    fn find_path(&self, from: Vec3, to: Vec3) -> Option<Vec<Vec3>> {
        let start = self.walkable_cell_of(from)?;
        let goal = self.walkable_cell_of(to)?;

        if start == goal {
            return Some(vec![from, to]);
        }

        let cells = self.astar(start, goal)?;
        let mut points: Vec<Vec3> = cells.iter().map(|&c| self.cell_center(c)).collect();
        // Exact endpoints instead of cell centers
        if let Some(first) = points.first_mut() {
            *first = from;
        }
        if let Some(last) = points.last_mut() {
            *last = to;
        }
        Some(self.prune(points))
    }
}
