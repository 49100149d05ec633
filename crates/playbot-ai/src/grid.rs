//! Navigation grid: the frame partitioned into fixed-size square tiles.
//! Geometry is built once and never moves; traversal cost is resampled from
//! every frame, so a tile that was free can turn impassable the moment the
//! scene changes.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use playbot_vision::{draw_rect, sample_center, Point, Rect, VisionError};

/// Tile edge length in pixels.
pub const TILE_EDGE: u32 = 20;

/// Cost sentinel for tiles that cannot be entered.
pub const IMPASSABLE: u8 = 255;

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const FREE_COLOR: Rgba<u8> = Rgba([200, 200, 200, 255]);
const HAZARD_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const PATH_COLOR: Rgba<u8> = Rgba([0, 128, 255, 255]);
const START_COLOR: Rgba<u8> = Rgba([22, 193, 0, 255]);

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no route from {from} to {to}")]
    NoRouteFound { from: TileCoord, to: TileCoord },
}

/// Grid coordinate of a tile; not pixels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileCoord {
    pub col: u32,
    pub row: u32,
}

impl TileCoord {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub coord: TileCoord,
    pub bounds: Rect,
    /// Rendering color for the grid overlay; informational only.
    pub color: Rgba<u8>,
    pub cost: u8,
}

/// Row-major arena of tiles. Empty until the first frame of sufficient
/// size arrives.
#[derive(Debug, Clone, Default)]
pub struct TileGrid {
    cols: u32,
    rows: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        !self.tiles.is_empty()
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Build the geometry from the frame dimensions. Only the first call
    /// does anything; tile rectangles are immutable afterwards. The grid
    /// covers the largest tile-aligned area of the frame.
    pub fn ensure_built(&mut self, width: u32, height: u32) {
        if self.is_built() {
            return;
        }
        let cols = width / TILE_EDGE;
        let rows = height / TILE_EDGE;
        if cols == 0 || rows == 0 {
            debug!(width, height, "frame too small to tile");
            return;
        }
        self.cols = cols;
        self.rows = rows;
        self.tiles.reserve((cols * rows) as usize);
        for row in 0..rows {
            for col in 0..cols {
                self.tiles.push(Tile {
                    coord: TileCoord::new(col, row),
                    bounds: Rect::new(
                        col * TILE_EDGE,
                        row * TILE_EDGE,
                        (col + 1) * TILE_EDGE,
                        (row + 1) * TILE_EDGE,
                    ),
                    color: FREE_COLOR,
                    cost: 0,
                });
            }
        }
        debug!(cols, rows, "tile grid built");
    }

    /// Resample every tile's traversal cost from the current frame: a pure
    /// black center means the tile cannot be entered.
    pub fn refresh_costs(&mut self, frame: &RgbaImage) -> Result<(), VisionError> {
        for tile in &mut self.tiles {
            let color = sample_center(frame, &tile.bounds)?;
            if color == BLACK {
                tile.cost = IMPASSABLE;
                tile.color = HAZARD_COLOR;
            } else {
                tile.cost = 0;
                tile.color = FREE_COLOR;
            }
        }
        Ok(())
    }

    fn index(&self, coord: TileCoord) -> usize {
        (coord.row * self.cols + coord.col) as usize
    }

    pub fn tile(&self, coord: TileCoord) -> Option<&Tile> {
        (coord.col < self.cols && coord.row < self.rows).then(|| &self.tiles[self.index(coord)])
    }

    /// The tile the pathfinding aims for: rightmost column, vertically
    /// centered row.
    pub fn goal(&self) -> Option<TileCoord> {
        self.is_built()
            .then(|| TileCoord::new(self.cols - 1, (self.rows - 1) / 2))
    }

    /// Nearest tile to a point, by the smallest average size of the union
    /// of the tile's rectangle and a unit rectangle at the point. The first
    /// tile scanned seeds the search; a strictly smaller union replaces it.
    pub fn locate(&self, point: Point) -> Option<TileCoord> {
        let probe = Rect::unit(point);
        let mut nearest: Option<(TileCoord, u32)> = None;
        for tile in &self.tiles {
            let size = tile.bounds.union(&probe).average_size();
            match nearest {
                None => nearest = Some((tile.coord, size)),
                Some((_, best)) if size < best => nearest = Some((tile.coord, size)),
                _ => {}
            }
        }
        nearest.map(|(coord, _)| coord)
    }

    /// Axis-aligned neighbors that exist and can be entered, in fixed
    /// up/right/down/left order.
    fn neighbors(&self, at: TileCoord) -> impl Iterator<Item = TileCoord> + '_ {
        let candidates = [
            at.row.checked_sub(1).map(|row| TileCoord::new(at.col, row)),
            (at.col + 1 < self.cols).then(|| TileCoord::new(at.col + 1, at.row)),
            (at.row + 1 < self.rows).then(|| TileCoord::new(at.col, at.row + 1)),
            at.col.checked_sub(1).map(|col| TileCoord::new(col, at.row)),
        ];
        candidates
            .into_iter()
            .flatten()
            .filter(|&c| self.tile(c).map_or(false, |t| t.cost != IMPASSABLE))
    }

    /// A* from `from` to `to`: unit step cost, Manhattan heuristic,
    /// impassable tiles excluded from expansion. The returned path runs
    /// start to goal inclusive; its tiles get the path color.
    pub fn route(&mut self, from: TileCoord, to: TileCoord) -> Result<Vec<TileCoord>, RouteError> {
        let blocked = |coord| {
            self.tile(coord)
                .map_or(true, |t: &Tile| t.cost == IMPASSABLE)
        };
        if blocked(from) || blocked(to) {
            return Err(RouteError::NoRouteFound { from, to });
        }

        let mut open: BinaryHeap<Reverse<(u32, u64, TileCoord)>> = BinaryHeap::new();
        let mut best_g: HashMap<TileCoord, u32> = HashMap::new();
        let mut came_from: HashMap<TileCoord, TileCoord> = HashMap::new();
        let mut seq = 0u64;

        best_g.insert(from, 0);
        open.push(Reverse((manhattan(from, to), seq, from)));

        while let Some(Reverse((_, _, current))) = open.pop() {
            if current == to {
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(&prev) = came_from.get(&cursor) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                for &coord in &path {
                    let idx = self.index(coord);
                    self.tiles[idx].color = PATH_COLOR;
                }
                let start = self.index(from);
                self.tiles[start].color = START_COLOR;
                trace!(len = path.len(), "route found");
                return Ok(path);
            }

            let g_here = best_g[&current];
            for neighbor in self.neighbors(current).collect::<Vec<_>>() {
                let tentative = g_here + 1;
                if best_g.get(&neighbor).map_or(true, |&g| tentative < g) {
                    best_g.insert(neighbor, tentative);
                    came_from.insert(neighbor, current);
                    seq += 1;
                    open.push(Reverse((tentative + manhattan(neighbor, to), seq, neighbor)));
                }
            }
        }

        Err(RouteError::NoRouteFound { from, to })
    }

    /// Paint every tile's outline in its current color.
    pub fn draw(&self, frame: &mut RgbaImage) {
        for tile in &self.tiles {
            draw_rect(frame, tile.color, &tile.bounds);
        }
    }
}

fn manhattan(a: TileCoord, b: TileCoord) -> u32 {
    a.col.abs_diff(b.col) + a.row.abs_diff(b.row)
}
