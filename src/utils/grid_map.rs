// Occupancy grid map with a distance field

extern crate nalgebra as na;

use itertools::iproduct;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::common::error::{OptimizerError, OptimizerResult};
use crate::common::traits::ObstacleMap;

/// Occupancy grid covering `[min_x, min_x + x_width * resolution)` by
/// `[min_y, min_y + y_width * resolution)`. Everything outside counts as occupied.
#[derive(Debug, Clone)]
pub struct GridMap {
    pub resolution: f64,
    pub min_x: f64,
    pub min_y: f64,
    pub x_width: usize,
    pub y_width: usize,
    obstacle_map: Vec<Vec<bool>>,
    // Distance between cell centers and the nearest occupied cell center.
    distance_map: Vec<Vec<f64>>,
}

impl GridMap {
    /// Build from an occupancy matrix indexed `(ix, iy)`; non-zero cells are occupied.
    pub fn from_occupancy(
        occupancy: &na::DMatrix<i32>,
        min_x: f64,
        min_y: f64,
        resolution: f64,
    ) -> OptimizerResult<Self> {
        if !(resolution > 0.0) {
            return Err(OptimizerError::InvalidParameter(
                "grid resolution must be positive".to_string(),
            ));
        }
        let (x_width, y_width) = occupancy.shape();
        if x_width == 0 || y_width == 0 {
            return Err(OptimizerError::InvalidParameter("grid map is empty".to_string()));
        }
        let obstacle_map = (0..x_width)
            .map(|ix| (0..y_width).map(|iy| occupancy[(ix, iy)] != 0).collect())
            .collect();
        Ok(Self::build(obstacle_map, min_x, min_y, resolution))
    }

    /// Build a map over the given bounds with the cells containing `(ox, oy)` occupied.
    pub fn from_obstacles(
        ox: &[f64],
        oy: &[f64],
        bounds: (f64, f64, f64, f64),
        resolution: f64,
    ) -> OptimizerResult<Self> {
        let (min_x, min_y, max_x, max_y) = bounds;
        if !(resolution > 0.0) || !(max_x > min_x) || !(max_y > min_y) {
            return Err(OptimizerError::InvalidParameter(
                "grid bounds and resolution must describe a non-empty area".to_string(),
            ));
        }
        if ox.len() != oy.len() {
            return Err(OptimizerError::InvalidParameter(
                "obstacle x and y must have equal length".to_string(),
            ));
        }
        let x_width = ((max_x - min_x) / resolution).ceil() as usize;
        let y_width = ((max_y - min_y) / resolution).ceil() as usize;
        let mut obstacle_map = vec![vec![false; y_width]; x_width];
        for (&x, &y) in ox.iter().zip(oy.iter()) {
            let ix = ((x - min_x) / resolution).floor();
            let iy = ((y - min_y) / resolution).floor();
            if ix >= 0.0 && iy >= 0.0 && (ix as usize) < x_width && (iy as usize) < y_width {
                obstacle_map[ix as usize][iy as usize] = true;
            }
        }
        Ok(Self::build(obstacle_map, min_x, min_y, resolution))
    }

    fn build(obstacle_map: Vec<Vec<bool>>, min_x: f64, min_y: f64, resolution: f64) -> Self {
        let x_width = obstacle_map.len();
        let y_width = obstacle_map[0].len();
        let distance_map = Self::calc_distance_map(&obstacle_map, resolution);
        GridMap {
            resolution,
            min_x,
            min_y,
            x_width,
            y_width,
            obstacle_map,
            distance_map,
        }
    }

    /// Multi-source Dijkstra over the 8-connected grid. Cells next to the map
    /// border are seeded with one resolution to the outside.
    fn calc_distance_map(obstacle_map: &[Vec<bool>], resolution: f64) -> Vec<Vec<f64>> {
        let x_width = obstacle_map.len();
        let y_width = obstacle_map[0].len();
        let mut distance = vec![vec![f64::INFINITY; y_width]; x_width];
        let mut open = BinaryHeap::new();

        for (ix, iy) in iproduct!(0..x_width, 0..y_width) {
            let seed = if obstacle_map[ix][iy] {
                0.0
            } else if ix == 0 || iy == 0 || ix == x_width - 1 || iy == y_width - 1 {
                resolution
            } else {
                continue;
            };
            distance[ix][iy] = seed;
            open.push(Reverse((OrderedFloat(seed), ix, iy)));
        }

        let motion = [
            (1, 0, 1.0),
            (0, 1, 1.0),
            (-1, 0, 1.0),
            (0, -1, 1.0),
            (-1, -1, 2_f64.sqrt()),
            (-1, 1, 2_f64.sqrt()),
            (1, -1, 2_f64.sqrt()),
            (1, 1, 2_f64.sqrt()),
        ];
        while let Some(Reverse((OrderedFloat(d), ix, iy))) = open.pop() {
            if d > distance[ix][iy] {
                continue;
            }
            for (dx, dy, cost) in motion.iter() {
                let nx = ix as i64 + dx;
                let ny = iy as i64 + dy;
                if nx < 0 || ny < 0 || nx >= x_width as i64 || ny >= y_width as i64 {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                let nd = d + cost * resolution;
                if nd < distance[nx][ny] {
                    distance[nx][ny] = nd;
                    open.push(Reverse((OrderedFloat(nd), nx, ny)));
                }
            }
        }
        distance
    }

    pub fn calc_xy_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let ix = ((x - self.min_x) / self.resolution).floor();
        let iy = ((y - self.min_y) / self.resolution).floor();
        if ix < 0.0 || iy < 0.0 {
            return None;
        }
        let (ix, iy) = (ix as usize, iy as usize);
        if ix >= self.x_width || iy >= self.y_width {
            return None;
        }
        Some((ix, iy))
    }

    /// Center of cell `(ix, iy)`
    pub fn calc_grid_position(&self, ix: usize, iy: usize) -> (f64, f64) {
        (
            self.min_x + (ix as f64 + 0.5) * self.resolution,
            self.min_y + (iy as f64 + 0.5) * self.resolution,
        )
    }

    pub fn is_occupied(&self, x: f64, y: f64) -> bool {
        match self.calc_xy_index(x, y) {
            Some((ix, iy)) => self.obstacle_map[ix][iy],
            None => true,
        }
    }

    /// Centers of all occupied cells, for plotting.
    pub fn obstacle_points(&self) -> (Vec<f64>, Vec<f64>) {
        let mut ox = Vec::new();
        let mut oy = Vec::new();
        for (ix, iy) in iproduct!(0..self.x_width, 0..self.y_width) {
            if self.obstacle_map[ix][iy] {
                let (x, y) = self.calc_grid_position(ix, iy);
                ox.push(x);
                oy.push(y);
            }
        }
        (ox, oy)
    }
}

impl ObstacleMap for GridMap {
    fn obstacle_distance(&self, x: f64, y: f64) -> f64 {
        match self.calc_xy_index(x, y) {
            Some((ix, iy)) if !self.obstacle_map[ix][iy] => {
                // Center-to-center distance minus half a cell approximates the
                // distance to the obstacle boundary.
                (self.distance_map[ix][iy] - 0.5 * self.resolution).max(0.0)
            }
            _ => 0.0,
        }
    }

    fn is_inside(&self, x: f64, y: f64) -> bool {
        self.calc_xy_index(x, y).is_some()
    }
}
