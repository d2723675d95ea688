//
// Path optimization demo: a coarse S-shaped reference through a parking lot
// with a box obstacle, refined by the QP path optimizer.
//
// usage: path_optimizer_demo [params.toml]
//

use log::{error, info, warn};
use std::process::exit;

use path_optimizer::utils::logger::{logger_init, LevelFilter};
use path_optimizer::utils::visualization::{colors, PathStyle, Visualizer};
use path_optimizer::utils::GridMap;
use path_optimizer::{Config, PathOptimizer, State};

const MAP_WIDTH: f64 = 70.0;
const MAP_HEIGHT: f64 = 30.0;
const RESOLUTION: f64 = 0.1;

fn build_map() -> Option<GridMap> {
    let mut ox = Vec::new();
    let mut oy = Vec::new();
    // Box obstacle next to the reference
    for i in 0..30 {
        for j in 0..20 {
            ox.push(30.0 + i as f64 * RESOLUTION);
            oy.push(17.0 + j as f64 * RESOLUTION);
        }
    }
    // Curb along the bottom
    for i in 0..(MAP_WIDTH / RESOLUTION) as usize {
        ox.push(i as f64 * RESOLUTION);
        oy.push(5.0);
    }
    match GridMap::from_obstacles(&ox, &oy, (0.0, 0.0, MAP_WIDTH, MAP_HEIGHT), RESOLUTION) {
        Ok(map) => Some(map),
        Err(e) => {
            error!("Failed to build the map: {}", e);
            None
        }
    }
}

fn reference_points() -> Vec<State> {
    (0..=60)
        .map(|i| {
            let x = 5.0 + i as f64;
            State::new(x, 15.0 + 3.0 * (x / 12.0).sin(), 0.0)
        })
        .collect()
}

fn main() {
    if let Err(e) = logger_init(LevelFilter::Debug, None) {
        eprintln!("{}", e);
        exit(1);
    }

    let config = match std::env::args().nth(1) {
        Some(path) => match Config::load(&path) {
            Ok(config) => {
                info!("Parameters loaded from {}", path);
                config
            }
            Err(e) => {
                error!("Failed to load parameters from {}: {}", path, e);
                exit(1);
            }
        },
        None => Config {
            enable_computation_time_output: true,
            ..Config::default()
        },
    };

    let map = match build_map() {
        Some(map) => map,
        None => exit(1),
    };
    let (ox, oy) = map.obstacle_points();

    let points = reference_points();
    let start = State::new(5.0, 14.5, 0.3);
    let end = State::new(62.0, 15.0 + 3.0 * (62.0_f64 / 12.0).sin(), 0.0);

    let mut optimizer = match PathOptimizer::new(start, end, Box::new(map), config) {
        Ok(optimizer) => optimizer,
        Err(e) => {
            error!("Invalid parameters: {}", e);
            exit(1);
        }
    };

    let mut result = Vec::new();
    let succeeded = optimizer.solve(&points, &mut result);
    if succeeded {
        info!("Optimized path has {} states", result.len());
    } else {
        warn!("Path optimization failed");
    }
    for (pose, lower, upper) in optimizer.abnormal_bounds() {
        warn!(
            "Empty corridor at ({:.2}, {:.2}): [{:.2}, {:.2}]",
            pose.x, pose.y, lower, upper
        );
    }

    let mut vis = Visualizer::new("Path optimization");
    vis.set_x_range(0.0, MAP_WIDTH).set_y_range(0.0, MAP_HEIGHT);
    vis.plot_obstacles_xy(&ox, &oy)
        .plot_states(&points, PathStyle::new(colors::BLACK, "Input").with_line_width(1.0))
        .plot_states(
            optimizer.smoothed_path(),
            PathStyle::new(colors::REFERENCE, "Smoothed reference"),
        )
        .plot_bounds(optimizer.reference_path())
        .plot_states(&result, PathStyle::new(colors::PATH, "Result"))
        .plot_pose(&start, colors::START, "Start")
        .plot_pose(&end, colors::GOAL, "Goal");

    if let Err(e) = std::fs::create_dir_all("./img") {
        error!("Failed to create the output directory: {}", e);
        exit(1);
    }
    match vis.save_png("./img/path_optimizer.png", 1200, 600) {
        Ok(_) => info!("Plot saved to ./img/path_optimizer.png"),
        Err(e) => error!("Failed to save the plot: {}", e),
    }

    if !succeeded {
        exit(1);
    }
}
