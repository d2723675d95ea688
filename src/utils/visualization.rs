//! Visualization of path optimization results using gnuplot.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::types::State;
use crate::reference_path::ReferencePath;

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const ORANGE: &str = "#FFA500";
    pub const GRAY: &str = "#808080";

    pub const OBSTACLE: &str = BLACK;
    pub const START: &str = GREEN;
    pub const GOAL: &str = BLUE;
    pub const PATH: &str = RED;
    pub const REFERENCE: &str = GRAY;
    pub const BOUNDS: &str = ORANGE;
}

/// Style for line rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

enum Series {
    Lines(Vec<f64>, Vec<f64>, PathStyle),
    Points(Vec<f64>, Vec<f64>, String, String, char, f64),
}

/// Collects the layers of one plot and renders them into a single axes.
pub struct Visualizer {
    title: String,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    series: Vec<Series>,
}

impl Visualizer {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            x_range: None,
            y_range: None,
            series: Vec::new(),
        }
    }

    pub fn set_x_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.x_range = Some((min, max));
        self
    }

    pub fn set_y_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.y_range = Some((min, max));
        self
    }

    pub fn plot_states(&mut self, states: &[State], style: PathStyle) -> &mut Self {
        let x = states.iter().map(|p| p.x).collect();
        let y = states.iter().map(|p| p.y).collect();
        self.series.push(Series::Lines(x, y, style));
        self
    }

    pub fn plot_obstacles_xy(&mut self, ox: &[f64], oy: &[f64]) -> &mut Self {
        self.series.push(Series::Points(
            ox.to_vec(),
            oy.to_vec(),
            "Obstacles".to_string(),
            colors::OBSTACLE.to_string(),
            'S',
            0.5,
        ));
        self
    }

    /// Left and right corridor limits of every reference sample.
    pub fn plot_bounds(&mut self, reference: &ReferencePath) -> &mut Self {
        let mut left = (Vec::new(), Vec::new());
        let mut right = (Vec::new(), Vec::new());
        for (i, &(lower, upper)) in reference.bounds().iter().enumerate() {
            let sample = reference.sample(i);
            let normal = sample.normal();
            left.0.push(sample.x + upper * normal[0]);
            left.1.push(sample.y + upper * normal[1]);
            right.0.push(sample.x + lower * normal[0]);
            right.1.push(sample.y + lower * normal[1]);
        }
        let style = PathStyle::new(colors::BOUNDS, "Bounds").with_line_width(1.0);
        self.series.push(Series::Lines(left.0, left.1, style.clone()));
        self.series.push(Series::Lines(
            right.0,
            right.1,
            PathStyle { caption: String::new(), ..style },
        ));
        self
    }

    pub fn plot_pose(&mut self, state: &State, color: &str, caption: &str) -> &mut Self {
        self.series.push(Series::Points(
            vec![state.x],
            vec![state.y],
            caption.to_string(),
            color.to_string(),
            'O',
            1.5,
        ));
        self
    }

    fn render(&self) -> Figure {
        let mut figure = Figure::new();
        let axes = figure.axes2d();
        for series in &self.series {
            match series {
                Series::Lines(x, y, style) => {
                    axes.lines(
                        x,
                        y,
                        &[
                            Caption(&style.caption),
                            Color(&style.color),
                            LineWidth(style.line_width),
                        ],
                    );
                }
                Series::Points(x, y, caption, color, symbol, size) => {
                    axes.points(
                        x,
                        y,
                        &[
                            Caption(caption),
                            Color(color),
                            PointSymbol(*symbol),
                            PointSize(*size),
                        ],
                    );
                }
            }
        }
        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label("X [m]", &[]);
        axes.set_y_label("Y [m]", &[]);
        if let Some((min, max)) = self.x_range {
            axes.set_x_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some((min, max)) = self.y_range {
            axes.set_y_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        axes.set_aspect_ratio(AutoOption::Fix(1.0));
        figure
    }

    /// Save plot to PNG file
    pub fn save_png(&self, path: &str, width: u32, height: u32) -> Result<(), String> {
        self.render()
            .save_to_png(path, width, height)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_style() {
        let style = PathStyle::new(colors::RED, "Result").with_line_width(3.0);
        assert_eq!(style.line_width, 3.0);
        assert_eq!(style.color, colors::RED);
    }

    #[test]
    fn test_layers_collected() {
        let states = vec![State::new(0.0, 0.0, 0.0), State::new(1.0, 0.0, 0.0)];
        let mut vis = Visualizer::new("test");
        vis.plot_states(&states, PathStyle::new(colors::PATH, "Result"))
            .plot_pose(&states[0], colors::START, "Start")
            .plot_obstacles_xy(&[2.0], &[2.0]);
        assert_eq!(vis.series.len(), 3);
    }
}
