//! SVG Chart Generator for Run Artifacts
//!
//! Hand-built SVG for the two figures a training run leaves behind: the
//! confusion matrix heatmap of the best model and the per-epoch curves.

use std::fs;
use std::path::Path;

use crate::utils::metrics::ConfusionMatrix;

/// Chart styling constants
const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

const HEATMAP_CELL: f64 = 36.0;
const HEATMAP_MARGIN: f64 = 140.0;

const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

pub const COLOR_TRAIN: &str = "#3498db";
pub const COLOR_VAL: &str = "#e74c3c";
pub const COLOR_F1: &str = "#2ecc71";

/// A data point for a line chart
#[derive(Debug, Clone)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

/// A data series for charts
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color: String,
}

impl DataSeries {
    /// Series indexed by epoch (x = 0, 1, 2, ...)
    pub fn per_epoch(name: &str, values: &[f64], color: &str) -> Self {
        Self {
            name: name.to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &y)| DataPoint { x: i as f64, y })
                .collect(),
            color: color.to_string(),
        }
    }
}

/// Render a confusion matrix as an SVG heatmap (rows = actual, cols = predicted).
pub fn confusion_matrix_svg(cm: &ConfusionMatrix, class_names: &[String]) -> String {
    let n = cm.num_classes;
    let size = HEATMAP_MARGIN + n as f64 * HEATMAP_CELL + 40.0;
    let max = cm.max_count().max(1) as f64;

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {s} {s}" width="{s}" height="{s}">"#,
        s = size
    ));
    svg.push_str(&format!(
        r#"<rect width="{s}" height="{s}" fill="white"/>"#,
        s = size
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="30" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">Confusion Matrix (acc {:.2}%)</text>"#,
        size / 2.0,
        COLOR_TEXT,
        cm.accuracy() * 100.0
    ));

    for row in 0..n {
        for col in 0..n {
            let count = cm.get(row, col);
            let intensity = count as f64 / max;
            // white -> deep blue
            let r = (255.0 * (1.0 - intensity) + 8.0 * intensity) as u8;
            let g = (255.0 * (1.0 - intensity) + 48.0 * intensity) as u8;
            let b = (255.0 * (1.0 - intensity) + 107.0 * intensity) as u8;
            let x = HEATMAP_MARGIN + col as f64 * HEATMAP_CELL;
            let y = HEATMAP_MARGIN + row as f64 * HEATMAP_CELL;

            svg.push_str(&format!(
                r##"<rect x="{}" y="{}" width="{}" height="{}" fill="#{:02x}{:02x}{:02x}" stroke="{}"/>"##,
                x, y, HEATMAP_CELL, HEATMAP_CELL, r, g, b, COLOR_GRID
            ));
            let text_color = if intensity > 0.5 { "white" } else { COLOR_TEXT };
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
                x + HEATMAP_CELL / 2.0,
                y + HEATMAP_CELL / 2.0 + 4.0,
                text_color,
                count
            ));
        }
    }

    for (i, name) in class_names.iter().enumerate().take(n) {
        let offset = HEATMAP_MARGIN + i as f64 * HEATMAP_CELL + HEATMAP_CELL / 2.0;
        // Row label (actual)
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="10" fill="{}">{}</text>"#,
            HEATMAP_MARGIN - 6.0,
            offset + 3.0,
            COLOR_TEXT,
            escape_xml(name)
        ));
        // Column label (predicted), rotated
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" text-anchor="start" font-family="Arial, sans-serif" font-size="10" fill="{c}" transform="rotate(-60 {x} {y})">{t}</text>"#,
            x = offset,
            y = HEATMAP_MARGIN - 6.0,
            c = COLOR_TEXT,
            t = escape_xml(name)
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Write the confusion matrix heatmap to `output_path`
pub fn generate_confusion_matrix(
    cm: &ConfusionMatrix,
    class_names: &[String],
    output_path: &Path,
) -> std::io::Result<()> {
    fs::write(output_path, confusion_matrix_svg(cm, class_names))
}

/// Generate a line chart SVG with a free y range
pub fn generate_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    output_path: &Path,
) -> std::io::Result<()> {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let (x_min, x_max, y_max) = find_ranges(series);
    let y_min = 0.0;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    for i in 0..=5 {
        let y = MARGIN_TOP + plot_height - (i as f64 / 5.0) * plot_height;
        let value = y_min + (i as f64 / 5.0) * (y_max - y_min);

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.3}</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, value
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, MARGIN_TOP + plot_height, COLOR_AXIS
    ));

    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 20.0, COLOR_TEXT, escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0, escape_xml(y_label)
    ));

    let x_span = (x_max - x_min).max(1.0);
    let y_span = (y_max - y_min).max(f64::EPSILON);
    let to_screen = |p: &DataPoint| -> (f64, f64) {
        (
            MARGIN_LEFT + ((p.x - x_min) / x_span) * plot_width,
            MARGIN_TOP + plot_height - ((p.y - y_min) / y_span) * plot_height,
        )
    };

    for series_data in series.iter().filter(|s| !s.points.is_empty()) {
        let path: Vec<String> = series_data
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let (x, y) = to_screen(p);
                format!("{} {} {}", if i == 0 { "M" } else { "L" }, x, y)
            })
            .collect();

        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            path.join(" "),
            series_data.color
        ));

        for point in &series_data.points {
            let (x, y) = to_screen(point);
            svg.push_str(&format!(
                r#"<circle cx="{}" cy="{}" r="4" fill="{}" stroke="white" stroke-width="2"/>"#,
                x, y, series_data.color
            ));
        }
    }

    // X-axis ticks from the first series
    if let Some(first) = series.first() {
        for point in &first.points {
            let (x, _) = to_screen(point);
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.0}</text>"#,
                x, MARGIN_TOP + plot_height + 20.0, COLOR_TEXT, point.x
            ));
        }
    }

    // Legend
    let mut legend_y = MARGIN_TOP + 10.0;
    for series_data in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 120.0, legend_y, series_data.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 100.0, legend_y + 12.0, COLOR_TEXT, escape_xml(&series_data.name)
        ));
        legend_y += 25.0;
    }

    svg.push_str("</svg>");

    fs::write(output_path, svg)
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_max = 0.0f64;

    for p in series.iter().flat_map(|s| s.points.iter()) {
        x_min = x_min.min(p.x);
        x_max = x_max.max(p.x);
        if p.y.is_finite() {
            y_max = y_max.max(p.y);
        }
    }

    if x_min > x_max {
        (0.0, 1.0, 1.0)
    } else {
        (x_min, x_max, if y_max > 0.0 { y_max * 1.1 } else { 1.0 })
    }
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
