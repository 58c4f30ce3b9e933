//! Plain-text rendering of a pipeline run

use crate::data::TablePreview;
use crate::ml::ImportanceKind;
use crate::pipeline::{ChartPoint, FeatureImportance, PipelineResult};
use std::fmt::Write;

/// Width of the longest importance bar
const BAR_WIDTH: usize = 30;

/// Render every section of a result
pub fn render(result: &PipelineResult) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "=== {} | {} | target {} | {} ===",
        result.symbol,
        result.model.kind(),
        result.target,
        result.preprocessing
    );
    let _ = writeln!(out, "run {} at {}", result.run_id, result.generated_at.to_rfc3339());
    out.push('\n');

    let _ = writeln!(out, "Data (first {} rows)", result.preview.rows.len());
    out.push_str(&preview_table(&result.preview));
    let _ = writeln!(
        out,
        "train rows: {}, test rows: {}",
        result.sizes.n_train, result.sizes.n_test
    );
    out.push('\n');

    let heading = match result.importance_kind {
        ImportanceKind::Coefficient => "coefficient",
        ImportanceKind::Impurity => "impurity decrease",
    };
    let _ = writeln!(out, "Feature Importance ({})", heading);
    out.push_str(&importance_table(&result.importances));
    out.push('\n');

    let metrics = result.metrics.rounded(2);
    let _ = writeln!(out, "Evaluation");
    let _ = writeln!(out, "  MSE: {:.2}", metrics.mse);
    let _ = writeln!(out, "  MAE: {:.2}", metrics.mae);
    let _ = writeln!(out, "  R²:  {:.2}", metrics.r2);
    out.push('\n');

    let _ = writeln!(out, "Chart");
    for (label, points) in [
        ("train actual", &result.chart.train_actual),
        ("test actual", &result.chart.test_actual),
        ("predictions", &result.chart.predictions),
    ] {
        let _ = writeln!(out, "  {:<13} {}", label, describe_series(points));
    }

    out
}

/// Fixed-width table of the preview rows
pub fn preview_table(preview: &TablePreview) -> String {
    let mut header = vec![String::new()];
    header.extend(preview.columns.iter().cloned());

    let has_dates = preview.rows.iter().any(|r| r.date.is_some());
    let rows: Vec<Vec<String>> = preview
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.index.clone()];
            if has_dates {
                cells.push(row.date.clone().unwrap_or_default());
            }
            cells.extend(row.values.iter().map(|v| format!("{:.2}", v)));
            cells
        })
        .collect();

    let n_cols = header.len();
    let widths: Vec<usize> = (0..n_cols)
        .map(|j| {
            rows.iter()
                .filter_map(|r| r.get(j))
                .chain(std::iter::once(&header[j]))
                .map(|c| c.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    for line in std::iter::once(&header).chain(rows.iter()) {
        let cells: Vec<String> = line
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:>w$}", cell, w = w))
            .collect();
        let _ = writeln!(out, "  {}", cells.join("  ").trim_end());
    }
    out
}

/// Ranked importances with a bar scaled to the largest magnitude
pub fn importance_table(importances: &[FeatureImportance]) -> String {
    let name_width = importances
        .iter()
        .map(|i| i.feature.chars().count())
        .max()
        .unwrap_or(0)
        .max("feature".len());
    let max_magnitude = importances.iter().map(|i| i.magnitude).fold(0.0_f64, f64::max);

    let mut out = String::new();
    let _ = writeln!(out, "  {:<w$}  {:>12}", "feature", "value", w = name_width);
    for imp in importances {
        let _ = writeln!(
            out,
            "  {:<w$}  {:>12.4}  {}",
            imp.feature,
            imp.value,
            bar(imp.magnitude, max_magnitude),
            w = name_width
        );
    }
    out
}

fn bar(magnitude: f64, max_magnitude: f64) -> String {
    if !(max_magnitude > 0.0) || !magnitude.is_finite() {
        return String::new();
    }
    let len = ((magnitude / max_magnitude) * BAR_WIDTH as f64).round() as usize;
    "#".repeat(len.min(BAR_WIDTH))
}

fn describe_series(points: &[ChartPoint]) -> String {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => format!("{} points, rows {}..={}", points.len(), first.index, last.index),
        _ => "0 points".to_string(),
    }
}
