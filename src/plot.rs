//! Figures: box-and-strip plots, learning curves, QQ plots
//!
//! Layout math (quartiles, bracket stacking, curve points, QQ points) is kept
//! in plain functions; the `render_*` functions only draw what they return.
//! Renderers return `Box<dyn Error>` like any plotters code; the pipeline
//! turns failures into logged warnings.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::annotate::AnnotationMap;
use crate::config::{BoxPlotConfig, LearningCurveConfig};
use crate::stats::{median, TRIAL_LEVELS};
use crate::trial::{Condition, Measure, TrialTable};

type PlotResult<T> = std::result::Result<T, Box<dyn StdError>>;

/// `<title with underscores>_<id>.jpg`
#[must_use]
pub fn plot_file_name(title: &str, id: usize) -> String {
    format!("{}_{id}.jpg", title.replace(' ', "_"))
}

/// `qqplot_condition_<c>_<measure>.png`
#[must_use]
pub fn qq_file_name(condition: Condition, measure: Measure) -> String {
    format!("qqplot_condition_{condition}_{}.png", measure.name())
}

fn label_of(labels: &BTreeMap<Condition, String>, condition: Condition) -> String {
    labels
        .get(&condition)
        .cloned()
        .unwrap_or_else(|| condition.to_string())
}

/// Whisker-to-whisker summary (whiskers at min/max).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxStats {
    /// Minimum
    pub min: f64,
    /// First quartile
    pub q1: f64,
    /// Median
    pub median: f64,
    /// Third quartile
    pub q3: f64,
    /// Maximum
    pub max: f64,
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let pos = q * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (pos - pos.floor()) * (sorted[hi] - sorted[lo])
}

/// Five-number summary with linear-interpolated quartiles; `None` if empty.
#[must_use]
pub fn box_stats(values: &[f64]) -> Option<BoxStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(BoxStats {
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: median(&sorted),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}

/// A significance bracket between two rows of the box plot.
#[derive(Debug, Clone, PartialEq)]
pub struct Bracket {
    /// Row index of one end (0 = first in plot order)
    pub from: usize,
    /// Row index of the other end (`from < to`)
    pub to: usize,
    /// Stacking level, 0 closest to the data
    pub level: usize,
    /// Label drawn beside the bracket
    pub label: String,
}

/// Stack brackets so none on the same level overlap.
///
/// Shorter spans are placed first. `rows` is the plot order; pairs whose
/// conditions are not plotted are skipped.
#[must_use]
pub fn bracket_layout(rows: &[Condition], annotations: &AnnotationMap) -> Vec<Bracket> {
    let position = |c: Condition| rows.iter().position(|r| *r == c);
    let mut spans: Vec<(usize, usize, String)> = annotations
        .iter()
        .filter_map(|((a, b), label)| {
            let (pa, pb) = (position(*a)?, position(*b)?);
            Some((pa.min(pb), pa.max(pb), label.clone()))
        })
        .collect();
    spans.sort_by_key(|(from, to, _)| (to - from, *from));

    let mut levels: Vec<Vec<(usize, usize)>> = Vec::new();
    let mut brackets = Vec::new();
    for (from, to, label) in spans {
        let level = levels
            .iter()
            .position(|taken| taken.iter().all(|&(f, t)| to < f || from > t))
            .unwrap_or(levels.len());
        if level == levels.len() {
            levels.push(Vec::new());
        }
        levels[level].push((from, to));
        brackets.push(Bracket {
            from,
            to,
            level,
            label,
        });
    }
    brackets
}

/// Render the horizontal box-and-strip plot of one measure.
///
/// # Errors
///
/// Returns error if the output directory cannot be created or drawing fails.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::too_many_lines
)]
pub fn render_box_plot(
    path: &Path,
    table: &TrialTable,
    measure: Measure,
    config: &BoxPlotConfig,
    annotations: &AnnotationMap,
) -> PlotResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let rows: Vec<(Condition, Vec<f64>)> = config
        .order
        .iter()
        .map(|&c| (c, table.values(measure, c)))
        .filter(|(_, v)| !v.is_empty())
        .collect();
    if rows.is_empty() {
        return Err(format!("no finite {} values to plot", measure.name()).into());
    }
    let plotted: Vec<Condition> = rows.iter().map(|(c, _)| *c).collect();
    let brackets = bracket_layout(&plotted, annotations);

    let (mut lo, mut hi) = rows
        .iter()
        .flat_map(|(_, v)| v.iter().copied())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if (hi - lo).abs() < f64::EPSILON {
        lo -= 1.0;
        hi += 1.0;
    }
    let step = 0.08 * (hi - lo);
    let levels = brackets.iter().map(|b| b.level + 1).max().unwrap_or(0);
    let (x_min, x_max) = config
        .limits
        .unwrap_or((lo - step, hi + step * (levels as f64 + 1.5)));

    // first row in plot order is drawn at the top
    let k = rows.len();
    let y_of = |i: usize| (k - 1 - i) as f64;
    let labels: Vec<String> = plotted
        .iter()
        .rev()
        .map(|c| label_of(&config.condition_labels, *c))
        .collect();

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(config.title.as_str(), ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(140)
        .build_cartesian_2d(x_min..x_max, -0.6..(k as f64 - 0.4))?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .x_desc(config.x_label.as_str())
        .y_desc(config.y_label.as_str())
        .y_labels(2 * k + 2)
        .y_label_formatter(&|y| {
            let idx = y.round();
            if (y - idx).abs() < 1e-6 && idx >= 0.0 {
                labels.get(idx as usize).cloned().unwrap_or_default()
            } else {
                String::new()
            }
        })
        .draw()?;

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for (i, (_, values)) in rows.iter().enumerate() {
        let Some(stats) = box_stats(values) else {
            continue;
        };
        let y = y_of(i);
        let color = Palette99::pick(i).to_rgba();
        chart.draw_series(std::iter::once(Rectangle::new(
            [(stats.q1, y - 0.3), (stats.q3, y + 0.3)],
            color.mix(0.5).filled(),
        )))?;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(stats.q1, y - 0.3), (stats.q3, y + 0.3)],
            BLACK.stroke_width(1),
        )))?;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(stats.median, y - 0.3), (stats.median, y + 0.3)],
            BLACK.stroke_width(2),
        )))?;
        for (end, edge) in [(stats.min, stats.q1), (stats.max, stats.q3)] {
            chart.draw_series(std::iter::once(PathElement::new(vec![(end, y), (edge, y)], BLACK)))?;
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(end, y - 0.15), (end, y + 0.15)],
                BLACK,
            )))?;
        }
        chart.draw_series(values.iter().map(|&v| {
            let jitter = rng.gen_range(-0.2..0.2);
            Circle::new((v, y + jitter), 3, BLACK.mix(0.5).filled())
        }))?;
    }

    let tick = 0.25 * step;
    for bracket in &brackets {
        let x = hi + step * (bracket.level as f64 + 1.0);
        let (ya, yb) = (y_of(bracket.from), y_of(bracket.to));
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x - tick, ya), (x, ya), (x, yb), (x - tick, yb)],
            BLACK,
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            bracket.label.clone(),
            (x + 0.1 * step, (ya + yb) / 2.0),
            ("sans-serif", 14).into_font(),
        )))?;
    }

    root.present()?;
    Ok(())
}

/// Mean ± standard error of one condition at one trial index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// Trial index
    pub trial: u8,
    /// Mean
    pub mean: f64,
    /// Standard error (0 for a single value)
    pub se: f64,
    /// Observations
    pub n: usize,
}

/// Learning-curve points per condition, in `order`. Rows without a trial
/// index are ignored.
#[must_use]
pub fn learning_curve_points(
    table: &TrialTable,
    measure: Measure,
    order: &[Condition],
) -> Vec<(Condition, Vec<CurvePoint>)> {
    order
        .iter()
        .map(|&condition| {
            let points = TRIAL_LEVELS
                .iter()
                .filter_map(|&trial| {
                    let values: Vec<f64> = table
                        .records()
                        .iter()
                        .filter(|r| r.condition == condition && r.trial_index == Some(trial))
                        .map(|r| measure.value(r))
                        .filter(|v| v.is_finite())
                        .collect();
                    if values.is_empty() {
                        return None;
                    }
                    #[allow(clippy::cast_precision_loss)]
                    let n = values.len() as f64;
                    let mean = values.iter().sum::<f64>() / n;
                    let se = if values.len() > 1 {
                        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
                        (var / n).sqrt()
                    } else {
                        0.0
                    };
                    Some(CurvePoint {
                        trial,
                        mean,
                        se,
                        n: values.len(),
                    })
                })
                .collect();
            (condition, points)
        })
        .collect()
}

/// Render the learning-curve plot of one measure.
///
/// # Errors
///
/// Returns error if there is nothing to plot or drawing fails.
pub fn render_learning_curve(
    path: &Path,
    table: &TrialTable,
    measure: Measure,
    config: &LearningCurveConfig,
) -> PlotResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let series: Vec<_> = learning_curve_points(table, measure, &config.order)
        .into_iter()
        .filter(|(_, points)| !points.is_empty())
        .collect();
    if series.is_empty() {
        return Err("no observations with a trial index".into());
    }

    // an inverted axis is drawn by negating values and un-negating the labels
    let sign = if config.invert_y { -1.0 } else { 1.0 };
    let (mut lo, mut hi) = series
        .iter()
        .flat_map(|(_, pts)| pts.iter())
        .flat_map(|p| [sign * (p.mean - p.se), sign * (p.mean + p.se)])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let pad = if hi > lo { 0.1 * (hi - lo) } else { 1.0 };
    lo -= pad;
    hi += pad;

    let root = BitMapBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(config.title.as_str(), ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.7..3.3, lo..hi)?;

    chart
        .configure_mesh()
        .x_desc(config.x_label.as_str())
        .y_desc(config.y_label.as_str())
        .x_labels(3)
        .x_label_formatter(&|x| format!("{x:.0}"))
        .y_label_formatter(&|y| format!("{:.1}", sign * y))
        .draw()?;

    for (i, (condition, points)) in series.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        let line: Vec<(f64, f64)> = points
            .iter()
            .map(|p| (f64::from(p.trial), sign * p.mean))
            .collect();
        chart
            .draw_series(LineSeries::new(line.clone(), &color))?
            .label(label_of(&config.condition_labels, *condition))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        chart.draw_series(line.iter().map(|&(x, y)| Circle::new((x, y), 4, color.filled())))?;

        let cap = 0.04;
        for p in points {
            let x = f64::from(p.trial);
            let (y0, y1) = (sign * (p.mean - p.se), sign * (p.mean + p.se));
            chart.draw_series(std::iter::once(PathElement::new(vec![(x, y0), (x, y1)], color)))?;
            for y in [y0, y1] {
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(x - cap, y), (x + cap, y)],
                    color,
                )))?;
            }
        }
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// `(theoretical quantile, sample value)` pairs, Blom plotting positions.
#[must_use]
pub fn qq_points(values: &[f64]) -> Vec<(f64, f64)> {
    let Ok(normal) = Normal::new(0.0, 1.0) else {
        return Vec::new();
    };
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    #[allow(clippy::cast_precision_loss)]
    let n = sorted.len() as f64;
    sorted
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            #[allow(clippy::cast_precision_loss)]
            let p = (i as f64 + 1.0 - 0.375) / (n + 0.25);
            (normal.inverse_cdf(p), v)
        })
        .collect()
}

/// Render a normal QQ plot with the mean/sd reference line.
///
/// # Errors
///
/// Returns error with fewer than 3 finite values or when drawing fails.
pub fn render_qq_plot(path: &Path, values: &[f64], title: &str) -> PlotResult<()> {
    let points = qq_points(values);
    if points.len() < 3 {
        return Err(format!("QQ plot needs 3 values, got {}", points.len()).into());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let mean = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sd = (points.iter().map(|p| (p.1 - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    let (q_lo, q_hi) = (points[0].0, points[points.len() - 1].0);
    let (v_lo, v_hi) = points
        .iter()
        .map(|p| p.1)
        .chain([mean + sd * q_lo, mean + sd * q_hi])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let pad = if v_hi > v_lo { 0.05 * (v_hi - v_lo) } else { 1.0 };

    let root = BitMapBackend::new(path, (640, 480)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((q_lo - 0.2)..(q_hi + 0.2), (v_lo - pad)..(v_hi + pad))?;

    chart
        .configure_mesh()
        .x_desc("Theoretical quantiles")
        .y_desc("Sample quantiles")
        .draw()?;
    chart.draw_series(LineSeries::new(
        [(q_lo, mean + sd * q_lo), (q_hi, mean + sd * q_hi)],
        &RED,
    ))?;
    chart.draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 3, BLUE.filled())))?;

    root.present()?;
    Ok(())
}

/// One figure the renderer attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPlot {
    /// Output path
    pub path: PathBuf,
    /// `None` on success, else the failure message
    pub failure: Option<String>,
}

impl RenderedPlot {
    pub(crate) fn from_result(path: PathBuf, result: PlotResult<()>) -> Self {
        let failure = result.err().map(|e| e.to_string());
        if let Some(reason) = &failure {
            tracing::warn!(path = %path.display(), %reason, "plot not rendered");
        } else {
            tracing::debug!(path = %path.display(), "plot rendered");
        }
        Self { path, failure }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::extract_condition_annotations;

    #[test]
    fn test_file_names() {
        assert_eq!(
            plot_file_name("Completion Time by Condition", 0),
            "Completion_Time_by_Condition_0.jpg"
        );
        assert_eq!(
            qq_file_name(Condition::new(2), Measure::Error),
            "qqplot_condition_2_error.png"
        );
    }

    #[test]
    fn test_box_stats() {
        let stats = box_stats(&[5.0, 1.0, 3.0, 2.0, 4.0]).unwrap();
        assert!((stats.min - 1.0).abs() < f64::EPSILON);
        assert!((stats.q1 - 2.0).abs() < f64::EPSILON);
        assert!((stats.median - 3.0).abs() < f64::EPSILON);
        assert!((stats.q3 - 4.0).abs() < f64::EPSILON);
        assert!((stats.max - 5.0).abs() < f64::EPSILON);
        assert!(box_stats(&[]).is_none());
    }

    #[test]
    fn test_brackets_do_not_overlap_on_a_level() {
        let c = Condition::ALL;
        let pairs = [(c[0], c[1]), (c[1], c[2]), (c[0], c[2])];
        let annotations = extract_condition_annotations(None, None, 0.05, Some(&pairs));
        let brackets = bracket_layout(&c, &annotations);
        assert_eq!(brackets.len(), 3);

        // adjacent pairs share row 1, so they cannot share a level
        let adjacent: Vec<_> = brackets.iter().filter(|b| b.to - b.from == 1).collect();
        assert_ne!(adjacent[0].level, adjacent[1].level);
        let wide = brackets.iter().find(|b| b.to - b.from == 2).unwrap();
        assert_eq!(wide.level, 2);
    }

    #[test]
    fn test_brackets_skip_unplotted_conditions() {
        let pairs = [(Condition::new(0), Condition::new(2))];
        let annotations = extract_condition_annotations(None, None, 0.05, Some(&pairs));
        assert!(bracket_layout(&[Condition::new(0), Condition::new(1)], &annotations).is_empty());
    }

    #[test]
    fn test_learning_curve_points() {
        use crate::trial::TrialRecord;
        let table = TrialTable::new(vec![
            TrialRecord::new("01", Condition::new(0), 10.0, 1.0).with_trial_index(1),
            TrialRecord::new("02", Condition::new(0), 20.0, 1.0).with_trial_index(1),
            TrialRecord::new("03", Condition::new(0), 5.0, 1.0),
        ]);
        let curves = learning_curve_points(&table, Measure::Time, &[Condition::new(0)]);
        let points = &curves[0].1;
        assert_eq!(points.len(), 1);
        assert!((points[0].mean - 15.0).abs() < f64::EPSILON);
        assert!((points[0].se - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_qq_points_are_monotone() {
        let points = qq_points(&[3.0, 1.0, f64::NAN, 2.0]);
        assert_eq!(points.len(), 3);
        assert!(points.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 <= w[1].1));
        assert!((points[1].0).abs() < 1e-12);
    }
}
