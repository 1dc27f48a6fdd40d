/// Comparison chart rendering.
///
/// [`ChartRequest`] is the backend-independent shape of a chart: lines,
/// ticks, labels, scale and size. [`render`] turns a completed store into a
/// request and draws it to a PNG with plotters.
use crate::schema::{AxisScale, MetricSchema};
use crate::store::MetricsStore;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

/// One series as drawn: points in encounter order, x in data units.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartLine {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

/// Everything needed to draw one comparison chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRequest {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_scale: AxisScale,
    pub width: u32,
    pub height: u32,
    /// x tick positions: every x value observed in any series.
    pub ticks: Vec<u64>,
    pub lines: Vec<ChartLine>,
    pub footnote: Option<String>,
}

#[derive(Debug)]
pub enum RenderError {
    /// No series holds a drawable sample.
    NoData,
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Draw(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::NoData => write!(f, "no samples were parsed from the benchmark output"),
            RenderError::Io { path, source } => {
                write!(f, "failed to create {}: {}", path.display(), source)
            }
            RenderError::Draw(msg) => write!(f, "plotting error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ChartRequest {
    /// Build the chart shape for `store` under `schema`.
    ///
    /// Series without samples get no line. On a log axis, samples with
    /// `x == 0` cannot be placed and are dropped.
    pub fn from_store(schema: &MetricSchema, store: &MetricsStore) -> Result<Self, RenderError> {
        let drawable = |x: u64| schema.x_scale == AxisScale::Linear || x > 0;

        let mut dropped = 0usize;
        let lines: Vec<ChartLine> = store
            .series()
            .iter()
            .filter_map(|series| {
                let points: Vec<(f64, f64)> = series
                    .samples
                    .iter()
                    .filter(|s| {
                        let keep = drawable(s.x);
                        if !keep {
                            dropped += 1;
                        }
                        keep
                    })
                    .map(|s| (s.x as f64, s.value))
                    .collect();
                (!points.is_empty()).then(|| ChartLine {
                    label: series.label.clone(),
                    points,
                })
            })
            .collect();

        if dropped > 0 {
            tracing::warn!(dropped, "samples at x = 0 cannot be drawn on a log axis");
        }
        if lines.is_empty() {
            return Err(RenderError::NoData);
        }

        let ticks: Vec<u64> = store.x_union().into_iter().filter(|&x| drawable(x)).collect();
        let (width, height) = schema.sizing.dimensions(store.max_points());

        Ok(Self {
            title: schema.title.clone(),
            x_label: schema.x_label.clone(),
            y_label: schema.y_label.clone(),
            x_scale: schema.x_scale,
            width,
            height,
            ticks,
            lines,
            footnote: schema.footnote.clone(),
        })
    }

    /// Map a data x value onto the drawn axis.
    pub fn axis_x(&self, x: f64) -> f64 {
        match self.x_scale {
            AxisScale::Linear => x,
            AxisScale::Log2 => x.log2(),
        }
    }

    /// Padded x range in axis units.
    pub fn x_range(&self) -> (f64, f64) {
        let xs = self
            .lines
            .iter()
            .flat_map(|l| l.points.iter().map(|&(x, _)| self.axis_x(x)));
        let (lo, hi) = min_max(xs);
        pad(lo, hi, 0.05)
    }

    /// Padded y range; always includes zero.
    pub fn y_range(&self) -> (f64, f64) {
        let (lo, hi) = min_max(self.lines.iter().flat_map(|l| l.points.iter().map(|&(_, y)| y)));
        pad(lo.min(0.0), hi.max(0.0), 0.1)
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn pad(lo: f64, hi: f64, frac: f64) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let span = hi - lo;
    if span <= f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    (lo - span * frac, hi + span * frac)
}

/// Render the chart for `store` into `output_dir` and return the PNG path.
pub fn render(
    schema: &MetricSchema,
    store: &MetricsStore,
    output_dir: &Path,
) -> Result<PathBuf, RenderError> {
    let request = ChartRequest::from_store(schema, store)?;

    std::fs::create_dir_all(output_dir).map_err(|e| RenderError::Io {
        path: output_dir.to_path_buf(),
        source: e,
    })?;
    let path = output_dir.join(&schema.chart_file);

    draw(&request, &path).map_err(|e| RenderError::Draw(e.to_string()))?;
    tracing::info!(
        path = %path.display(),
        lines = request.lines.len(),
        width = request.width,
        height = request.height,
        "chart written"
    );
    Ok(path)
}

/// `WithKeyPoints<RangedCoordf64>` with `DefaultFormatting`, so plotters'
/// mesh accepts it; labels come from `x_label_formatter`.
struct KeyPointAxis(plotters::coord::combinators::WithKeyPoints<plotters::coord::types::RangedCoordf64>);

impl Ranged for KeyPointAxis {
    type ValueType = f64;
    type FormatOption = plotters::coord::ranged1d::DefaultFormatting;

    fn range(&self) -> std::ops::Range<f64> {
        self.0.range()
    }

    fn map(&self, value: &f64, limit: (i32, i32)) -> i32 {
        self.0.map(value, limit)
    }

    fn key_points<Hint: plotters::coord::ranged1d::KeyPointHint>(&self, hint: Hint) -> Vec<f64> {
        self.0.key_points(hint)
    }

    fn axis_pixel_range(&self, limit: (i32, i32)) -> std::ops::Range<i32> {
        self.0.axis_pixel_range(limit)
    }
}

fn draw(request: &ChartRequest, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (request.width, request.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let (x_lo, x_hi) = request.x_range();
    let (y_lo, y_hi) = request.y_range();
    let key_points: Vec<f64> = request
        .ticks
        .iter()
        .map(|&t| request.axis_x(t as f64))
        .collect();
    let scale = request.x_scale;

    let mut chart = ChartBuilder::on(&root)
        .caption(&request.title, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(
            KeyPointAxis(plotters::coord::types::RangedCoordf64::from(x_lo..x_hi).with_key_points(key_points)),
            y_lo..y_hi,
        )?;

    chart
        .configure_mesh()
        .x_desc(request.x_label.as_str())
        .y_desc(request.y_label.as_str())
        .x_label_formatter(&|v| match scale {
            AxisScale::Linear => format!("{v:.0}"),
            AxisScale::Log2 => format!("{:.0}", v.exp2()),
        })
        .draw()?;

    for (idx, line) in request.lines.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        let points: Vec<(f64, f64)> = line
            .points
            .iter()
            .map(|&(x, y)| (request.axis_x(x), y))
            .collect();

        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?
            .label(line.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 4, color.filled())))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    if let Some(note) = &request.footnote {
        let y = i32::try_from(request.height).unwrap_or(i32::MAX) - 20;
        root.draw(&Text::new(
            note.as_str(),
            (10, y),
            ("sans-serif", 14).into_font(),
        ))?;
    }

    root.present()?;
    Ok(())
}
