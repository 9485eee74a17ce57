use crate::config::OutputFormat;
use crate::error::{DashResult, DashboardError};
use crate::ir::ChartJob;
use image::ImageEncoder;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::fmt::Display;

/// Draw one chart job as a single-series bar chart.
///
/// Returns the encoded PNG, or the SVG document as UTF-8 bytes.
pub fn render_chart(job: &ChartJob, format: OutputFormat) -> DashResult<Vec<u8>> {
    if job.x_categories.len() != job.y_values.len() {
        return Err(DashboardError::Render {
            chart: job.element_id.clone(),
            reason: format!(
                "categories and values differ in length (categories: {}, values: {})",
                job.x_categories.len(),
                job.y_values.len()
            ),
        });
    }
    if job.x_categories.is_empty() {
        return Err(DashboardError::Render {
            chart: job.element_id.clone(),
            reason: "no categories to draw".to_string(),
        });
    }

    match format {
        OutputFormat::Svg => render_svg(job),
        OutputFormat::Png => render_png(job),
    }
}

fn render_svg(job: &ChartJob) -> DashResult<Vec<u8>> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (job.width, job.height)).into_drawing_area();
        draw_bars(&root, job)?;
    }
    Ok(svg.into_bytes())
}

fn render_png(job: &ChartJob) -> DashResult<Vec<u8>> {
    let mut buffer = vec![0u8; (job.width as usize) * (job.height as usize) * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (job.width, job.height))
            .into_drawing_area();
        draw_bars(&root, job)?;
    }

    let mut png_bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png_bytes)
        .write_image(&buffer, job.width, job.height, image::ColorType::Rgb8)
        .map_err(|e| render_error(job, e))?;
    Ok(png_bytes)
}

fn draw_bars<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, job: &ChartJob) -> DashResult<()> {
    root.fill(&WHITE).map_err(|e| render_error(job, e))?;

    let num_categories = job.x_categories.len();
    let y_range = value_range(&job.y_values);
    let padding_right = i32::try_from(job.layout.padding_right).unwrap_or(i32::MAX);

    let mut chart = ChartBuilder::on(root)
        .margin(10)
        .margin_right(padding_right)
        .caption(&job.title, ("sans-serif", f64::from(job.layout.title_size)))
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0..(num_categories as f64), y_range)
        .map_err(|e| render_error(job, e))?;

    let categories = &job.x_categories;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(num_categories)
        .x_label_formatter(&|x| {
            let idx = *x as usize;
            if idx < categories.len() {
                categories[idx].clone()
            } else {
                String::new()
            }
        })
        .draw()
        .map_err(|e| render_error(job, e))?;

    let bar_width = 0.8;
    chart
        .draw_series(job.y_values.iter().enumerate().map(|(idx, &y)| {
            let x_center = idx as f64 + 0.5;
            Rectangle::new(
                [
                    (x_center - bar_width / 2.0, 0.0),
                    (x_center + bar_width / 2.0, y),
                ],
                BLUE.mix(0.8).filled(),
            )
        }))
        .map_err(|e| render_error(job, e))?;

    root.present().map_err(|e| render_error(job, e))?;
    Ok(())
}

/// Y range that always includes zero, with 5% headroom.
fn value_range(values: &[f64]) -> std::ops::Range<f64> {
    let min = values.iter().copied().fold(0.0, f64::min);
    let max = values.iter().copied().fold(0.0, f64::max);
    if min == max {
        return min..(max + 1.0);
    }
    let padding = (max - min) * 0.05;
    let low = if min < 0.0 { min - padding } else { 0.0 };
    low..(max + padding)
}

fn render_error(job: &ChartJob, e: impl Display) -> DashboardError {
    DashboardError::Render {
        chart: job.element_id.clone(),
        reason: e.to_string(),
    }
}
