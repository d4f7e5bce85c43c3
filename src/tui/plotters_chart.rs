//! Plotters-powered result chart widget for Ratatui.
//!
//! Observations are drawn as dots, the fitted output as a line, both clipped
//! to the current axis viewport. Plotters output goes into the Ratatui buffer
//! through `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

use crate::session::bounds::Viewport;

/// Render-only description of one result plot.
pub struct ResultChart<'a> {
    pub observations: &'a [(f64, f64)],
    pub output: &'a [(f64, f64)],
    pub viewport: Viewport,
    pub x_label: &'a str,
    pub y_label: &'a str,
}

impl ResultChart<'_> {
    /// True when the viewport can be drawn (finite and non-empty on both axes).
    pub fn is_drawable(viewport: &Viewport) -> bool {
        let ok = |(lo, hi): (f64, f64)| lo.is_finite() && hi.is_finite() && hi > lo;
        ok(viewport.x) && ok(viewport.y)
    }
}

impl Widget for ResultChart<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters fails to lay out a chart in tiny areas.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        if !Self::is_drawable(&self.viewport) {
            buf.set_string(
                area.x,
                area.y,
                "Axis bounds are inverted.",
                Style::default().fg(Color::Red),
            );
            return;
        }

        let (x0, x1) = self.viewport.x;
        let (y0, y1) = self.viewport.y;

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc(self.x_label)
                .y_desc(self.y_label)
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| format!("{v:.0}"))
                .y_label_formatter(&|v| format!("{v:.1}"))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            let output_color = RGBColor(0, 255, 255);
            let observation_color = RGBColor(255, 200, 0);

            let in_view = |&(x, y): &(f64, f64)| x >= x0 && x <= x1 && y >= y0 && y <= y1;

            chart.draw_series(LineSeries::new(
                self.output.iter().copied().filter(|p| p.0 >= x0 && p.0 <= x1),
                &output_color,
            ))?;

            // `Circle` radii come out wrong through the ratatui backend; pixels read fine.
            chart.draw_series(
                self.observations
                    .iter()
                    .filter(|p| in_view(p))
                    .map(|&(x, y)| Pixel::new((x, y), observation_color)),
            )?;

            Ok(())
        });

        widget.render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_or_empty_viewport_is_not_drawable() {
        assert!(ResultChart::is_drawable(&Viewport::new((0.0, 1.0), (0.0, 1.0))));
        assert!(!ResultChart::is_drawable(&Viewport::new((5.0, 1.0), (0.0, 1.0))));
        assert!(!ResultChart::is_drawable(&Viewport::new((0.0, 1.0), (2.0, 2.0))));
    }

    #[test]
    fn tiny_area_renders_hint_instead_of_chart() {
        let area = Rect::new(0, 0, 60, 4);
        let mut buf = Buffer::empty(area);
        let chart = ResultChart {
            observations: &[(1.0, 1.0)],
            output: &[(0.0, 0.0), (2.0, 2.0)],
            viewport: Viewport::new((0.0, 2.0), (0.0, 2.0)),
            x_label: "year",
            y_label: "TU",
        };
        chart.render(area, &mut buf);
        let first_row: String = (0..area.width).map(|x| buf[(x, 0)].symbol().to_string()).collect();
        assert!(first_row.starts_with("Chart area too small"));
    }
}
