//! Paired lower/upper bound handling.
//!
//! Two flavors share the same shape:
//!
//! - [`BoundPair`]: a model parameter's search bounds. Only validated: an
//!   inverted pair raises a warning, nothing is clamped.
//! - [`AxisBounds`]: a plot axis. Validated, and each accepted edit moves the
//!   live [`Viewport`] and narrows the other control's allowed range.
//!
//! Allowed-range updates go through [`BoundControl::set_limits`], which never
//! counts as a value change, so a handler can never re-enter another handler.

use serde::{Deserialize, Serialize};

/// Warning text shown next to a model whose bounds are inverted.
pub const BOUNDS_WARNING: &str = "Set correct bounds";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundPair {
    lower: f64,
    upper: f64,
    valid: bool,
}

impl BoundPair {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            valid: lower <= upper,
        }
    }

    /// Accept a new lower value. Returns the resulting validity.
    pub fn on_lower_changed(&mut self, new_lower: f64) -> bool {
        self.lower = new_lower;
        self.valid = !(new_lower > self.upper);
        self.valid
    }

    /// Accept a new upper value. Returns the resulting validity.
    pub fn on_upper_changed(&mut self, new_upper: f64) -> bool {
        self.upper = new_upper;
        self.valid = !(self.lower > new_upper);
        self.valid
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// Displayed x/y ranges of the result plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl Viewport {
    pub fn new(x: (f64, f64), y: (f64, f64)) -> Self {
        Self { x, y }
    }

    pub fn range(&self, axis: Axis) -> (f64, f64) {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    fn range_mut(&mut self, axis: Axis) -> &mut (f64, f64) {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new((0.0, 1.0), (0.0, 1.0))
    }
}

/// A numeric input with an allowed range, like a spin box.
///
/// The allowed range is advisory: front-ends clamp their own step edits to
/// it, but values pushed through the propagator are stored as given so an
/// inverted pair can be reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundControl {
    value: f64,
    min_allowed: f64,
    max_allowed: f64,
    changes: u64,
}

impl BoundControl {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            min_allowed: f64::NEG_INFINITY,
            max_allowed: f64::INFINITY,
            changes: 0,
        }
    }

    fn set_value(&mut self, value: f64) {
        self.value = value;
        self.changes += 1;
    }

    /// Update the allowed range without producing a value change.
    pub fn set_limits(&mut self, min_allowed: f64, max_allowed: f64) {
        self.min_allowed = min_allowed;
        self.max_allowed = max_allowed;
    }

    /// Where a step edit of `delta` would land, clamped to the allowed range.
    pub fn stepped(&self, delta: f64) -> f64 {
        let target = self.value + delta;
        if self.min_allowed <= self.max_allowed {
            target.clamp(self.min_allowed, self.max_allowed)
        } else {
            target
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn min_allowed(&self) -> f64 {
        self.min_allowed
    }

    pub fn max_allowed(&self) -> f64 {
        self.max_allowed
    }

    /// Number of value changes this control has seen.
    pub fn change_count(&self) -> u64 {
        self.changes
    }
}

/// What an axis handler did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisUpdate {
    pub viewport_changed: bool,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    axis: Axis,
    lower: BoundControl,
    upper: BoundControl,
    valid: bool,
}

impl AxisBounds {
    fn new(axis: Axis, (lo, hi): (f64, f64)) -> Self {
        let mut bounds = Self {
            axis,
            lower: BoundControl::new(lo),
            upper: BoundControl::new(hi),
            valid: lo <= hi,
        };
        bounds.lower.set_limits(f64::NEG_INFINITY, hi);
        bounds.upper.set_limits(lo, f64::INFINITY);
        bounds
    }

    fn on_lower_changed(&mut self, new_lower: f64, viewport: &mut Viewport) -> AxisUpdate {
        self.lower.set_value(new_lower);

        let (_, prior_hi) = viewport.range(self.axis);
        let viewport_changed = new_lower < prior_hi;
        if viewport_changed {
            viewport.range_mut(self.axis).0 = new_lower;
        }

        self.upper.set_limits(new_lower, self.upper.max_allowed);
        self.lower.set_limits(self.lower.min_allowed, prior_hi);

        self.valid = !(new_lower > self.upper.value);
        AxisUpdate {
            viewport_changed,
            valid: self.valid,
        }
    }

    fn on_upper_changed(&mut self, new_upper: f64, viewport: &mut Viewport) -> AxisUpdate {
        self.upper.set_value(new_upper);

        let (prior_lo, _) = viewport.range(self.axis);
        let viewport_changed = new_upper > prior_lo;
        if viewport_changed {
            viewport.range_mut(self.axis).1 = new_upper;
        }

        self.upper.set_limits(prior_lo, self.upper.max_allowed);
        self.lower.set_limits(self.lower.min_allowed, new_upper);

        self.valid = !(self.lower.value > new_upper);
        AxisUpdate {
            viewport_changed,
            valid: self.valid,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn lower(&self) -> &BoundControl {
        &self.lower
    }

    pub fn upper(&self) -> &BoundControl {
        &self.upper
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Both plot axes plus the viewport they drive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotBounds {
    viewport: Viewport,
    x: AxisBounds,
    y: AxisBounds,
}

impl PlotBounds {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            x: AxisBounds::new(Axis::X, viewport.x),
            y: AxisBounds::new(Axis::Y, viewport.y),
        }
    }

    /// Replace the viewport (a freshly drawn plot) and reopen the controls'
    /// allowed ranges. Control values are left for the caller to push
    /// through the handlers.
    pub fn reset_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        for axis in [&mut self.x, &mut self.y] {
            axis.lower.set_limits(f64::NEG_INFINITY, f64::INFINITY);
            axis.upper.set_limits(f64::NEG_INFINITY, f64::INFINITY);
        }
    }

    pub fn on_lower_changed(&mut self, axis: Axis, new_lower: f64) -> AxisUpdate {
        let update = match axis {
            Axis::X => self.x.on_lower_changed(new_lower, &mut self.viewport),
            Axis::Y => self.y.on_lower_changed(new_lower, &mut self.viewport),
        };
        tracing::trace!(?axis, new_lower, ?update, "axis lower changed");
        update
    }

    pub fn on_upper_changed(&mut self, axis: Axis, new_upper: f64) -> AxisUpdate {
        let update = match axis {
            Axis::X => self.x.on_upper_changed(new_upper, &mut self.viewport),
            Axis::Y => self.y.on_upper_changed(new_upper, &mut self.viewport),
        };
        tracing::trace!(?axis, new_upper, ?update, "axis upper changed");
        update
    }

    pub fn axis(&self, axis: Axis) -> &AxisBounds {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn is_valid(&self) -> bool {
        self.x.valid && self.y.valid
    }
}

impl Default for PlotBounds {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_pair_only_flags_inverted_bounds() {
        let mut pair = BoundPair::new(1.0, 100.0);
        assert!(pair.is_valid());

        assert!(!pair.on_lower_changed(150.0));
        assert_eq!(pair.as_tuple(), (150.0, 100.0));

        assert!(pair.on_upper_changed(200.0));
        assert!(pair.is_valid());

        assert!(!pair.on_upper_changed(149.0));
        assert!(pair.on_lower_changed(149.0));
    }

    #[test]
    fn lower_edit_moves_viewport_and_narrows_upper() {
        let mut plot = PlotBounds::new(Viewport::new((0.0, 10.0), (0.0, 1.0)));
        let upper_changes = plot.axis(Axis::X).upper().change_count();

        let update = plot.on_lower_changed(Axis::X, 5.0);

        assert!(update.viewport_changed && update.valid);
        assert_eq!(plot.viewport().x, (5.0, 10.0));
        let x = plot.axis(Axis::X);
        assert_eq!(x.upper().min_allowed(), 5.0);
        assert_eq!(x.lower().max_allowed(), 10.0);
        assert_eq!(x.upper().change_count(), upper_changes);
        assert_eq!(x.upper().value(), 10.0);
    }

    #[test]
    fn lower_past_upper_warns_and_keeps_viewport() {
        let mut plot = PlotBounds::new(Viewport::new((0.0, 10.0), (0.0, 1.0)));
        plot.on_lower_changed(Axis::X, 5.0);

        let update = plot.on_lower_changed(Axis::X, 12.0);

        assert!(!update.viewport_changed);
        assert!(!update.valid);
        assert!(!plot.is_valid());
        assert_eq!(plot.viewport().x, (5.0, 10.0));
    }

    #[test]
    fn upper_edit_uses_prior_viewport_for_limits() {
        let mut plot = PlotBounds::new(Viewport::new((0.0, 1.0), (2.0, 8.0)));

        let update = plot.on_upper_changed(Axis::Y, 6.0);

        assert!(update.viewport_changed);
        assert_eq!(plot.viewport().y, (2.0, 6.0));
        let y = plot.axis(Axis::Y);
        assert_eq!(y.upper().min_allowed(), 2.0);
        assert_eq!(y.lower().max_allowed(), 6.0);
        assert_eq!(y.lower().change_count(), 0);
        // X axis untouched.
        assert_eq!(plot.viewport().x, (0.0, 1.0));
    }

    #[test]
    fn upper_below_viewport_lower_is_not_applied() {
        let mut plot = PlotBounds::new(Viewport::new((4.0, 10.0), (0.0, 1.0)));
        let update = plot.on_upper_changed(Axis::X, 3.0);
        assert!(!update.viewport_changed);
        assert!(!update.valid);
        assert_eq!(plot.viewport().x, (4.0, 10.0));
    }

    #[test]
    fn stepped_edits_respect_allowed_range() {
        let mut plot = PlotBounds::new(Viewport::new((0.0, 10.0), (0.0, 1.0)));
        plot.on_lower_changed(Axis::X, 5.0);
        let x = plot.axis(Axis::X);
        assert_eq!(x.lower().stepped(100.0), 10.0);
        assert_eq!(x.upper().stepped(-100.0), 5.0);
    }
}
