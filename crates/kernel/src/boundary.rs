//! Boundary configuration: per-axis boundary types, domain range and the
//! particle spacing used to place walls.
//!
//! Walls sit half a *local* particle spacing outside the nominal domain
//! edge, so each side carries its own spacing. A single shared spacing puts
//! the wall in the wrong place whenever the particle density differs across
//! the domain (e.g. on either side of a shock).
//!
//! Validation happens once, before any step runs. Nothing is clamped or
//! replaced by a default.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Velocity treatment at a reflective wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorKind {
    /// Flip only the velocity component normal to the wall.
    FreeSlip,
    /// Flip every velocity component.
    NoSlip,
}

/// Boundary type of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    /// No boundary handling on this axis.
    None,
    /// The domain wraps around.
    Periodic,
    /// Reflective wall.
    Mirror(MirrorKind),
    /// Reserved for non-reflecting outflow. Always rejected by validation.
    Open,
}

/// Lower or upper side of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The `range_min` side.
    Lower,
    /// The `range_max` side.
    Upper,
}

impl Side {
    /// Both sides, lower first.
    pub const BOTH: [Side; 2] = [Side::Lower, Side::Upper];
}

/// Boundary settings for a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBoundary {
    /// Boundary type.
    pub kind: BoundaryKind,
    /// Lower edge of the domain.
    #[serde(default)]
    pub range_min: f64,
    /// Upper edge of the domain.
    #[serde(default)]
    pub range_max: f64,
    /// Whether the lower side generates ghosts.
    #[serde(default)]
    pub enable_lower: bool,
    /// Whether the upper side generates ghosts.
    #[serde(default)]
    pub enable_upper: bool,
    /// Particle spacing next to the lower wall.
    #[serde(default)]
    pub spacing_lower: f64,
    /// Particle spacing next to the upper wall.
    #[serde(default)]
    pub spacing_upper: f64,
}

impl AxisBoundary {
    /// An axis without boundary handling.
    pub const NONE: AxisBoundary = AxisBoundary {
        kind: BoundaryKind::None,
        range_min: 0.0,
        range_max: 0.0,
        enable_lower: false,
        enable_upper: false,
        spacing_lower: 0.0,
        spacing_upper: 0.0,
    };

    /// Return `true` if this axis has a boundary type other than `None`.
    pub fn is_active(&self) -> bool {
        self.kind != BoundaryKind::None
    }

    /// Whether `side` generates ghosts.
    pub fn is_enabled(&self, side: Side) -> bool {
        self.is_active()
            && match side {
                Side::Lower => self.enable_lower,
                Side::Upper => self.enable_upper,
            }
    }

    /// Spacing configured for `side`.
    pub fn spacing(&self, side: Side) -> f64 {
        match side {
            Side::Lower => self.spacing_lower,
            Side::Upper => self.spacing_upper,
        }
    }

    /// Wall position on `side`, offset from the domain edge by half that
    /// side's spacing.
    pub fn wall_position(&self, side: Side) -> f64 {
        match side {
            Side::Lower => self.range_min - 0.5 * self.spacing_lower,
            Side::Upper => self.range_max + 0.5 * self.spacing_upper,
        }
    }

    /// Plane ghosts on `side` are selected against: the wall for mirror
    /// axes, the domain edge itself for periodic ones.
    pub fn ghost_seam(&self, side: Side) -> f64 {
        match (self.kind, side) {
            (BoundaryKind::Periodic, Side::Lower) => self.range_min,
            (BoundaryKind::Periodic, Side::Upper) => self.range_max,
            _ => self.wall_position(side),
        }
    }

    /// Domain extent `range_max - range_min`.
    pub fn extent(&self) -> f64 {
        self.range_max - self.range_min
    }

    /// Check this axis; `axis` only labels error messages.
    pub fn validate(&self, axis: usize) -> Result<()> {
        match self.kind {
            BoundaryKind::None => return Ok(()),
            BoundaryKind::Open => {
                return Err(KernelError::config(format!(
                    "axis {axis}: open boundaries are reserved and not supported"
                )));
            }
            BoundaryKind::Periodic => {
                if !(self.enable_lower && self.enable_upper) {
                    return Err(KernelError::config(format!(
                        "axis {axis}: periodic boundaries must be paired (enable both sides)"
                    )));
                }
            }
            BoundaryKind::Mirror(_) => {}
        }

        if !(self.range_min.is_finite() && self.range_max.is_finite()) {
            return Err(KernelError::config(format!(
                "axis {axis}: range must be finite, got [{}, {}]",
                self.range_min, self.range_max
            )));
        }
        if self.range_min >= self.range_max {
            return Err(KernelError::config(format!(
                "axis {axis}: range_min ({}) must be less than range_max ({})",
                self.range_min, self.range_max
            )));
        }
        // Spacing only places mirror walls.
        if self.kind == BoundaryKind::Periodic {
            return Ok(());
        }
        for side in Side::BOTH {
            if !self.is_enabled(side) {
                continue;
            }
            let spacing = self.spacing(side);
            if !(spacing.is_finite() && spacing > 0.0) {
                return Err(KernelError::config(format!(
                    "axis {axis}: {side:?} spacing must be positive, got {spacing}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for AxisBoundary {
    fn default() -> Self {
        Self::NONE
    }
}

/// Boundary configuration for all `D` axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryConfig<const D: usize> {
    axes: [AxisBoundary; D],
}

impl<const D: usize> BoundaryConfig<D> {
    /// Validate and wrap per-axis settings.
    pub fn new(axes: [AxisBoundary; D]) -> Result<Self> {
        let config = Self { axes };
        config.validate()?;
        Ok(config)
    }

    /// A configuration with no active boundary on any axis.
    pub fn none() -> Self {
        Self {
            axes: [AxisBoundary::NONE; D],
        }
    }

    /// Check every axis. See [`AxisBoundary`] for the rules.
    pub fn validate(&self) -> Result<()> {
        for (axis, boundary) in self.axes.iter().enumerate() {
            boundary.validate(axis)?;
        }
        Ok(())
    }

    /// Settings of `axis`, or `None` if `axis >= D`.
    pub fn axis(&self, axis: usize) -> Option<&AxisBoundary> {
        self.axes.get(axis)
    }

    /// All axes.
    pub fn axes(&self) -> &[AxisBoundary; D] {
        &self.axes
    }

    /// Return `true` if any side of any axis generates ghosts.
    pub fn has_active_sides(&self) -> bool {
        self.axes
            .iter()
            .any(|a| a.is_enabled(Side::Lower) || a.is_enabled(Side::Upper))
    }

    /// Wall position of `side` on `axis`.
    ///
    /// # Panics
    ///
    /// Panics if `axis >= D`.
    pub fn wall_position(&self, axis: usize, side: Side) -> f64 {
        self.axes[axis].wall_position(side)
    }

    /// Copy with every periodic axis switched to `None`, for searches that
    /// resolve periodicity by minimum image instead of ghosts.
    pub fn without_periodic(&self) -> Self {
        let mut axes = self.axes;
        for axis in &mut axes {
            if axis.kind == BoundaryKind::Periodic {
                *axis = AxisBoundary::NONE;
            }
        }
        Self { axes }
    }

    /// Periodic wrap description, if any axis is periodic.
    pub fn periodic_domain(&self) -> Option<PeriodicDomain<D>> {
        if !self.axes.iter().any(|a| a.kind == BoundaryKind::Periodic) {
            return None;
        }
        let mut min = [0.0; D];
        let mut max = [0.0; D];
        let mut periodic = [false; D];
        for (d, axis) in self.axes.iter().enumerate() {
            if axis.kind == BoundaryKind::Periodic {
                min[d] = axis.range_min;
                max[d] = axis.range_max;
                periodic[d] = true;
            }
        }
        Some(PeriodicDomain { min, max, periodic })
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Fluent construction of a [`BoundaryConfig`].
///
/// ```
/// use kernel::boundary::{BoundaryBuilder, MirrorKind};
///
/// let config = BoundaryBuilder::<1>::new()
///     .mirror_all(MirrorKind::FreeSlip)
///     .range([-0.5], [1.5])
///     .spacing_in(0, 0.0025, 0.02)
///     .build()?;
/// assert!((config.wall_position(0, kernel::boundary::Side::Lower) + 0.50125).abs() < 1e-12);
/// # Ok::<(), kernel::KernelError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BoundaryBuilder<const D: usize> {
    axes: [AxisBoundary; D],
    range_set: [bool; D],
    error: Option<KernelError>,
}

impl<const D: usize> BoundaryBuilder<D> {
    /// Start with no boundaries.
    pub fn new() -> Self {
        Self {
            axes: [AxisBoundary::NONE; D],
            range_set: [false; D],
            error: None,
        }
    }

    fn with_axis(mut self, axis: usize, f: impl FnOnce(&mut AxisBoundary)) -> Self {
        if axis >= D {
            if self.error.is_none() {
                self.error = Some(KernelError::config(format!(
                    "axis {axis} out of range for a {D}-dimensional domain"
                )));
            }
            return self;
        }
        f(&mut self.axes[axis]);
        self
    }

    fn set_kind(axis: &mut AxisBoundary, kind: BoundaryKind) {
        axis.kind = kind;
        let enabled = kind != BoundaryKind::None;
        axis.enable_lower = enabled;
        axis.enable_upper = enabled;
    }

    /// Periodic boundaries on every axis.
    pub fn periodic_all(mut self) -> Self {
        for axis in &mut self.axes {
            Self::set_kind(axis, BoundaryKind::Periodic);
        }
        self
    }

    /// Periodic boundary on `axis`.
    pub fn periodic_in(self, axis: usize) -> Self {
        self.with_axis(axis, |a| Self::set_kind(a, BoundaryKind::Periodic))
    }

    /// Mirror walls on every axis.
    pub fn mirror_all(mut self, kind: MirrorKind) -> Self {
        for axis in &mut self.axes {
            Self::set_kind(axis, BoundaryKind::Mirror(kind));
        }
        self
    }

    /// Mirror walls on `axis`.
    pub fn mirror_in(self, axis: usize, kind: MirrorKind) -> Self {
        self.with_axis(axis, |a| Self::set_kind(a, BoundaryKind::Mirror(kind)))
    }

    /// Reserved outflow boundary on `axis`; `build` will reject it.
    pub fn open_in(self, axis: usize) -> Self {
        self.with_axis(axis, |a| Self::set_kind(a, BoundaryKind::Open))
    }

    /// Remove any boundary from `axis`.
    pub fn none_in(self, axis: usize) -> Self {
        self.with_axis(axis, |a| Self::set_kind(a, BoundaryKind::None))
    }

    /// Same spacing on every side of every axis.
    pub fn uniform_spacing(mut self, spacing: f64) -> Self {
        for axis in &mut self.axes {
            axis.spacing_lower = spacing;
            axis.spacing_upper = spacing;
        }
        self
    }

    /// Per-side spacing on `axis`.
    pub fn spacing_in(self, axis: usize, lower: f64, upper: f64) -> Self {
        self.with_axis(axis, |a| {
            a.spacing_lower = lower;
            a.spacing_upper = upper;
        })
    }

    /// Domain range on every axis.
    pub fn range(mut self, min: [f64; D], max: [f64; D]) -> Self {
        for d in 0..D {
            self.axes[d].range_min = min[d];
            self.axes[d].range_max = max[d];
            self.range_set[d] = true;
        }
        self
    }

    /// Domain range on `axis`.
    pub fn range_in(mut self, axis: usize, min: f64, max: f64) -> Self {
        if axis < D {
            self.range_set[axis] = true;
        }
        self.with_axis(axis, |a| {
            a.range_min = min;
            a.range_max = max;
        })
    }

    /// Stop generating ghosts on the lower side of `axis`.
    pub fn disable_lower(self, axis: usize) -> Self {
        self.with_axis(axis, |a| a.enable_lower = false)
    }

    /// Stop generating ghosts on the upper side of `axis`.
    pub fn disable_upper(self, axis: usize) -> Self {
        self.with_axis(axis, |a| a.enable_upper = false)
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<BoundaryConfig<D>> {
        if let Some(err) = self.error {
            return Err(err);
        }
        for (d, axis) in self.axes.iter().enumerate() {
            if axis.is_active() && !self.range_set[d] {
                return Err(KernelError::config(format!(
                    "axis {d}: range must be set before building"
                )));
            }
        }
        BoundaryConfig::new(self.axes)
    }
}

impl<const D: usize> Default for BoundaryBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Periodic wrap
// ---------------------------------------------------------------------------

/// Wrap-around geometry of the periodic axes of a domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicDomain<const D: usize> {
    min: [f64; D],
    max: [f64; D],
    periodic: [bool; D],
}

impl<const D: usize> PeriodicDomain<D> {
    /// Whether `axis` wraps.
    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    /// Period of `axis` (zero on non-periodic axes).
    pub fn extent(&self, axis: usize) -> f64 {
        if self.periodic[axis] {
            self.max[axis] - self.min[axis]
        } else {
            0.0
        }
    }

    /// Minimum-image displacement `a - b`.
    pub fn displacement(&self, a: &[f64; D], b: &[f64; D]) -> [f64; D] {
        let mut r = [0.0; D];
        for d in 0..D {
            let mut delta = a[d] - b[d];
            if self.periodic[d] {
                let period = self.extent(d);
                if delta > 0.5 * period {
                    delta -= period;
                } else if delta < -0.5 * period {
                    delta += period;
                }
            }
            r[d] = delta;
        }
        r
    }

    /// Map a position back into the domain on periodic axes.
    pub fn wrap(&self, mut position: [f64; D]) -> [f64; D] {
        for d in 0..D {
            if !self.periodic[d] {
                continue;
            }
            let x = position[d];
            if x < self.min[d] || x > self.max[d] {
                position[d] = self.min[d] + (x - self.min[d]).rem_euclid(self.extent(d));
            }
        }
        position
    }

    /// Squared distance from `point` to the box `[lower, upper]`, taking the
    /// nearest periodic image on wrapping axes.
    pub fn box_gap_squared(&self, point: &[f64; D], lower: &[f64; D], upper: &[f64; D]) -> f64 {
        let mut sum = 0.0;
        for d in 0..D {
            let mut gap = axis_gap(point[d], lower[d], upper[d]);
            if self.periodic[d] {
                let period = self.extent(d);
                gap = gap
                    .min(axis_gap(point[d] + period, lower[d], upper[d]))
                    .min(axis_gap(point[d] - period, lower[d], upper[d]));
            }
            sum += gap * gap;
        }
        sum
    }
}

/// Distance from `p` to the interval `[lo, hi]` (zero inside).
#[inline]
pub(crate) fn axis_gap(p: f64, lo: f64, hi: f64) -> f64 {
    (lo - p).max(p - hi).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror_axis(min: f64, max: f64, lower: f64, upper: f64) -> AxisBoundary {
        AxisBoundary {
            kind: BoundaryKind::Mirror(MirrorKind::FreeSlip),
            range_min: min,
            range_max: max,
            enable_lower: true,
            enable_upper: true,
            spacing_lower: lower,
            spacing_upper: upper,
        }
    }

    #[test]
    fn asymmetric_wall_positions() {
        let config = BoundaryConfig::new([mirror_axis(-0.5, 1.5, 0.0025, 0.02)]).unwrap();
        let lower = config.wall_position(0, Side::Lower);
        let upper = config.wall_position(0, Side::Upper);
        assert!((lower - (-0.50125)).abs() < 1e-12, "lower wall {lower}");
        assert!((upper - 1.51).abs() < 1e-12, "upper wall {upper}");
        // The uniform-spacing value must not appear.
        assert!((lower - (-0.51)).abs() > 1e-3);
    }

    #[test]
    fn rejects_inverted_range() {
        let err = BoundaryConfig::new([mirror_axis(1.0, 0.0, 0.1, 0.1)]).unwrap_err();
        assert!(matches!(err, KernelError::Configuration(_)));
    }

    #[test]
    fn rejects_equal_range() {
        assert!(BoundaryConfig::new([mirror_axis(1.0, 1.0, 0.1, 0.1)]).is_err());
    }

    #[test]
    fn rejects_non_positive_spacing_on_enabled_side() {
        assert!(BoundaryConfig::new([mirror_axis(0.0, 1.0, 0.0, 0.1)]).is_err());
        assert!(BoundaryConfig::new([mirror_axis(0.0, 1.0, 0.1, -0.1)]).is_err());

        // A disabled side does not need a spacing.
        let mut axis = mirror_axis(0.0, 1.0, 0.1, 0.0);
        axis.enable_upper = false;
        assert!(BoundaryConfig::new([axis]).is_ok());
    }

    #[test]
    fn rejects_open_boundary() {
        let mut axis = mirror_axis(0.0, 1.0, 0.1, 0.1);
        axis.kind = BoundaryKind::Open;
        let err = BoundaryConfig::new([axis]).unwrap_err();
        assert!(err.to_string().contains("open"), "{err}");
    }

    #[test]
    fn rejects_unpaired_periodic_axis() {
        let mut axis = mirror_axis(0.0, 1.0, 0.1, 0.1);
        axis.kind = BoundaryKind::Periodic;
        axis.enable_upper = false;
        assert!(BoundaryConfig::new([axis]).is_err());
    }

    #[test]
    fn none_axis_is_not_validated() {
        let config = BoundaryConfig::<3>::none();
        assert!(config.validate().is_ok());
        assert!(!config.has_active_sides());
        assert!(config.periodic_domain().is_none());
    }

    #[test]
    fn builder_requires_range() {
        let err = BoundaryBuilder::<2>::new()
            .mirror_in(1, MirrorKind::NoSlip)
            .uniform_spacing(0.1)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("range"), "{err}");
    }

    #[test]
    fn builder_rejects_axis_out_of_range() {
        let result = BoundaryBuilder::<2>::new().periodic_in(2).build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_open() {
        let result = BoundaryBuilder::<1>::new()
            .open_in(0)
            .range([0.0], [1.0])
            .uniform_spacing(0.1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_one_sided_wall() {
        let config = BoundaryBuilder::<2>::new()
            .mirror_in(1, MirrorKind::FreeSlip)
            .range_in(1, 0.0, 1.0)
            .spacing_in(1, 0.1, 0.1)
            .disable_upper(1)
            .build()
            .unwrap();
        assert!(config.axis(1).unwrap().is_enabled(Side::Lower));
        assert!(!config.axis(1).unwrap().is_enabled(Side::Upper));
        assert!(!config.axis(0).unwrap().is_active());
        assert!(config.axis(2).is_none());
    }

    #[test]
    fn periodic_axis_needs_no_spacing() {
        let config = BoundaryBuilder::<1>::new()
            .periodic_all()
            .range([0.0], [1.0])
            .build()
            .unwrap();
        let axis = config.axis(0).unwrap();
        assert_eq!(axis.spacing(Side::Lower), 0.0);
        assert_eq!(axis.ghost_seam(Side::Lower), 0.0);
        assert_eq!(axis.ghost_seam(Side::Upper), 1.0);
    }

    #[test]
    fn periodic_seam_ignores_spacing() {
        let config = BoundaryBuilder::<2>::new()
            .periodic_in(0)
            .mirror_in(1, MirrorKind::FreeSlip)
            .range([0.0, 0.0], [1.0, 1.0])
            .uniform_spacing(0.1)
            .build()
            .unwrap();
        let periodic = config.axis(0).unwrap();
        assert_eq!(periodic.ghost_seam(Side::Lower), 0.0);
        assert_eq!(periodic.ghost_seam(Side::Upper), 1.0);
        let mirror = config.axis(1).unwrap();
        assert!((mirror.ghost_seam(Side::Lower) + 0.05).abs() < 1e-12);
        assert!((mirror.ghost_seam(Side::Upper) - 1.05).abs() < 1e-12);
    }

    #[test]
    fn periodic_displacement_uses_minimum_image() {
        let config = BoundaryBuilder::<1>::new()
            .periodic_all()
            .range([0.0], [1.0])
            .uniform_spacing(0.1)
            .build()
            .unwrap();
        let domain = config.periodic_domain().unwrap();
        let r = domain.displacement(&[0.05], &[0.95]);
        assert!((r[0] - 0.1).abs() < 1e-12);
        let wrapped = domain.wrap([1.25]);
        assert!((wrapped[0] - 0.25).abs() < 1e-12);
        let wrapped = domain.wrap([-0.25]);
        assert!((wrapped[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn periodic_box_gap_sees_wrapped_image() {
        let config = BoundaryBuilder::<1>::new()
            .periodic_all()
            .range([0.0], [1.0])
            .uniform_spacing(0.1)
            .build()
            .unwrap();
        let domain = config.periodic_domain().unwrap();
        // Point near x=0 is 0.1 away from a box at [0.85, 0.95] through the wrap.
        let gap2 = domain.box_gap_squared(&[0.05], &[0.85], &[0.95]);
        assert!((gap2 - 0.01).abs() < 1e-12, "gap^2 = {gap2}");
    }
}
