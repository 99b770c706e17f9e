use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MAX_RADIUS_KM, MIN_RADIUS_KM};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeoError {
    #[error("invalid coordinate: lat={0}, lng={1}")]
    InvalidCoordinate(f64, f64),
    #[error("invalid radius: {0} km")]
    InvalidRadius(f64),
}

/// Validated lat/lng, NaN-safe.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeoError> {
        if !lat.is_finite()
            || !lng.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lng)
        {
            return Err(GeoError::InvalidCoordinate(lat, lng));
        }
        Ok(Self { lat, lng })
    }

    #[must_use]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub fn lng(&self) -> f64 {
        self.lng
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lng.to_bits() == other.lng.to_bits()
    }
}

impl Eq for Coordinate {}

/// Axis-aligned search rectangle. `from_corners` accepts the two picked
/// points in any diagonal order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn from_corners(a: Coordinate, b: Coordinate) -> Self {
        Self {
            south: a.lat.min(b.lat),
            west: a.lng.min(b.lng),
            north: a.lat.max(b.lat),
            east: a.lng.max(b.lng),
        }
    }
}

/// A committed search region: one picked center plus a radius, or two
/// picked corners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Region {
    Circle { center: Coordinate, radius_km: f64 },
    Box(BoundingBox),
}

impl Region {
    #[must_use]
    pub fn circle(center: Coordinate, radius_km: f64) -> Self {
        Self::Circle {
            center,
            radius_km: clamp_radius(radius_km),
        }
    }
}

#[must_use]
pub fn clamp_radius(radius_km: f64) -> f64 {
    if !radius_km.is_finite() {
        return MIN_RADIUS_KM;
    }
    radius_km.clamp(MIN_RADIUS_KM, MAX_RADIUS_KM)
}

/// Which pick flow a page runs: a single center click, or two corner
/// clicks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    Radius,
    BoundingBox,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
enum PickMode {
    Idle,
    AwaitingPoint,
    AwaitingSecondPoint { first: Coordinate },
}

/// What a captured click produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PickOutcome {
    /// Not in pick mode; the click is not ours.
    Ignored,
    /// First bounding-box corner fixed; awaiting the opposite one.
    FirstCorner(Coordinate),
    /// Radius-center pick complete.
    CenterCommitted(Coordinate),
    /// Bounding-box pick complete, corners normalized.
    BoxCommitted(BoundingBox),
}

/// Crosshair pick-mode state machine. Transitions only move forward;
/// `reset` (or re-arming) is the only way back to `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PickSession {
    kind: RegionKind,
    mode: PickMode,
}

impl PickSession {
    #[must_use]
    pub fn armed(kind: RegionKind) -> Self {
        Self {
            kind,
            mode: PickMode::AwaitingPoint,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self.mode, PickMode::Idle)
    }

    #[must_use]
    pub fn awaiting_second(&self) -> bool {
        matches!(self.mode, PickMode::AwaitingSecondPoint { .. })
    }

    #[must_use]
    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    pub fn reset(&mut self) {
        self.mode = PickMode::Idle;
    }

    /// Advance the machine with a committed click.
    pub fn capture(&mut self, point: Coordinate) -> PickOutcome {
        match (self.mode, self.kind) {
            (PickMode::Idle, _) => PickOutcome::Ignored,
            (PickMode::AwaitingPoint, RegionKind::Radius) => {
                self.mode = PickMode::Idle;
                PickOutcome::CenterCommitted(point)
            }
            (PickMode::AwaitingPoint, RegionKind::BoundingBox) => {
                self.mode = PickMode::AwaitingSecondPoint { first: point };
                PickOutcome::FirstCorner(point)
            }
            (PickMode::AwaitingSecondPoint { first }, _) => {
                self.mode = PickMode::Idle;
                PickOutcome::BoxCommitted(BoundingBox::from_corners(first, point))
            }
        }
    }

    /// Live preview rectangle while the opposite corner is still
    /// undecided. Pointer movement never mutates committed state.
    #[must_use]
    pub fn preview(&self, cursor: Coordinate) -> Option<BoundingBox> {
        match self.mode {
            PickMode::AwaitingSecondPoint { first } => {
                Some(BoundingBox::from_corners(first, cursor))
            }
            _ => None,
        }
    }
}

impl Default for PickSession {
    fn default() -> Self {
        Self {
            kind: RegionKind::Radius,
            mode: PickMode::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[test]
    fn coordinate_rejects_nan_and_infinity() {
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::NAN).is_err());
        assert!(Coordinate::new(f64::INFINITY, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn coordinate_rejects_out_of_range() {
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(-90.1, 0.0).is_err());
        assert!(Coordinate::new(0.0, 180.1).is_err());
        assert!(Coordinate::new(0.0, -180.1).is_err());
    }

    #[test]
    fn coordinate_accepts_bounds() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn bbox_corners_normalize_in_any_order() {
        let a = coord(43.10, 5.94);
        let b = coord(43.20, 5.80);
        let expected = BoundingBox {
            south: 43.10,
            west: 5.80,
            north: 43.20,
            east: 5.94,
        };
        assert_eq!(BoundingBox::from_corners(a, b), expected);
        assert_eq!(BoundingBox::from_corners(b, a), expected);

        let c = coord(43.10, 5.80);
        let d = coord(43.20, 5.94);
        assert_eq!(BoundingBox::from_corners(c, d), expected);
        assert_eq!(BoundingBox::from_corners(d, c), expected);
    }

    #[test]
    fn radius_pick_commits_on_first_click() {
        let mut pick = PickSession::armed(RegionKind::Radius);
        assert!(pick.is_active());
        let outcome = pick.capture(coord(48.85, 2.35));
        assert_eq!(outcome, PickOutcome::CenterCommitted(coord(48.85, 2.35)));
        assert!(!pick.is_active());
    }

    #[test]
    fn bbox_pick_needs_two_clicks() {
        let mut pick = PickSession::armed(RegionKind::BoundingBox);
        let first = pick.capture(coord(43.10, 5.94));
        assert_eq!(first, PickOutcome::FirstCorner(coord(43.10, 5.94)));
        assert!(pick.is_active());

        let second = pick.capture(coord(43.20, 5.80));
        assert_eq!(
            second,
            PickOutcome::BoxCommitted(BoundingBox {
                south: 43.10,
                west: 5.80,
                north: 43.20,
                east: 5.94,
            })
        );
        assert!(!pick.is_active());
    }

    #[test]
    fn clicks_are_ignored_when_idle() {
        let mut pick = PickSession::default();
        assert_eq!(pick.capture(coord(1.0, 2.0)), PickOutcome::Ignored);
    }

    #[test]
    fn preview_only_between_first_and_second_corner() {
        let mut pick = PickSession::armed(RegionKind::BoundingBox);
        assert_eq!(pick.preview(coord(1.0, 1.0)), None);

        pick.capture(coord(43.10, 5.94));
        let live = pick.preview(coord(43.15, 5.90)).unwrap();
        assert_eq!(live.south, 43.10);
        assert_eq!(live.north, 43.15);
        // Preview must not advance the machine.
        assert!(pick.is_active());
        assert_eq!(pick.preview(coord(43.16, 5.91)).unwrap().north, 43.16);
    }

    #[test]
    fn reset_returns_to_idle_without_committing() {
        let mut pick = PickSession::armed(RegionKind::BoundingBox);
        pick.capture(coord(43.10, 5.94));
        pick.reset();
        assert!(!pick.is_active());
        assert_eq!(pick.capture(coord(43.20, 5.80)), PickOutcome::Ignored);
    }

    #[test]
    fn radius_clamping() {
        assert_eq!(clamp_radius(0.0), MIN_RADIUS_KM);
        assert_eq!(clamp_radius(250.0), MAX_RADIUS_KM);
        assert_eq!(clamp_radius(10.0), 10.0);
        assert_eq!(clamp_radius(f64::NAN), MIN_RADIUS_KM);
    }

    proptest! {
        #[test]
        fn bbox_bounds_are_order_independent(
            lat_a in -90.0f64..=90.0,
            lng_a in -180.0f64..=180.0,
            lat_b in -90.0f64..=90.0,
            lng_b in -180.0f64..=180.0,
        ) {
            let a = coord(lat_a, lng_a);
            let b = coord(lat_b, lng_b);
            let bbox = BoundingBox::from_corners(a, b);
            prop_assert_eq!(bbox, BoundingBox::from_corners(b, a));
            prop_assert!(bbox.south <= bbox.north);
            prop_assert!(bbox.west <= bbox.east);
            prop_assert_eq!(bbox.south, lat_a.min(lat_b));
            prop_assert_eq!(bbox.north, lat_a.max(lat_b));
            prop_assert_eq!(bbox.west, lng_a.min(lng_b));
            prop_assert_eq!(bbox.east, lng_a.max(lng_b));
        }
    }
}
