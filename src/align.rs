//! Fits a server-returned trajectory onto the locally recorded route.
//!
//! Two-point fit: independent x/y scale plus translation, no rotation,
//! chosen so the server's first and last points land on the route's first
//! and last points. Intermediate points only follow along.

use crate::types::{PoseRecord, RoutePoint};
use nalgebra::Vector2;

/// Server baselines shorter than this on an axis are treated as zero
pub const MIN_BASELINE: f64 = 1e-9;

/// Canvas fraction the overlay fills
const VIEW_MARGIN: f64 = 0.8;

/// Per-axis affine map `p * scale + translate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisFit {
    pub scale: Vector2<f64>,
    pub translate: Vector2<f64>,
}

impl AxisFit {
    pub fn apply(&self, p: &RoutePoint) -> RoutePoint {
        RoutePoint::new(
            p.x * self.scale.x + self.translate.x,
            p.y * self.scale.y + self.translate.y,
        )
    }

    fn is_finite(&self) -> bool {
        self.scale.iter().chain(self.translate.iter()).all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    TooFewServerPoints,
    TooFewLocalPoints,
    /// Server first and last points coincide on both axes
    DegenerateBaseline,
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Alignment {
    Aligned { points: Vec<RoutePoint>, fit: AxisFit },
    Passthrough { points: Vec<RoutePoint>, reason: PassthroughReason },
}

impl Alignment {
    pub fn points(&self) -> &[RoutePoint] {
        match self {
            Alignment::Aligned { points, .. } | Alignment::Passthrough { points, .. } => points,
        }
    }

    pub fn into_points(self) -> Vec<RoutePoint> {
        match self {
            Alignment::Aligned { points, .. } | Alignment::Passthrough { points, .. } => points,
        }
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self, Alignment::Aligned { .. })
    }
}

/// Fit mapping `server_first → local_first` and `server_last → local_last`.
///
/// An axis with a zero server baseline borrows the other axis' scale;
/// `None` when both axes are degenerate.
pub fn fit_anchors(
    local_first: &RoutePoint,
    local_last: &RoutePoint,
    server_first: &RoutePoint,
    server_last: &RoutePoint,
) -> Option<AxisFit> {
    let local_span = local_last - local_first;
    let server_span = server_last - server_first;

    let axis_scale = |l: f64, s: f64| (s.abs() > MIN_BASELINE).then(|| l / s);
    let (sx, sy) = match (
        axis_scale(local_span.x, server_span.x),
        axis_scale(local_span.y, server_span.y),
    ) {
        (Some(sx), Some(sy)) => (sx, sy),
        (Some(s), None) | (None, Some(s)) => (s, s),
        (None, None) => return None,
    };

    let scale = Vector2::new(sx, sy);
    let translate = local_first.coords - server_first.coords.component_mul(&scale);
    Some(AxisFit { scale, translate })
}

pub fn align_to_route(local: &[RoutePoint], server: Vec<RoutePoint>) -> Alignment {
    if server.len() < 2 {
        return Alignment::Passthrough {
            points: server,
            reason: PassthroughReason::TooFewServerPoints,
        };
    }
    let (local_first, local_last) = match (local.first(), local.last()) {
        (Some(first), Some(last)) if local.len() >= 2 => (first, last),
        _ => {
            return Alignment::Passthrough {
                points: server,
                reason: PassthroughReason::TooFewLocalPoints,
            }
        }
    };

    let fit = match fit_anchors(local_first, local_last, &server[0], &server[server.len() - 1]) {
        Some(fit) => fit,
        None => {
            return Alignment::Passthrough {
                points: server,
                reason: PassthroughReason::DegenerateBaseline,
            }
        }
    };

    let aligned: Vec<RoutePoint> = server.iter().map(|p| fit.apply(p)).collect();
    if !fit.is_finite() || aligned.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        log::warn!("Alignment produced non-finite points, showing server trajectory as-is");
        return Alignment::Passthrough {
            points: server,
            reason: PassthroughReason::NonFinite,
        };
    }

    Alignment::Aligned { points: aligned, fit }
}

/// Local route plus the aligned server trajectory, as drawn by the UI.
/// The raw server trajectory is kept so new poses re-anchor it.
#[derive(Debug, Clone, Default)]
pub struct RouteOverlay {
    local_route: Vec<RoutePoint>,
    server_raw: Option<Vec<RoutePoint>>,
    server_aligned: Option<Alignment>,
}

impl RouteOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_point(&mut self, point: RoutePoint) {
        self.local_route.push(point);
        self.realign();
    }

    pub fn push_pose(&mut self, pose: &PoseRecord) {
        self.push_point(pose.route_point());
    }

    /// Install a server response. `None` or fewer than two points clears
    /// the server route and leaves only the local one.
    pub fn apply_server_trajectory(
        &mut self,
        trajectory: Option<Vec<RoutePoint>>,
    ) -> Option<&Alignment> {
        self.server_raw = trajectory.filter(|t| t.len() >= 2);
        self.realign();
        self.server_aligned.as_ref()
    }

    fn realign(&mut self) {
        self.server_aligned = self
            .server_raw
            .as_ref()
            .map(|raw| align_to_route(&self.local_route, raw.clone()));
    }

    pub fn local_route(&self) -> &[RoutePoint] {
        &self.local_route
    }

    pub fn server_route(&self) -> Option<&[RoutePoint]> {
        self.server_aligned.as_ref().map(Alignment::points)
    }

    pub fn alignment(&self) -> Option<&Alignment> {
        self.server_aligned.as_ref()
    }

    pub fn view_fit(&self, width: f64, height: f64) -> ViewFit {
        let server = self.server_route().unwrap_or(&[]);
        ViewFit::fit(self.local_route.iter().chain(server.iter()), width, height)
    }
}

/// Uniform scale and offset that center both routes in a canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewFit {
    pub scale: f64,
    pub offset: Vector2<f64>,
}

impl ViewFit {
    pub fn fit<'a>(
        points: impl IntoIterator<Item = &'a RoutePoint>,
        width: f64,
        height: f64,
    ) -> Self {
        let mut min = Vector2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Vector2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        let mut any = false;
        for p in points {
            min = min.inf(&p.coords);
            max = max.sup(&p.coords);
            any = true;
        }
        if !any {
            return ViewFit {
                scale: 1.0,
                offset: Vector2::zeros(),
            };
        }

        let extent = max - min;
        let axis_scale =
            |canvas: f64, span: f64| (span > MIN_BASELINE).then(|| canvas * VIEW_MARGIN / span);
        let scale = match (axis_scale(width, extent.x), axis_scale(height, extent.y)) {
            (Some(sx), Some(sy)) => sx.min(sy),
            (Some(s), None) | (None, Some(s)) => s,
            (None, None) => 1.0,
        };

        let center = (min + max) / 2.0;
        ViewFit {
            scale,
            offset: -center * scale,
        }
    }

    /// Canvas coordinates with the origin at the top-left corner
    pub fn to_canvas(&self, p: &RoutePoint, width: f64, height: f64) -> (f64, f64) {
        (
            width / 2.0 + p.x * self.scale + self.offset.x,
            height / 2.0 + p.y * self.scale + self.offset.y,
        )
    }
}
