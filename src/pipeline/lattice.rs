//! Ruled-table detection from page line art.
//!
//! ```text
//! path bounds ──▶ edges ──▶ snap ──▶ join ──▶ intersections ──▶ cells ──▶ tables
//! ```
//!
//! Thin paths become horizontal or vertical rules and everything else
//! contributes the four sides of its bounding box. Nearly-collinear rules
//! are snapped onto a shared coordinate, overlapping pieces are joined, and
//! every crossing of a horizontal and a vertical rule becomes an
//! intersection. A cell is the smallest rectangle whose four corners are
//! intersections connected by rules; cells sharing corners form a table.
//! Only tables of at least two cells are reported.

use super::geometry::Rect;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A horizontal (`top == bottom`) or vertical (`x0 == x1`) rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub orientation: Orientation,
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl Edge {
    pub fn horizontal(x0: f64, x1: f64, y: f64) -> Self {
        Self {
            orientation: Orientation::Horizontal,
            x0: x0.min(x1),
            top: y,
            x1: x0.max(x1),
            bottom: y,
        }
    }

    pub fn vertical(x: f64, top: f64, bottom: f64) -> Self {
        Self {
            orientation: Orientation::Vertical,
            x0: x,
            top: top.min(bottom),
            x1: x,
            bottom: top.max(bottom),
        }
    }

    pub fn length(&self) -> f64 {
        match self.orientation {
            Orientation::Horizontal => self.x1 - self.x0,
            Orientation::Vertical => self.bottom - self.top,
        }
    }
}

/// One character and its bounds, used to fill cell text.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub rect: Rect,
}

/// Tolerances for the finder. Defaults come from [`crate::config::RegionConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeSettings {
    pub snap_tolerance: f64,
    pub join_tolerance: f64,
    pub intersection_tolerance: f64,
    pub min_edge_length: f64,
}

impl LatticeSettings {
    pub fn uniform(tolerance: f64, min_edge_length: f64) -> Self {
        Self {
            snap_tolerance: tolerance,
            join_tolerance: tolerance,
            intersection_tolerance: tolerance,
            min_edge_length,
        }
    }
}

/// A detected table: bounding box plus its grid of cell text.
///
/// `rows[r][c]` is `None` where the grid has no cell at that column.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundTable {
    pub bbox: Rect,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Turn a path's bounding box into rules.
///
/// A path no thicker than `max_thickness` in one direction is a single rule
/// through its centre; anything else yields the four sides of the box.
pub fn edges_from_path(bounds: &Rect, max_thickness: f64) -> Vec<Edge> {
    let (w, h) = (bounds.width(), bounds.height());
    if w <= 0.0 && h <= 0.0 {
        return Vec::new();
    }
    let (cx, cy) = bounds.center();
    if h <= max_thickness && w > h {
        return vec![Edge::horizontal(bounds.x0, bounds.x1, cy)];
    }
    if w <= max_thickness && h > w {
        return vec![Edge::vertical(cx, bounds.y0, bounds.y1)];
    }
    vec![
        Edge::horizontal(bounds.x0, bounds.x1, bounds.y0),
        Edge::horizontal(bounds.x0, bounds.x1, bounds.y1),
        Edge::vertical(bounds.x0, bounds.y0, bounds.y1),
        Edge::vertical(bounds.x1, bounds.y0, bounds.y1),
    ]
}

/// How a path step reaches its point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Move,
    Line,
    Curve,
}

/// One path segment end point, in page space with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathStep {
    pub kind: StepKind,
    pub x: f64,
    pub y: f64,
    /// The subpath closes back to its start after this step.
    pub close: bool,
}

impl PathStep {
    pub fn new(kind: StepKind, x: f64, y: f64) -> Self {
        Self {
            kind,
            x,
            y,
            close: false,
        }
    }

    pub fn closing(mut self) -> Self {
        self.close = true;
        self
    }
}

/// Rules drawn by one path object.
///
/// Filled paths contribute the bounding box of each subpath through
/// [`edges_from_path`], so a thin filled bar is one rule and a filled cell
/// is its four sides. Stroked paths contribute every straight segment that
/// is horizontal or vertical within `max_thickness`, closing segments
/// included; curves and diagonals draw no rule.
pub fn edges_from_steps(steps: &[PathStep], filled: bool, max_thickness: f64) -> Vec<Edge> {
    if filled {
        return subpaths(steps)
            .into_iter()
            .filter_map(steps_bounds)
            .flat_map(|b| edges_from_path(&b, max_thickness))
            .collect();
    }

    let mut edges = Vec::new();
    let mut start: Option<(f64, f64)> = None;
    let mut current: Option<(f64, f64)> = None;
    for step in steps {
        let to = (step.x, step.y);
        match step.kind {
            StepKind::Move => start = Some(to),
            StepKind::Line => {
                if let Some(from) = current {
                    edges.extend(straight_rule(from, to, max_thickness));
                }
            }
            StepKind::Curve => {}
        }
        if start.is_none() {
            start = Some(to);
        }
        current = Some(to);
        if step.close {
            if let Some(first) = start {
                edges.extend(straight_rule(to, first, max_thickness));
                current = Some(first);
            }
        }
    }
    edges
}

fn subpaths(steps: &[PathStep]) -> Vec<&[PathStep]> {
    let mut out = Vec::new();
    let mut begin = 0;
    for (i, step) in steps.iter().enumerate() {
        if step.kind == StepKind::Move && i > begin {
            out.push(&steps[begin..i]);
            begin = i;
        }
    }
    if begin < steps.len() {
        out.push(&steps[begin..]);
    }
    out
}

fn steps_bounds(steps: &[PathStep]) -> Option<Rect> {
    let first = steps.first()?;
    let init = Rect::new(first.x, first.y, first.x, first.y);
    Some(steps.iter().fold(init, |r, s| {
        Rect::new(r.x0.min(s.x), r.y0.min(s.y), r.x1.max(s.x), r.y1.max(s.y))
    }))
}

/// The rule along a straight segment, if it runs horizontally or vertically.
fn straight_rule(from: (f64, f64), to: (f64, f64), max_skew: f64) -> Option<Edge> {
    let dx = (to.0 - from.0).abs();
    let dy = (to.1 - from.1).abs();
    if dy <= max_skew && dx > dy {
        Some(Edge::horizontal(from.0, to.0, (from.1 + to.1) / 2.0))
    } else if dx <= max_skew && dy > dx {
        Some(Edge::vertical((from.0 + to.0) / 2.0, from.1, to.1))
    } else {
        None
    }
}

/// Find ruled tables among `edges`, filling cell text from `glyphs`.
///
/// Tables are returned top-to-bottom, then left-to-right.
pub fn find_tables(edges: &[Edge], glyphs: &[Glyph], settings: &LatticeSettings) -> Vec<FoundTable> {
    let merged = merge_edges(edges, settings);
    let intersections = intersections(&merged, settings.intersection_tolerance);
    let cells = cells_from_intersections(&intersections);
    let mut tables = group_cells(&cells);

    tables.sort_by(|a, b| {
        let ka = table_origin(a);
        let kb = table_origin(b);
        ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
    });

    tables
        .into_iter()
        .map(|cells| FoundTable {
            bbox: cells
                .iter()
                .skip(1)
                .fold(cells[0], |acc, c| acc.union(c)),
            rows: table_rows(&cells, glyphs),
        })
        .collect()
}

fn table_origin(cells: &[Rect]) -> (f64, f64) {
    cells
        .iter()
        .map(|c| (c.y0, c.x0))
        .fold((f64::INFINITY, f64::INFINITY), |a, b| if b < a { b } else { a })
}

// ── Edge merging ─────────────────────────────────────────────────────────

/// Snap, join and length-filter edges.
pub fn merge_edges(edges: &[Edge], settings: &LatticeSettings) -> Vec<Edge> {
    let (mut h, mut v): (Vec<Edge>, Vec<Edge>) = edges
        .iter()
        .copied()
        .partition(|e| e.orientation == Orientation::Horizontal);

    snap(&mut h, settings.snap_tolerance, |e| e.top, |e, y| {
        e.top = y;
        e.bottom = y;
    });
    snap(&mut v, settings.snap_tolerance, |e| e.x0, |e, x| {
        e.x0 = x;
        e.x1 = x;
    });

    let mut out = join(h, settings.join_tolerance, Orientation::Horizontal);
    out.extend(join(v, settings.join_tolerance, Orientation::Vertical));
    out.retain(|e| e.length() >= settings.min_edge_length);
    out
}

/// Move edges whose `key` values chain within `tolerance` onto the cluster mean.
fn snap(
    edges: &mut [Edge],
    tolerance: f64,
    key: impl Fn(&Edge) -> f64,
    set: impl Fn(&mut Edge, f64),
) {
    if edges.is_empty() {
        return;
    }
    edges.sort_by(|a, b| key(a).partial_cmp(&key(b)).unwrap_or(std::cmp::Ordering::Equal));

    let mut start = 0;
    for i in 1..=edges.len() {
        let split = i == edges.len() || key(&edges[i]) - key(&edges[i - 1]) > tolerance;
        if split {
            let group = &mut edges[start..i];
            let mean = group.iter().map(&key).sum::<f64>() / group.len() as f64;
            for e in group.iter_mut() {
                set(e, mean);
            }
            start = i;
        }
    }
}

/// Join collinear edges that overlap or nearly touch.
fn join(mut edges: Vec<Edge>, tolerance: f64, orientation: Orientation) -> Vec<Edge> {
    // (line coordinate, span start, span end)
    let parts = |e: &Edge| match orientation {
        Orientation::Horizontal => (e.top, e.x0, e.x1),
        Orientation::Vertical => (e.x0, e.top, e.bottom),
    };
    edges.sort_by(|a, b| {
        let (la, sa, _) = parts(a);
        let (lb, sb, _) = parts(b);
        (la, sa).partial_cmp(&(lb, sb)).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut out: Vec<Edge> = Vec::with_capacity(edges.len());
    for e in edges {
        let (line, start, end) = parts(&e);
        if let Some(last) = out.last_mut() {
            let (last_line, _, last_end) = parts(last);
            if last_line == line && start <= last_end + tolerance {
                if end > last_end {
                    match orientation {
                        Orientation::Horizontal => last.x1 = end,
                        Orientation::Vertical => last.bottom = end,
                    }
                }
                continue;
            }
        }
        out.push(e);
    }
    out
}

// ── Intersections and cells ──────────────────────────────────────────────

/// A crossing point and the rules passing through it.
#[derive(Debug, Clone)]
struct Intersection {
    x: f64,
    y: f64,
    h_edges: Vec<usize>,
    v_edges: Vec<usize>,
}

type PointKey = (u64, u64);

fn point_key(x: f64, y: f64) -> PointKey {
    (x.to_bits(), y.to_bits())
}

struct IntersectionMap {
    points: Vec<Intersection>,
    index: HashMap<PointKey, usize>,
}

impl IntersectionMap {
    fn get(&self, x: f64, y: f64) -> Option<&Intersection> {
        self.index.get(&point_key(x, y)).map(|&i| &self.points[i])
    }
}

fn intersections(edges: &[Edge], tolerance: f64) -> IntersectionMap {
    let mut points: Vec<Intersection> = Vec::new();
    let mut index: HashMap<PointKey, usize> = HashMap::new();

    for (vi, v) in edges.iter().enumerate() {
        if v.orientation != Orientation::Vertical {
            continue;
        }
        for (hi, h) in edges.iter().enumerate() {
            if h.orientation != Orientation::Horizontal {
                continue;
            }
            let crosses = h.top >= v.top - tolerance
                && h.top <= v.bottom + tolerance
                && v.x0 >= h.x0 - tolerance
                && v.x0 <= h.x1 + tolerance;
            if !crosses {
                continue;
            }
            let key = point_key(v.x0, h.top);
            let slot = *index.entry(key).or_insert_with(|| {
                points.push(Intersection {
                    x: v.x0,
                    y: h.top,
                    h_edges: Vec::new(),
                    v_edges: Vec::new(),
                });
                points.len() - 1
            });
            points[slot].h_edges.push(hi);
            points[slot].v_edges.push(vi);
        }
    }

    points.sort_by(|a, b| (a.x, a.y).partial_cmp(&(b.x, b.y)).unwrap_or(std::cmp::Ordering::Equal));
    let index = points
        .iter()
        .enumerate()
        .map(|(i, p)| (point_key(p.x, p.y), i))
        .collect();
    IntersectionMap { points, index }
}

/// Two intersections on the same vertical (or horizontal) line are
/// connected when a single rule passes through both.
fn connected(a: &Intersection, b: &Intersection) -> bool {
    let shares = |x: &[usize], y: &[usize]| x.iter().any(|e| y.contains(e));
    if a.x == b.x {
        return shares(&a.v_edges, &b.v_edges);
    }
    if a.y == b.y {
        return shares(&a.h_edges, &b.h_edges);
    }
    false
}

fn cells_from_intersections(map: &IntersectionMap) -> Vec<Rect> {
    let points = &map.points;
    let mut cells = Vec::new();

    for (i, pt) in points.iter().enumerate() {
        let rest = &points[i + 1..];
        let below: Vec<&Intersection> = rest.iter().filter(|p| p.x == pt.x).collect();
        let right: Vec<&Intersection> = rest.iter().filter(|p| p.y == pt.y).collect();

        'search: for b in below.iter().filter(|b| connected(pt, b)) {
            for r in right.iter().filter(|r| connected(pt, r)) {
                if let Some(corner) = map.get(r.x, b.y) {
                    if connected(corner, r) && connected(corner, b) {
                        cells.push(Rect::new(pt.x, pt.y, corner.x, corner.y));
                        break 'search;
                    }
                }
            }
        }
    }

    cells
}

/// Group cells that share a corner into tables of two or more cells.
fn group_cells(cells: &[Rect]) -> Vec<Vec<Rect>> {
    let corners = |c: &Rect| {
        [
            point_key(c.x0, c.y0),
            point_key(c.x1, c.y0),
            point_key(c.x0, c.y1),
            point_key(c.x1, c.y1),
        ]
    };

    let mut parent: Vec<usize> = (0..cells.len()).collect();
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut owner: HashMap<PointKey, usize> = HashMap::new();
    for (i, cell) in cells.iter().enumerate() {
        for key in corners(cell) {
            match owner.get(&key) {
                Some(&j) => {
                    let (ri, rj) = (root(&mut parent, i), root(&mut parent, j));
                    if ri != rj {
                        parent[ri] = rj;
                    }
                }
                None => {
                    owner.insert(key, i);
                }
            }
        }
    }

    let mut groups: HashMap<usize, Vec<Rect>> = HashMap::new();
    for (i, cell) in cells.iter().enumerate() {
        let r = root(&mut parent, i);
        groups.entry(r).or_default().push(*cell);
    }
    groups.into_values().filter(|g| g.len() > 1).collect()
}

// ── Text ─────────────────────────────────────────────────────────────────

fn table_rows(cells: &[Rect], glyphs: &[Glyph]) -> Vec<Vec<Option<String>>> {
    let mut xs: Vec<f64> = cells.iter().map(|c| c.x0).collect();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    xs.dedup();

    let mut tops: Vec<f64> = cells.iter().map(|c| c.y0).collect();
    tops.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    tops.dedup();

    tops.iter()
        .map(|&top| {
            xs.iter()
                .map(|&x| {
                    cells
                        .iter()
                        .find(|c| c.y0 == top && c.x0 == x)
                        .map(|c| cell_text(c, glyphs))
                })
                .collect()
        })
        .collect()
}

/// Text of glyphs whose centre falls inside `cell`, in content order.
///
/// A vertical jump of more than half a glyph height starts a new line.
pub fn cell_text(cell: &Rect, glyphs: &[Glyph]) -> String {
    let mut out = String::new();
    let mut last_y: Option<(f64, f64)> = None;

    for g in glyphs {
        let (cx, cy) = g.rect.center();
        if !cell.contains_point(cx, cy) {
            continue;
        }
        if let Some((y, h)) = last_y {
            if (cy - y).abs() > h.max(g.rect.height()) * 0.5 && !out.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push(g.ch);
        last_y = Some((cy, g.rect.height()));
    }

    out.trim().to_string()
}
