//! SVG preview serializer.
//!
//! Draws a [`NetworkPlan`] in four layers, bottom to top: filled region
//! loops with their labels, the planar segments in grey, the distribution
//! tree in blue and the root in red.  Documents are built with the [`svg`]
//! crate, which handles XML escaping and path data formatting.
//!
//! Plan coordinates are y-up; they are flipped into SVG's y-down space and
//! framed by a padded bounding box.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Group, Path, Title};
use svg::node::{Node, Text, Value};

use plenum_topology::{NetworkPlan, Point};

/// Padding around the drawing, as a fraction of its larger extent.
const PADDING_FRACTION: f64 = 0.05;
/// Padding used when the drawing has no extent.
const MIN_PADDING: f64 = 1.0;
/// Region fills, cycled by region id.
const REGION_FILLS: [&str; 6] = ["#fde2e4", "#e2ece9", "#dfe7fd", "#fff1e6", "#e9e4f0", "#f0efeb"];

/// Metadata to embed in the SVG document.
///
/// Both text fields become `<title>` and `<desc>` elements right after
/// the opening `<svg>` tag.  Values are XML-escaped by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, typically the input file stem.
    pub title: Option<&'a str>,

    /// Free-form description, typically the tolerances used.
    pub description: Option<&'a str>,

    /// Serialized `PlanConfig`, embedded in a namespaced `<metadata>`
    /// element so previews carry their settings.
    pub config_json: Option<&'a str>,
}

/// Maps plan coordinates into the document's view box.
#[derive(Debug, Clone, Copy)]
struct Frame {
    min_x: f64,
    max_y: f64,
    width: f64,
    height: f64,
    pad: f64,
}

impl Frame {
    fn around<'a>(points: impl IntoIterator<Item = &'a Point>) -> Self {
        let mut min = (f64::INFINITY, f64::INFINITY);
        let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min = (min.0.min(p.x), min.1.min(p.y));
            max = (max.0.max(p.x), max.1.max(p.y));
        }
        if min.0 > max.0 {
            return Self {
                min_x: 0.0,
                max_y: 0.0,
                width: 0.0,
                height: 0.0,
                pad: MIN_PADDING,
            };
        }
        let (width, height) = (max.0 - min.0, max.1 - min.1);
        let extent = width.max(height);
        let pad = if extent > 0.0 { extent * PADDING_FRACTION } else { MIN_PADDING };
        Self {
            min_x: min.0,
            max_y: max.1,
            width,
            height,
            pad,
        }
    }

    fn map(&self, p: Point) -> (f64, f64) {
        (p.x - self.min_x + self.pad, self.max_y - p.y + self.pad)
    }

    fn view_box(&self) -> (f64, f64, f64, f64) {
        (0.0, 0.0, 2.0f64.mul_add(self.pad, self.width), 2.0f64.mul_add(self.pad, self.height))
    }

    /// Stroke width scaled to the drawing.
    fn stroke(&self) -> f64 {
        (self.width.max(self.height) / 400.0).max(0.01)
    }
}

/// Build an SVG path `d` attribute from a point run.
///
/// Uses `M` for the first point, `L` for the rest and a trailing `z` when
/// `closed`.  Returns an empty string for fewer than 2 points.
///
/// # Examples
///
/// ```
/// use plenum_export::build_path_data;
/// use plenum_topology::Point;
///
/// let d = build_path_data(&[Point::new(10.0, 20.0), Point::new(30.0, 40.0)], false);
/// assert_eq!(d, "M10,20 L30,40");
/// ```
#[must_use]
pub fn build_path_data(points: &[Point], closed: bool) -> String {
    path_data(points, closed, |p| (p.x, p.y)).map_or_else(String::new, String::from)
}

fn path_data(points: &[Point], closed: bool, tx: impl Fn(Point) -> (f64, f64)) -> Option<Value> {
    let (first, rest) = points.split_first()?;
    if rest.is_empty() {
        return None;
    }
    let mut data = Data::new().move_to(tx(*first));
    for &p in rest {
        data = data.line_to(tx(p));
    }
    if closed {
        data = data.close();
    }
    Some(Value::from(data))
}

fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let sum = points.iter().fold(Point::new(0.0, 0.0), |acc, &p| acc + p);
    Some(sum * (1.0 / n))
}

/// Serialize a plan into an SVG preview.
///
/// # Examples
///
/// ```
/// use plenum_export::{SvgMetadata, to_svg};
/// use plenum_topology::{PlanConfig, PlanInput, Point, Segment, process};
///
/// let square = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)];
/// let segments = (0..4)
///     .map(|i| {
///         let (a, b) = (square[i], square[(i + 1) % 4]);
///         Segment::new(Point::new(a.0, a.1), Point::new(b.0, b.1))
///     })
///     .collect();
/// let input = PlanInput { segments, ..PlanInput::default() };
/// let plan = process(&input, &PlanConfig::default()).unwrap();
/// let metadata = SvgMetadata { title: Some("square"), ..SvgMetadata::default() };
/// let svg = to_svg(&plan, &metadata);
/// assert!(svg.contains("<title>square</title>"));
/// assert!(svg.contains(r#"id="regions""#));
/// ```
#[must_use]
pub fn to_svg(plan: &NetworkPlan, metadata: &SvgMetadata<'_>) -> String {
    let graph = &plan.zone.graph;
    let frame = Frame::around(
        plan.segments
            .iter()
            .flat_map(|s| [&s.start, &s.end])
            .chain(plan.faces.regions.iter().flat_map(|r| &r.loop_points))
            .chain(graph.vertices().map(|(_, v)| &v.coords)),
    );
    let stroke = frame.stroke();
    let tx = |p: Point| frame.map(p);

    let (vb_x, vb_y, vb_w, vb_h) = frame.view_box();
    let mut doc = Document::new()
        .set("width", vb_w)
        .set("height", vb_h)
        .set("viewBox", (vb_x, vb_y, vb_w, vb_h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("plenum:config");
        config_el.assign("xmlns:plenum", "https://plenum.invalid/ns/1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    // Regions: the loop plus one sub-path per hole, filled even-odd.
    let mut regions = Group::new().set("id", "regions").set("stroke", "none");
    for region in &plan.faces.regions {
        let Some(outer) = path_data(&region.loop_points, true, tx) else {
            continue;
        };
        let mut d = String::from(outer);
        for hole in &region.holes {
            if let Some(h) = path_data(&hole.loop_points, true, tx) {
                d.push(' ');
                d.push_str(&String::from(h));
            }
        }
        regions = regions.add(
            Path::new()
                .set("d", d)
                .set("fill", REGION_FILLS[region.id % REGION_FILLS.len()])
                .set("fill-rule", "evenodd")
                .set("data-label", region.label.as_str()),
        );
        if let Some(c) = centroid(&region.loop_points) {
            let (x, y) = tx(c);
            let mut label = Element::new("text");
            label.assign("x", x);
            label.assign("y", y);
            label.assign("font-size", stroke * 12.0);
            label.assign("text-anchor", "middle");
            label.append(Text::new(region.label.as_str()));
            regions = regions.add(label);
        }
    }
    doc = doc.add(regions);

    let mut segments = Group::new()
        .set("id", "segments")
        .set("fill", "none")
        .set("stroke", "grey")
        .set("stroke-width", stroke);
    for s in &plan.segments {
        if let Some(d) = path_data(&[s.start, s.end], false, tx) {
            segments = segments.add(Path::new().set("d", d));
        }
    }
    doc = doc.add(segments);

    let mut tree = Group::new()
        .set("id", "tree")
        .set("fill", "none")
        .set("stroke", "blue")
        .set("stroke-width", stroke * 3.0);
    for edge in graph.edges() {
        let (Some(a), Some(b)) = (graph.vertex(edge.from), graph.vertex(edge.to)) else {
            continue;
        };
        if let Some(d) = path_data(&[a.coords, b.coords], false, tx) {
            tree = tree.add(Path::new().set("d", d));
        }
    }
    doc = doc.add(tree);

    if let Some(root) = plan.zone.root.and_then(|id| graph.vertex(id)) {
        let (cx, cy) = tx(root.coords);
        let mut marker = Element::new("circle");
        marker.assign("id", "root");
        marker.assign("cx", cx);
        marker.assign("cy", cy);
        marker.assign("r", stroke * 6.0);
        marker.assign("fill", "red");
        doc = doc.add(marker);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
