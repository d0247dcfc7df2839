//! Vector export translator.
//!
//! Builds an SVG document for a finished render using the [`svg`] crate
//! for document construction and XML escaping. Content is chosen in
//! priority order:
//!
//! 1. **Cached geometry**: the render's [`GeometryRecord`] matches the
//!    canvas, so every recorded dot or cell is emitted at its exact
//!    position, size and color.
//! 2. **Recomputed**: the record is missing or stale but the buffer that
//!    entered the halftone stage is available, so dots are laid out again
//!    with the same seed and scaled by the per-shape area correction.
//! 3. **Raster**: the canvas is embedded as a base64 PNG `<image>`.
//!
//! Malformed primitives (non-finite or non-positive) are skipped. A
//! `<metadata>` block records the tool, its version, the export mode, the
//! creation timestamp and the effect settings.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use halftonic_pipeline::canvas::{ResampleFilter, resize_exact};
use halftonic_pipeline::halftone::{self, CmykChannel, DotShape, HalftoneSettings};
use halftonic_pipeline::{
    Cell, Dimensions, Dot, EffectSettings, GeometryKind, GeometryRecord, Overlay, Primitives,
    RenderOutput, Rgb, RgbaImage, StageId, stage_rng,
};
use svg::Document;
use svg::node::element::{
    Circle, Definitions, Description, Element, Group, Image, Mask, Polygon, Rectangle, Title,
};
use svg::node::{Node, Text};

use crate::ExportError;
use crate::png::encode_png;

/// Tool identifier written into the metadata block.
pub const TOOL_ID: &str = "halftonic";

/// Namespace of the `<halftonic:export>` metadata element.
const NAMESPACE: &str = "https://halftonic.dev/ns/1";

/// Id of the `<mask>` carrying the canvas alpha.
const ALPHA_MASK_ID: &str = "halftonic-alpha";

/// Metadata to embed in the SVG document. Every field is optional.
///
/// Text values are XML-escaped automatically by the `svg` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgMetadata<'a> {
    /// Emitted as `<title>`, typically the source file stem.
    pub title: Option<&'a str>,
    /// Emitted as `<desc>`.
    pub description: Option<&'a str>,
    /// Creation timestamp, supplied by the caller since this crate reads
    /// no clock.
    pub created: Option<&'a str>,
    /// Serialized effect settings, embedded verbatim.
    pub settings_json: Option<&'a str>,
}

/// What the translator needs to lay out halftone dots again.
#[derive(Debug, Clone, Copy)]
pub struct Recompute<'a> {
    /// The buffer that entered the halftone stage.
    pub source: &'a RgbaImage,
    /// Current halftone settings.
    pub settings: &'a HalftoneSettings,
    /// Document seed.
    pub seed: u64,
}

/// One export.
#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    /// The final composited canvas.
    pub canvas: &'a RgbaImage,
    /// Geometry recorded during the raster render, if any.
    pub geometry: Option<&'a GeometryRecord>,
    /// Inputs for recomputing halftone dots, if available.
    pub recompute: Option<Recompute<'a>>,
    /// Current effect settings. A geometry record whose fingerprint no
    /// longer matches its stage's settings here is discarded.
    pub settings: Option<&'a EffectSettings>,
    /// Document metadata.
    pub metadata: SvgMetadata<'a>,
}

impl<'a> ExportRequest<'a> {
    /// A raster-only export of `canvas`.
    #[must_use]
    pub fn new(canvas: &'a RgbaImage) -> Self {
        Self {
            canvas,
            geometry: None,
            recompute: None,
            settings: None,
            metadata: SvgMetadata::default(),
        }
    }

    /// Export a finished render, wiring in its geometry record and, when
    /// halftone was the last stage to touch the pixels, its input buffer.
    #[must_use]
    pub fn from_render(output: &'a RenderOutput, settings: &'a EffectSettings, seed: u64) -> Self {
        Self {
            canvas: &output.image,
            geometry: output.geometry.as_ref(),
            recompute: output.halftone_input.as_ref().map(|source| Recompute {
                source,
                settings: &settings.halftone,
                seed,
            }),
            settings: Some(settings),
            metadata: SvgMetadata::default(),
        }
    }

    /// Attach metadata.
    #[must_use]
    pub const fn with_metadata(mut self, metadata: SvgMetadata<'a>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Which content path produced the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Exact primitives from the geometry record.
    CachedGeometry,
    /// Halftone dots laid out again with area correction.
    Recomputed,
    /// Embedded PNG.
    Raster,
}

impl ExportMode {
    /// Machine name written into the metadata.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CachedGeometry => "cached-geometry",
            Self::Recomputed => "recomputed",
            Self::Raster => "raster",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A finished SVG document.
#[derive(Debug, Clone)]
pub struct SvgExport {
    /// The XML text, starting with the XML declaration.
    pub document: String,
    /// Content path taken.
    pub mode: ExportMode,
    /// Vector shapes emitted, excluding the paper rectangle.
    pub primitives: usize,
}

/// Vector content ready to be written.
struct VectorContent {
    paper: Option<Rgb>,
    groups: Vec<Group>,
    count: usize,
    overlay: Option<Overlay>,
}

/// Serialize a render as SVG.
///
/// # Errors
///
/// Returns [`ExportError::Png`] only if the raster fallback (or an
/// overlay image) cannot be PNG-encoded.
#[tracing::instrument(
    skip_all,
    fields(width = request.canvas.width(), height = request.canvas.height())
)]
pub fn to_svg(request: &ExportRequest<'_>) -> Result<SvgExport, ExportError> {
    let dims = Dimensions::of(request.canvas);

    let (mode, content) = if let Some(record) = usable_record(request, dims) {
        (ExportMode::CachedGeometry, Some(cached_content(record)))
    } else if let Some(content) = recomputed_content(request, dims) {
        (ExportMode::Recomputed, Some(content))
    } else {
        if request.geometry.is_some() || request.recompute.is_some() {
            tracing::warn!("no usable geometry, embedding raster");
        }
        (ExportMode::Raster, None)
    };

    let mut doc = document(dims, &request.metadata, mode);
    let primitives = match content {
        Some(content) => {
            let mut layer = Group::new();
            if let Some(paper) = content.paper {
                layer = layer.add(
                    Rectangle::new()
                        .set("width", dims.width)
                        .set("height", dims.height)
                        .set("fill", paper.to_hex()),
                );
            }
            for group in content.groups {
                layer = layer.add(group);
            }
            if let Some(overlay) = content.overlay {
                let image = embedded_png(&opaque(&overlay.image), dims)?;
                layer = layer.add(image.set("opacity", num(overlay.opacity)));
            }
            // The raster keeps the canvas alpha, so the vector layer is
            // masked by it.
            if let Some(mask) = alpha_mask(request.canvas) {
                let mask = Mask::new()
                    .set("id", ALPHA_MASK_ID)
                    .set("maskUnits", "userSpaceOnUse")
                    .set("x", 0)
                    .set("y", 0)
                    .set("width", dims.width)
                    .set("height", dims.height)
                    .add(embedded_png(&mask, dims)?);
                doc = doc.add(Definitions::new().add(mask));
                layer = layer.set("mask", format!("url(#{ALPHA_MASK_ID})"));
            }
            doc = doc.add(layer);
            content.count
        }
        None => {
            doc = doc.add(embedded_png(request.canvas, dims)?);
            0
        }
    };

    tracing::debug!(%mode, primitives, "svg exported");

    // The svg crate omits the XML declaration, so we prepend it.
    Ok(SvgExport {
        document: format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n"),
        mode,
        primitives,
    })
}

fn document(dims: Dimensions, metadata: &SvgMetadata<'_>, mode: ExportMode) -> Document {
    let mut doc = Document::new()
        .set("width", dims.width)
        .set("height", dims.height)
        .set("viewBox", (0, 0, dims.width, dims.height));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    let mut info = Element::new("halftonic:export");
    info.assign("xmlns:halftonic", NAMESPACE);
    info.assign("tool", TOOL_ID);
    info.assign("version", env!("CARGO_PKG_VERSION"));
    info.assign("mode", mode.name());
    if let Some(created) = metadata.created {
        info.assign("created", created);
    }
    if let Some(settings) = metadata.settings_json {
        info.append(Text::new(settings));
    }
    let mut metadata_el = Element::new("metadata");
    metadata_el.append(info);
    doc.add(metadata_el)
}

/// The geometry record, if it still describes this canvas.
fn usable_record<'r>(request: &ExportRequest<'r>, dims: Dimensions) -> Option<&'r GeometryRecord> {
    let record = request.geometry?;
    if !record.matches(dims) {
        tracing::warn!(
            record = ?record.dimensions,
            canvas = ?dims,
            "stale geometry record discarded"
        );
        return None;
    }
    if let Some(settings) = request.settings
        && record.settings_fingerprint != settings.stage_fingerprint(record.stage)
    {
        tracing::warn!(stage = %record.stage, "geometry record predates the settings, discarded");
        return None;
    }
    if record.stage == StageId::Halftone
        && let Some(recompute) = request.recompute
        && !record.produced_by(recompute.settings)
    {
        tracing::warn!("geometry record predates the halftone settings, discarded");
        return None;
    }
    if record.is_empty() {
        tracing::debug!("geometry record is empty");
        return None;
    }
    Some(record)
}

fn cached_content(record: &GeometryRecord) -> VectorContent {
    let (groups, count) = match (&record.primitives, record.kind) {
        (Primitives::Dots(dots), GeometryKind::Halftone { shape, rotation }) => {
            dot_groups(dots, shape, rotation)
        }
        // Dots recorded without a shape are drawn as circles.
        (Primitives::Dots(dots), GeometryKind::DitherCells) => {
            dot_groups(dots, DotShape::Circle, 0.0)
        }
        (Primitives::Cells(cells), _) => cell_groups(cells),
    };
    VectorContent {
        paper: record.paper,
        groups,
        count,
        overlay: record.overlay.clone(),
    }
}

fn recomputed_content(request: &ExportRequest<'_>, dims: Dimensions) -> Option<VectorContent> {
    let recompute = request.recompute?;
    let settings = recompute.settings;
    let source = resize_exact(recompute.source, dims, ResampleFilter::Triangle);
    let mut rng = stage_rng(recompute.seed, StageId::Halftone);
    let dots = halftone::layout_dots_scaled(
        &source,
        settings,
        settings.shape.area_correction(),
        &mut rng,
    );
    if dots.is_empty() {
        tracing::debug!("recomputed layout has no dots");
        return None;
    }
    tracing::warn!(dots = dots.len(), "geometry recomputed with area correction");
    let (groups, count) = dot_groups(&dots, settings.shape, settings.effective_rotation());
    Some(VectorContent {
        paper: Some(Rgb::WHITE),
        groups,
        count,
        overlay: settings.overlay_opacity().map(|opacity| Overlay {
            image: source,
            opacity,
        }),
    })
}

/// Group consecutive primitives of equal fill, keeping draw order.
fn push_grouped(
    groups: &mut Vec<Group>,
    current: &mut Option<(Option<CmykChannel>, Rgb)>,
    key: (Option<CmykChannel>, Rgb),
    node: Box<dyn Node>,
) {
    if *current != Some(key) || groups.is_empty() {
        let (channel, color) = key;
        let mut group = Group::new().set("fill", color.to_hex());
        if let Some(channel) = channel {
            group = group
                .set("data-channel", channel.name())
                .set("style", "mix-blend-mode:multiply");
        }
        groups.push(group);
        *current = Some(key);
    }
    if let Some(group) = groups.last_mut() {
        group.append(node);
    }
}

fn dot_groups(dots: &[Dot], shape: DotShape, rotation: f64) -> (Vec<Group>, usize) {
    let mut groups = Vec::new();
    let mut current = None;
    let mut count = 0;
    for dot in dots {
        let Some(node) = dot_node(dot, shape, rotation) else {
            tracing::warn!(?dot, "malformed dot skipped");
            continue;
        };
        push_grouped(&mut groups, &mut current, (dot.channel, dot.color), node);
        count += 1;
    }
    (groups, count)
}

fn cell_groups(cells: &[Cell]) -> (Vec<Group>, usize) {
    let mut groups = Vec::new();
    let mut current = None;
    let mut count = 0;
    for cell in cells {
        if !cell.is_drawable() {
            tracing::warn!(?cell, "empty cell skipped");
            continue;
        }
        let rect = Rectangle::new()
            .set("x", cell.x)
            .set("y", cell.y)
            .set("width", cell.width)
            .set("height", cell.height);
        push_grouped(&mut groups, &mut current, (None, cell.color), Box::new(rect));
        count += 1;
    }
    (groups, count)
}

fn dot_node(dot: &Dot, shape: DotShape, rotation: f64) -> Option<Box<dyn Node>> {
    if !dot.is_drawable() {
        return None;
    }
    match shape.outline(dot.center, dot.size, rotation) {
        None => Some(Box::new(
            Circle::new()
                .set("cx", num(dot.center.x))
                .set("cy", num(dot.center.y))
                .set("r", num(dot.size / 2.0)),
        )),
        Some(vertices) => {
            if !vertices.iter().all(|v| v.is_finite()) {
                return None;
            }
            let points = vertices
                .iter()
                .map(|v| format!("{},{}", num(v.x), num(v.y)))
                .collect::<Vec<_>>()
                .join(" ");
            Some(Box::new(Polygon::new().set("points", points)))
        }
    }
}

fn embedded_png(image: &RgbaImage, dims: Dimensions) -> Result<Image, ExportError> {
    let png = encode_png(image)?;
    Ok(Image::new()
        .set("x", 0)
        .set("y", 0)
        .set("width", dims.width)
        .set("height", dims.height)
        .set("href", format!("data:image/png;base64,{}", STANDARD.encode(&png))))
}

/// Luminance mask of the canvas alpha, or `None` when the canvas is opaque.
fn alpha_mask(canvas: &RgbaImage) -> Option<RgbaImage> {
    if canvas.pixels().all(|p| p.0[3] == u8::MAX) {
        return None;
    }
    Some(RgbaImage::from_fn(canvas.width(), canvas.height(), |x, y| {
        let a = canvas.get_pixel(x, y).0[3];
        image::Rgba([a, a, a, u8::MAX])
    }))
}

/// `image` with every pixel made opaque.
fn opaque(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0[3] = u8::MAX;
    }
    out
}

/// Format a coordinate with at most three decimals and no trailing zeros.
#[allow(clippy::cast_possible_truncation)]
fn num(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == rounded.trunc() {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}
