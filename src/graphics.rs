//! Render targets over bitmaps, SVG documents and the draw pass.
//!
//! The objects here form a chain: a [`GraphicsFactory`] binds a
//! [`RenderTarget`] to a bitmap, the target is upgraded to a
//! [`DeviceContext`], and the context loads [`SvgDocument`]s and opens
//! [`DrawPass`]es. Drawing calls never fail individually; the first failure
//! of a pass is held back and returned by [`DrawPass::end_draw`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::Level;
use tiny_skia::{Color, Pixmap, Transform};
use usvg::fontdb::Database;
use usvg::Tree;

use crate::error::{Check, GraphicsError, Result, Status};
use crate::imaging::{Bitmap, PixelFormat};
use crate::runtime::Runtime;
use crate::stream::InputStream;

const DEFAULT_DPI: f32 = 96.0;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// How much the graphics layer reports about what it is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationLevel {
    None,
    Error,
    Warning,
    Informational,
}

impl ValidationLevel {
    fn allows(self, level: Level) -> bool {
        match self {
            ValidationLevel::None => false,
            ValidationLevel::Error => level <= Level::Error,
            ValidationLevel::Warning => level <= Level::Warn,
            ValidationLevel::Informational => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryOptions {
    pub validation_level: ValidationLevel,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        FactoryOptions {
            validation_level: ValidationLevel::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTargetType {
    /// Let the factory pick; always software here.
    Default,
    Software,
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureLevel {
    Default,
    Level9,
    Level10,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargetProperties {
    pub target_type: RenderTargetType,
    /// `Unknown` inherits the bitmap's format.
    pub pixel_format: PixelFormat,
    /// Zero inherits the default of 96.
    pub dpi_x: f32,
    pub dpi_y: f32,
    pub feature_level: FeatureLevel,
}

impl Default for RenderTargetProperties {
    fn default() -> Self {
        RenderTargetProperties {
            target_type: RenderTargetType::Default,
            pixel_format: PixelFormat::Unknown,
            dpi_x: 0.0,
            dpi_y: 0.0,
            feature_level: FeatureLevel::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorF {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorF {
    pub const TRANSPARENT: ColorF = ColorF { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> ColorF {
        ColorF { r, g, b, a }
    }
}

/// Logical size in device independent units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeF {
    pub width: f32,
    pub height: f32,
}

impl SizeF {
    pub fn new(width: f32, height: f32) -> SizeF {
        SizeF { width, height }
    }
}

#[derive(Clone, Copy)]
struct Validator(ValidationLevel);

impl Validator {
    fn report(self, level: Level, args: fmt::Arguments<'_>) {
        if self.0.allows(level) {
            log!(level, "{}", args);
        }
    }
}

pub struct GraphicsFactory<'r> {
    runtime: &'r Runtime,
    validator: Validator,
}

impl<'r> GraphicsFactory<'r> {
    pub fn new(runtime: &'r Runtime, options: FactoryOptions) -> Result<GraphicsFactory<'r>> {
        debug!("graphics factory created ({:?})", options.validation_level);
        Ok(GraphicsFactory {
            runtime,
            validator: Validator(options.validation_level),
        })
    }

    /// Bind a render target to `bitmap`. The bitmap stays borrowed until the
    /// target (or the context it is upgraded to) is dropped.
    #[track_caller]
    pub fn create_bitmap_render_target<'b>(
        &self,
        bitmap: &'b mut Bitmap,
        props: &RenderTargetProperties,
    ) -> Result<RenderTarget<'b>> {
        if props.target_type == RenderTargetType::Hardware {
            return Err(GraphicsError::new(Status::NoHardwareDevice));
        }
        if props.pixel_format != PixelFormat::Unknown && props.pixel_format != bitmap.format() {
            return Err(GraphicsError::new(Status::UnsupportedPixelFormat));
        }
        let dpi_x = resolve_dpi(props.dpi_x)?;
        let dpi_y = resolve_dpi(props.dpi_y)?;

        let (width, height) = (bitmap.width(), bitmap.height());
        let surface = bitmap.realize()?;
        self.validator.report(
            Level::Info,
            format_args!("render target {}x{} at {}x{} dpi", width, height, dpi_x, dpi_y),
        );

        Ok(RenderTarget {
            surface,
            dpi: (dpi_x, dpi_y),
            feature_level: props.feature_level,
            validator: self.validator,
            fontdb: self.runtime.fontdb(),
        })
    }
}

#[track_caller]
fn resolve_dpi(dpi: f32) -> Result<f32> {
    if !dpi.is_finite() || dpi < 0.0 {
        Err(GraphicsError::new(Status::InvalidArg))
    } else if dpi == 0.0 {
        Ok(DEFAULT_DPI)
    } else {
        Ok(dpi)
    }
}

/// A drawable surface bound to a bitmap.
pub struct RenderTarget<'b> {
    surface: &'b mut Pixmap,
    dpi: (f32, f32),
    feature_level: FeatureLevel,
    validator: Validator,
    fontdb: Arc<Database>,
}

impl<'b> RenderTarget<'b> {
    pub fn dpi(&self) -> (f32, f32) {
        self.dpi
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.surface.width(), self.surface.height())
    }

    /// Upgrade to the richer context over the same surface.
    #[track_caller]
    pub fn into_device_context(self) -> Result<DeviceContext<'b>> {
        if self.feature_level == FeatureLevel::Level9 {
            return Err(GraphicsError::new(Status::NoInterface));
        }
        let id = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
        self.validator
            .report(Level::Debug, format_args!("device context {} acquired", id));
        Ok(DeviceContext { target: self, id })
    }
}

/// Parsed SVG, tied to the context that loaded it.
pub struct SvgDocument {
    tree: Tree,
    owner: u64,
    fit: (f32, f32),
}

impl SvgDocument {
    /// Size the document is drawn at, in device independent units.
    pub fn size(&self) -> SizeF {
        let size = self.tree.size();
        SizeF::new(size.width() * self.fit.0, size.height() * self.fit.1)
    }
}

/// Per axis, the fraction of the viewport the root `<svg>` asks for, or
/// `None` when that axis has an absolute length.
fn root_fractions(data: &[u8]) -> (Option<f32>, Option<f32>) {
    let unpacked;
    let data = if data.starts_with(&[0x1f, 0x8b]) {
        match usvg::decompress_svgz(data) {
            Ok(bytes) => {
                unpacked = bytes;
                &unpacked[..]
            }
            Err(_) => return (None, None),
        }
    } else {
        data
    };
    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        Err(_) => return (None, None),
    };
    let doc = match usvg::roxmltree::Document::parse(text) {
        Ok(doc) => doc,
        Err(_) => return (None, None),
    };
    let root = doc.root_element();
    (
        relative_length(root.attribute("width")),
        relative_length(root.attribute("height")),
    )
}

fn relative_length(value: Option<&str>) -> Option<f32> {
    let value = match value {
        Some(value) => value.trim(),
        None => return Some(1.0),
    };
    let percent = value.strip_suffix('%')?;
    percent.trim().parse::<f32>().ok().map(|p| p / 100.0)
}

pub struct DeviceContext<'b> {
    target: RenderTarget<'b>,
    id: u64,
}

impl<'b> DeviceContext<'b> {
    /// Parse the stream as SVG sized to `viewport`.
    ///
    /// A root `width` or `height` that is missing or a percentage resolves
    /// against the viewport, and the `viewBox` is stretched onto the result.
    /// Absolute lengths are kept, so such documents may be cropped.
    #[track_caller]
    pub fn create_svg_document(&self, stream: InputStream, viewport: SizeF) -> Result<SvgDocument> {
        let default_size = usvg::Size::from_wh(viewport.width, viewport.height).check(Status::InvalidArg)?;
        let resources_dir = std::fs::canonicalize(stream.path())
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));
        let data = stream.read_all()?;

        let mut options = usvg::Options::default();
        options.default_size = default_size;
        options.resources_dir = resources_dir;
        options.fontdb = self.target.fontdb.clone();

        let tree = match Tree::from_data(&data, &options) {
            Ok(tree) => tree,
            Err(e) => {
                let status = match e {
                    usvg::Error::InvalidSize => Status::InvalidSize,
                    _ => Status::InvalidMarkup,
                };
                self.target
                    .validator
                    .report(Level::Error, format_args!("svg rejected: {}", e));
                return Err(GraphicsError::with_source(status, e));
            }
        };

        let size = tree.size();
        let (fx, fy) = root_fractions(&data);
        let fit = (
            fx.map_or(1.0, |f| viewport.width * f / size.width()),
            fy.map_or(1.0, |f| viewport.height * f / size.height()),
        );
        let doc = SvgDocument {
            tree,
            owner: self.id,
            fit,
        };
        let size = doc.size();
        self.target.validator.report(
            Level::Info,
            format_args!("loaded svg document {}x{}", size.width, size.height),
        );
        Ok(doc)
    }

    /// Open a drawing transaction on the target.
    pub fn begin_draw(&mut self) -> DrawPass<'_> {
        let (sx, sy) = (self.target.dpi.0 / DEFAULT_DPI, self.target.dpi.1 / DEFAULT_DPI);
        self.target
            .validator
            .report(Level::Trace, format_args!("begin_draw on context {}", self.id));
        DrawPass {
            surface: &mut *self.target.surface,
            transform: Transform::from_scale(sx, sy),
            context: self.id,
            validator: self.target.validator,
            failure: None,
            commands: 0,
            ended: false,
        }
    }
}

/// An open drawing transaction.
///
/// Commands issued after the first failure are skipped. The failure is only
/// reported by [`end_draw`](DrawPass::end_draw).
pub struct DrawPass<'p> {
    surface: &'p mut Pixmap,
    transform: Transform,
    context: u64,
    validator: Validator,
    failure: Option<Status>,
    commands: usize,
    ended: bool,
}

impl<'p> DrawPass<'p> {
    pub fn clear(&mut self, color: ColorF) {
        if self.skip("clear") {
            return;
        }
        match Color::from_rgba(color.r, color.g, color.b, color.a) {
            Some(color) => self.surface.fill(color),
            None => self.fail(Status::InvalidArg, "clear"),
        }
    }

    pub fn draw_svg_document(&mut self, doc: &SvgDocument) {
        if self.skip("draw_svg_document") {
            return;
        }
        if doc.owner != self.context {
            self.fail(Status::WrongFactory, "draw_svg_document");
            return;
        }
        let transform = self.transform.pre_scale(doc.fit.0, doc.fit.1);
        resvg::render(&doc.tree, transform, &mut self.surface.as_mut());
    }

    /// Close the transaction and report the first failure recorded in it.
    #[track_caller]
    pub fn end_draw(mut self) -> Result<()> {
        self.ended = true;
        self.validator.report(
            Level::Trace,
            format_args!("end_draw after {} commands", self.commands),
        );
        match self.failure.take() {
            Some(status) => Err(GraphicsError::new(status)),
            None => Ok(()),
        }
    }

    fn skip(&mut self, command: &str) -> bool {
        self.commands += 1;
        if self.failure.is_some() {
            self.validator.report(
                Level::Debug,
                format_args!("{} skipped, pass already failed", command),
            );
            return true;
        }
        self.validator.report(Level::Trace, format_args!("{}", command));
        false
    }

    fn fail(&mut self, status: Status, command: &str) {
        self.validator
            .report(Level::Error, format_args!("{} failed: {}", command, status));
        self.failure = Some(status);
    }
}

impl Drop for DrawPass<'_> {
    fn drop(&mut self) {
        if !self.ended {
            warn!(
                "draw pass on context {} dropped without end_draw; {} discarded",
                self.context,
                self.failure.map_or("nothing".to_string(), |s| s.to_string())
            );
        }
    }
}
