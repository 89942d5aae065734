#[macro_use]
extern crate log;

mod error;
pub mod graphics;
pub mod imaging;
pub mod runtime;
pub mod stream;

use std::path::Path;

pub use crate::error::{GraphicsError, Result, Status};
pub use crate::runtime::{Runtime, RuntimeOptions};

use crate::graphics::{
    ColorF, FactoryOptions, GraphicsFactory, RenderTargetProperties, SizeF, ValidationLevel,
};
use crate::imaging::{
    CacheOption, ContainerFormat, EncoderCacheOption, ImagingFactory, PixelFormat,
};
use crate::stream::InputStream;

pub const WIDTH: u32 = 400;
pub const HEIGHT: u32 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            width: WIDTH,
            height: HEIGHT,
        }
    }
}

/// Render `svg_path` onto a 400x400 transparent surface and save it as PNG.
pub fn convert(runtime: &Runtime, svg_path: &Path, output_path: &Path) -> Result<()> {
    convert_with(runtime, svg_path, output_path, &ConvertOptions::default())
}

/// Same as [`convert`] with an explicit surface size.
///
/// The document is drawn at its own size; content beyond the surface is
/// cropped rather than scaled to fit.
pub fn convert_with(
    runtime: &Runtime,
    svg_path: &Path,
    output_path: &Path,
    options: &ConvertOptions,
) -> Result<()> {
    let (width, height) = (options.width, options.height);
    info!(
        "converting {} -> {} ({}x{})",
        svg_path.display(),
        output_path.display(),
        width,
        height
    );

    let imaging = ImagingFactory::new(runtime)?;
    let mut bitmap = imaging.create_bitmap(
        width,
        height,
        PixelFormat::Rgba32Premultiplied,
        CacheOption::OnDemand,
    )?;

    let graphics = GraphicsFactory::new(
        runtime,
        FactoryOptions {
            validation_level: ValidationLevel::Informational,
        },
    )?;

    {
        let props = RenderTargetProperties {
            pixel_format: PixelFormat::Rgba32Premultiplied,
            ..RenderTargetProperties::default()
        };
        let target = graphics.create_bitmap_render_target(&mut bitmap, &props)?;
        let mut context = target.into_device_context()?;

        let stream = InputStream::open(svg_path)?;
        let document =
            context.create_svg_document(stream, SizeF::new(width as f32, height as f32))?;

        let mut pass = context.begin_draw();
        pass.clear(ColorF::TRANSPARENT);
        pass.draw_svg_document(&document);
        pass.end_draw()?;
    }

    let stream = imaging
        .create_stream()?
        .initialize_from_filename(output_path)?;

    let mut encoder = imaging.create_encoder(ContainerFormat::Png)?;
    encoder.initialize(stream, EncoderCacheOption::NoCache)?;

    let mut frame = encoder.create_new_frame()?;
    frame.initialize(None)?;
    frame.write_source(&bitmap, None)?;
    frame.commit()?;
    encoder.commit()?;

    info!("wrote {}", output_path.display());
    Ok(())
}
