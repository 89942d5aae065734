//! Bitmap surfaces and the PNG encoder.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tiny_skia::Pixmap;

use crate::error::{Check, GraphicsError, Result, Status};
use crate::runtime::Runtime;
use crate::stream::OutputStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Inherit the format of whatever the value is bound to.
    Unknown,
    /// 32 bits per pixel, 8-bit RGBA, color premultiplied by alpha.
    Rgba32Premultiplied,
    /// 32 bits per pixel, 8-bit RGBA, straight alpha.
    Rgba32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOption {
    /// Pixel memory is allocated on first write access.
    OnDemand,
    /// Pixel memory is allocated when the bitmap is created.
    OnLoad,
}

/// A fixed size, pixel addressable surface.
pub struct Bitmap {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixmap: Option<Pixmap>,
}

impl Bitmap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn is_realized(&self) -> bool {
        self.pixmap.is_some()
    }

    /// Premultiplied RGBA bytes, or `None` while no memory backs the bitmap.
    pub fn data(&self) -> Option<&[u8]> {
        self.pixmap.as_ref().map(|p| p.data())
    }

    /// Straight-alpha RGBA value of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        match self.pixmap {
            Some(ref pixmap) => {
                let c = pixmap.pixel(x, y)?.demultiply();
                Some([c.red(), c.green(), c.blue(), c.alpha()])
            }
            None => Some([0; 4]),
        }
    }

    pub(crate) fn realize(&mut self) -> Result<&mut Pixmap> {
        if self.pixmap.is_none() {
            let pixmap = Pixmap::new(self.width, self.height).check(Status::OutOfMemory)?;
            trace!("realized {}x{} bitmap", self.width, self.height);
            self.pixmap = Some(pixmap);
        }
        self.pixmap.as_mut().check(Status::WrongState)
    }

    fn straight_rgba(&self, rect: PixelRect) -> Vec<u8> {
        let mut out = Vec::with_capacity(rect.width as usize * rect.height as usize * 4);
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                out.extend_from_slice(&self.pixel(x, y).unwrap_or([0; 4]));
            }
        }
        out
    }
}

/// Pixel rectangle within a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    fn fits(&self, bitmap: &Bitmap) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).map_or(false, |r| r <= bitmap.width)
            && self.y.checked_add(self.height).map_or(false, |b| b <= bitmap.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Png,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderCacheOption {
    /// Committed frames go straight to the stream.
    NoCache,
    /// Committed frames are held until the encoder commits.
    InMemory,
}

/// Creates bitmaps, output streams and encoders.
pub struct ImagingFactory<'r> {
    _runtime: &'r Runtime,
}

impl<'r> ImagingFactory<'r> {
    pub fn new(runtime: &'r Runtime) -> Result<ImagingFactory<'r>> {
        debug!("imaging factory created");
        Ok(ImagingFactory { _runtime: runtime })
    }

    #[track_caller]
    pub fn create_bitmap(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        cache: CacheOption,
    ) -> Result<Bitmap> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::new(Status::InvalidArg));
        }
        if format != PixelFormat::Rgba32Premultiplied {
            return Err(GraphicsError::new(Status::UnsupportedPixelFormat));
        }
        let mut bitmap = Bitmap {
            width,
            height,
            format,
            pixmap: None,
        };
        if cache == CacheOption::OnLoad {
            bitmap.realize()?;
        }
        debug!("created {}x{} bitmap ({:?})", width, height, cache);
        Ok(bitmap)
    }

    pub fn create_stream(&self) -> Result<OutputStream> {
        Ok(OutputStream::default())
    }

    pub fn create_encoder(&self, format: ContainerFormat) -> Result<Encoder> {
        Ok(Encoder {
            format,
            stream: None,
            cache: EncoderCacheOption::NoCache,
            pending: Vec::new(),
            committed: 0,
        })
    }
}

/// Writes a container (PNG) to an output stream.
pub struct Encoder {
    format: ContainerFormat,
    stream: Option<OutputStream>,
    cache: EncoderCacheOption,
    pending: Vec<Vec<u8>>,
    committed: usize,
}

impl Encoder {
    #[track_caller]
    pub fn initialize(&mut self, stream: OutputStream, cache: EncoderCacheOption) -> Result<()> {
        if self.stream.is_some() {
            return Err(GraphicsError::new(Status::WrongState));
        }
        if !stream.is_bound() {
            return Err(GraphicsError::new(Status::NotInitialized));
        }
        self.stream = Some(stream);
        self.cache = cache;
        Ok(())
    }

    /// Start a new frame. PNG holds a single image, so a second frame is
    /// rejected once the first has been committed.
    #[track_caller]
    pub fn create_new_frame(&mut self) -> Result<Frame<'_>> {
        if self.stream.is_none() {
            return Err(GraphicsError::new(Status::NotInitialized));
        }
        if self.committed > 0 {
            return Err(GraphicsError::new(Status::WrongState));
        }
        Ok(Frame {
            encoder: self,
            state: FrameState::Created,
            options: FrameOptions::default(),
            encoded: None,
        })
    }

    fn accept(&mut self, bytes: Vec<u8>) -> Result<()> {
        match self.cache {
            EncoderCacheOption::NoCache => {
                let stream = self.stream.as_mut().check(Status::NotInitialized)?;
                stream.write_bytes(&bytes)?;
            }
            EncoderCacheOption::InMemory => self.pending.push(bytes),
        }
        self.committed += 1;
        Ok(())
    }

    /// Write everything still buffered and flush the stream.
    #[track_caller]
    pub fn commit(mut self) -> Result<()> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => return Err(GraphicsError::new(Status::NotInitialized)),
        };
        if self.committed == 0 {
            return Err(GraphicsError::new(Status::FrameMissing));
        }
        for bytes in self.pending.drain(..) {
            stream.write_bytes(&bytes)?;
        }
        stream.flush()?;
        info!("encoder committed {} bytes", stream.bytes_written());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOptions {
    /// Requested frame format. `None` adopts the source's format.
    pub pixel_format: Option<PixelFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Created,
    Initialized,
    SourceWritten,
}

/// One image inside an encoder.
pub struct Frame<'e> {
    encoder: &'e mut Encoder,
    state: FrameState,
    options: FrameOptions,
    encoded: Option<Vec<u8>>,
}

impl<'e> Frame<'e> {
    #[track_caller]
    pub fn initialize(&mut self, options: Option<FrameOptions>) -> Result<()> {
        if self.state != FrameState::Created {
            return Err(GraphicsError::new(Status::WrongState));
        }
        self.options = options.unwrap_or_default();
        self.state = FrameState::Initialized;
        Ok(())
    }

    /// Encode `bitmap`, or the `region` of it, as this frame's image.
    #[track_caller]
    pub fn write_source(&mut self, bitmap: &Bitmap, region: Option<PixelRect>) -> Result<()> {
        if self.state != FrameState::Initialized {
            return Err(GraphicsError::new(Status::WrongState));
        }
        match self.options.pixel_format {
            Some(format) if format != bitmap.format() => {
                return Err(GraphicsError::new(Status::UnsupportedPixelFormat));
            }
            _ => {}
        }
        let rect = region.unwrap_or(PixelRect {
            x: 0,
            y: 0,
            width: bitmap.width(),
            height: bitmap.height(),
        });
        if !rect.fits(bitmap) {
            return Err(GraphicsError::new(Status::InvalidArg));
        }

        let rgba = bitmap.straight_rgba(rect);
        let mut encoded = Vec::new();
        let result = match self.encoder.format {
            ContainerFormat::Png => PngEncoder::new(&mut encoded).write_image(
                &rgba,
                rect.width,
                rect.height,
                ExtendedColorType::Rgba8,
            ),
        };
        if let Err(e) = result {
            return Err(GraphicsError::with_source(Status::CodecFailure, e));
        }

        trace!("encoded {}x{} frame into {} bytes", rect.width, rect.height, encoded.len());
        self.encoded = Some(encoded);
        self.state = FrameState::SourceWritten;
        Ok(())
    }

    #[track_caller]
    pub fn commit(self) -> Result<()> {
        let Frame { encoder, encoded, .. } = self;
        match encoded {
            Some(bytes) => encoder.accept(bytes),
            None => Err(GraphicsError::new(Status::WrongState)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeOptions;

    fn runtime() -> Runtime {
        Runtime::initialize(&RuntimeOptions {
            system_fonts: false,
            font_dirs: Vec::new(),
        })
        .unwrap()
    }

    fn bound_stream(dir: &tempfile::TempDir, name: &str) -> OutputStream {
        OutputStream::default()
            .initialize_from_filename(dir.path().join(name))
            .unwrap()
    }

    #[test]
    fn on_demand_bitmap_is_lazy() {
        let rt = runtime();
        let factory = ImagingFactory::new(&rt).unwrap();
        let mut bitmap = factory
            .create_bitmap(8, 4, PixelFormat::Rgba32Premultiplied, CacheOption::OnDemand)
            .unwrap();
        assert!(!bitmap.is_realized());
        assert_eq!(bitmap.pixel(7, 3), Some([0; 4]));
        assert_eq!(bitmap.pixel(8, 0), None);

        bitmap.realize().unwrap();
        assert!(bitmap.is_realized());
        assert_eq!(bitmap.data().map(|d| d.len()), Some(8 * 4 * 4));

        let eager = factory
            .create_bitmap(2, 2, PixelFormat::Rgba32Premultiplied, CacheOption::OnLoad)
            .unwrap();
        assert!(eager.is_realized());
    }

    #[test]
    fn bitmap_arguments_are_validated() {
        let rt = runtime();
        let factory = ImagingFactory::new(&rt).unwrap();
        let err = factory
            .create_bitmap(0, 4, PixelFormat::Rgba32Premultiplied, CacheOption::OnDemand)
            .err()
            .unwrap();
        assert_eq!(err.status(), Status::InvalidArg);
        let err = factory
            .create_bitmap(4, 4, PixelFormat::Rgba32, CacheOption::OnDemand)
            .err()
            .unwrap();
        assert_eq!(err.status(), Status::UnsupportedPixelFormat);
    }

    #[test]
    fn frame_must_be_initialized_before_source() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let factory = ImagingFactory::new(&rt).unwrap();
        let bitmap = factory
            .create_bitmap(4, 4, PixelFormat::Rgba32Premultiplied, CacheOption::OnDemand)
            .unwrap();
        let mut encoder = factory.create_encoder(ContainerFormat::Png).unwrap();
        encoder
            .initialize(bound_stream(&dir, "a.png"), EncoderCacheOption::NoCache)
            .unwrap();

        let mut frame = encoder.create_new_frame().unwrap();
        let err = frame.write_source(&bitmap, None).unwrap_err();
        assert_eq!(err.status(), Status::WrongState);
    }

    #[test]
    fn frame_without_source_cannot_commit() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let factory = ImagingFactory::new(&rt).unwrap();
        let mut encoder = factory.create_encoder(ContainerFormat::Png).unwrap();
        encoder
            .initialize(bound_stream(&dir, "a.png"), EncoderCacheOption::NoCache)
            .unwrap();
        let mut frame = encoder.create_new_frame().unwrap();
        frame.initialize(None).unwrap();
        assert_eq!(frame.commit().unwrap_err().status(), Status::WrongState);
        assert_eq!(encoder.commit().unwrap_err().status(), Status::FrameMissing);
    }

    #[test]
    fn encoder_needs_a_bound_stream() {
        let rt = runtime();
        let factory = ImagingFactory::new(&rt).unwrap();
        let mut encoder = factory.create_encoder(ContainerFormat::Png).unwrap();
        assert_eq!(
            encoder.create_new_frame().err().unwrap().status(),
            Status::NotInitialized
        );
        let unbound = factory.create_stream().unwrap();
        assert_eq!(
            encoder
                .initialize(unbound, EncoderCacheOption::NoCache)
                .unwrap_err()
                .status(),
            Status::NotInitialized
        );
        assert_eq!(encoder.commit().unwrap_err().status(), Status::NotInitialized);
    }

    #[test]
    fn region_and_format_are_checked() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let factory = ImagingFactory::new(&rt).unwrap();
        let bitmap = factory
            .create_bitmap(4, 4, PixelFormat::Rgba32Premultiplied, CacheOption::OnDemand)
            .unwrap();
        let mut encoder = factory.create_encoder(ContainerFormat::Png).unwrap();
        encoder
            .initialize(bound_stream(&dir, "a.png"), EncoderCacheOption::NoCache)
            .unwrap();

        let mut frame = encoder.create_new_frame().unwrap();
        frame.initialize(None).unwrap();
        let outside = PixelRect { x: 2, y: 2, width: 3, height: 1 };
        assert_eq!(
            frame.write_source(&bitmap, Some(outside)).unwrap_err().status(),
            Status::InvalidArg
        );

        let mut frame = encoder.create_new_frame().unwrap();
        frame
            .initialize(Some(FrameOptions { pixel_format: Some(PixelFormat::Rgba32) }))
            .unwrap();
        assert_eq!(
            frame.write_source(&bitmap, None).unwrap_err().status(),
            Status::UnsupportedPixelFormat
        );
    }

    #[test]
    fn png_holds_demultiplied_pixels() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let factory = ImagingFactory::new(&rt).unwrap();
        let mut bitmap = factory
            .create_bitmap(3, 2, PixelFormat::Rgba32Premultiplied, CacheOption::OnDemand)
            .unwrap();
        let half_red = tiny_skia::Color::from_rgba8(255, 0, 0, 128);
        bitmap.realize().unwrap().fill(half_red);

        let mut encoder = factory.create_encoder(ContainerFormat::Png).unwrap();
        encoder
            .initialize(bound_stream(&dir, "red.png"), EncoderCacheOption::InMemory)
            .unwrap();
        let mut frame = encoder.create_new_frame().unwrap();
        frame.initialize(None).unwrap();
        frame.write_source(&bitmap, None).unwrap();
        frame.commit().unwrap();
        assert_eq!(
            encoder.create_new_frame().err().unwrap().status(),
            Status::WrongState
        );
        encoder.commit().unwrap();

        let decoded = image::open(dir.path().join("red.png")).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        let px = decoded.get_pixel(1, 1).0;
        assert_eq!(px[3], 128);
        assert!(px[0] >= 254, "red channel was {}", px[0]);
        assert_eq!((px[1], px[2]), (0, 0));
    }

    #[test]
    fn region_limits_frame_size() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let factory = ImagingFactory::new(&rt).unwrap();
        let bitmap = factory
            .create_bitmap(10, 10, PixelFormat::Rgba32Premultiplied, CacheOption::OnDemand)
            .unwrap();
        let mut encoder = factory.create_encoder(ContainerFormat::Png).unwrap();
        encoder
            .initialize(bound_stream(&dir, "crop.png"), EncoderCacheOption::NoCache)
            .unwrap();
        let mut frame = encoder.create_new_frame().unwrap();
        frame.initialize(None).unwrap();
        let region = PixelRect { x: 2, y: 3, width: 5, height: 4 };
        frame.write_source(&bitmap, Some(region)).unwrap();
        frame.commit().unwrap();
        encoder.commit().unwrap();

        let decoded = image::open(dir.path().join("crop.png")).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 4));
    }
}
