use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Check, GraphicsError, Result, Status};

/// Read-only byte stream over an input file.
pub struct InputStream {
    path: PathBuf,
    file: File,
}

impl InputStream {
    #[track_caller]
    pub fn open(path: impl AsRef<Path>) -> Result<InputStream> {
        let path = path.as_ref();
        let file = match OpenOptions::new().read(true).open(path) {
            Ok(file) => file,
            Err(e) => return Err(open_failed(path, e)),
        };
        debug!("opened {} for reading", path.display());
        Ok(InputStream {
            path: path.to_owned(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn read_all(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        if let Err(e) = self.file.read_to_end(&mut data) {
            return Err(GraphicsError::with_source(Status::from_io(&e), e));
        }
        Ok(data)
    }
}

/// Write-side stream handed out by the imaging factory.
///
/// It is created unbound and must be initialized with a destination before an
/// encoder can use it.
#[derive(Default)]
pub struct OutputStream {
    sink: Option<BufWriter<File>>,
    written: u64,
}

impl OutputStream {
    /// Create or truncate `path` and bind the stream to it.
    #[track_caller]
    pub fn initialize_from_filename(mut self, path: impl AsRef<Path>) -> Result<OutputStream> {
        let path = path.as_ref();
        if self.sink.is_some() {
            return Err(GraphicsError::new(Status::WrongState));
        }
        let file = match File::create(path) {
            Ok(file) => file,
            Err(e) => return Err(open_failed(path, e)),
        };
        debug!("opened {} for writing", path.display());
        self.sink = Some(BufWriter::new(file));
        Ok(self)
    }

    pub fn is_bound(&self) -> bool {
        self.sink.is_some()
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let sink = self.sink.as_mut().check(Status::NotInitialized)?;
        sink.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        let sink = self.sink.as_mut().check(Status::NotInitialized)?;
        sink.flush()?;
        sink.get_ref().sync_data().or_else(ignore_unsupported)?;
        Ok(())
    }
}

/// A missing parent directory is reported as `PathNotFound`, a missing
/// file inside an existing one as `FileNotFound`.
#[track_caller]
fn open_failed(path: &Path, err: io::Error) -> GraphicsError {
    let status = match path.parent() {
        Some(dir)
            if err.kind() == io::ErrorKind::NotFound
                && !dir.as_os_str().is_empty()
                && !dir.is_dir() =>
        {
            Status::PathNotFound
        }
        _ => Status::from_io(&err),
    };
    GraphicsError::with_source(status, err)
}

fn ignore_unsupported(err: io::Error) -> io::Result<()> {
    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported => Ok(()),
        _ => Err(err),
    }
}
