//! Process-wide graphics subsystem.
//!
//! A [`Runtime`] is created once in `main` before the first conversion and
//! dropped after the last one. Factories borrow it, so no graphics object can
//! outlive the subsystem that backs it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use usvg::fontdb::Database;

use crate::error::{GraphicsError, Result, Status};

static LIVE: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Load the fonts installed on the host for SVG `<text>`.
    pub system_fonts: bool,
    /// Extra directories scanned for font files.
    pub font_dirs: Vec<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            system_fonts: true,
            font_dirs: Vec::new(),
        }
    }
}

pub struct Runtime {
    fontdb: Arc<Database>,
}

impl Runtime {
    pub fn initialize(options: &RuntimeOptions) -> Result<Runtime> {
        let mut fontdb = Database::new();
        if options.system_fonts {
            fontdb.load_system_fonts();
        }
        for dir in &options.font_dirs {
            if !dir.is_dir() {
                return Err(GraphicsError::new(Status::PathNotFound));
            }
            fontdb.load_fonts_dir(dir);
        }

        let live = LIVE.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("graphics subsystem initialized ({} fonts, {} live)", fontdb.len(), live);

        Ok(Runtime {
            fontdb: Arc::new(fontdb),
        })
    }

    pub(crate) fn fontdb(&self) -> Arc<Database> {
        self.fontdb.clone()
    }

    /// Number of runtimes currently alive in this process.
    pub fn live() -> usize {
        LIVE.load(Ordering::SeqCst)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let live = LIVE.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("graphics subsystem torn down ({} live)", live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> RuntimeOptions {
        RuntimeOptions {
            system_fonts: false,
            font_dirs: Vec::new(),
        }
    }

    #[test]
    fn missing_font_dir_fails() {
        let options = RuntimeOptions {
            font_dirs: vec![PathBuf::from("/definitely/not/a/font/dir")],
            ..bare()
        };
        let err = Runtime::initialize(&options).err().unwrap();
        assert_eq!(err.status(), Status::PathNotFound);
    }

    #[test]
    fn empty_font_dir_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let options = RuntimeOptions {
            font_dirs: vec![dir.path().to_path_buf()],
            ..bare()
        };
        let runtime = Runtime::initialize(&options).unwrap();
        assert_eq!(runtime.fontdb().len(), 0);
        assert!(Runtime::live() >= 1);
    }
}
