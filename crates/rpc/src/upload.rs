//! Staging of uploaded batch files.
//!
//! Each request writes its upload to its own temporary file inside the
//! configured upload directory. The file is removed when the
//! [`StagedUpload`] is discarded or dropped, so concurrent requests never
//! observe each other's data and nothing is left behind on failure.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

const STAGED_PREFIX: &str = "upload-";
const CSV_SUFFIX: &str = ".csv";

/// Accept only filenames that end in `.csv`, compared case-sensitively.
pub fn is_csv_filename(name: Option<&str>) -> bool {
    name.map_or(false, |name| name.ends_with(CSV_SUFFIX))
}

#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    /// Write `bytes` to a fresh file in `dir`.
    pub fn create(dir: &Path, bytes: &[u8]) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(STAGED_PREFIX)
            .suffix(CSV_SUFFIX)
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Remove the staged file, reporting failures that a drop would swallow.
    pub fn discard(self) -> io::Result<()> {
        self.file.close()
    }
}
