//! PNG validation and all-or-nothing output writes.

use std::io::{Cursor, Write};
use std::path::Path;

use image::{ImageFormat, ImageReader};
use tracing::debug;

use layoutshot_core::{Error, Result};

/// Decode the PNG header and return `(width, height)`.
pub fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png)
        .into_dimensions()
        .map_err(|e| Error::Capture(format!("browser returned an invalid PNG: {}", e)))
}

/// Write `bytes` to `path` via a temp file in the same directory and a rename.
///
/// An existing file at `path` is replaced only once the new content is fully
/// on disk; on failure it is left untouched and the temp file is removed.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_err = |source: std::io::Error| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut file = tempfile::Builder::new()
        .prefix(".layoutshot-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(write_err)?;
    }

    file.persist(path).map_err(|e| write_err(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
