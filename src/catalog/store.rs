use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use super::{CatalogError, ReleaseCatalog};

/// A catalog needs rebuilding when it is missing or at least `max_age` old.
/// A modification time in the future counts as fresh.
pub fn needs_refresh(path: &Path, max_age: Duration, now: SystemTime) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|meta| meta.modified()) else {
        return true;
    };

    match now.duration_since(modified) {
        Ok(age) => age >= max_age,
        Err(_) => false,
    }
}

pub fn load(path: &Path) -> Result<ReleaseCatalog, CatalogError> {
    let bytes = fs::read(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice(&bytes).map_err(|source| CatalogError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace the catalog file wholesale: write a sibling temp file, then rename.
pub fn save(catalog: &ReleaseCatalog, path: &Path) -> Result<(), CatalogError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CatalogError::Io { path, source }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let json = serde_json::to_vec_pretty(catalog).map_err(|source| CatalogError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("download");
    let mut file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
    file.write_all(&json).map_err(io_err(&tmp))?;
    drop(file);

    fs::rename(&tmp, path).map_err(io_err(path))
}
