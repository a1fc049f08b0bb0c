use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Uploaded script copied into the tenant's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedScript {
    pub path: PathBuf,
    pub file_name: String,
}

/// Copies `source` to `<scripts_dir>/<tenant>/<file name>`. Only `.py` files
/// are accepted; an existing file of the same name is replaced.
pub fn stage_upload(scripts_dir: &Path, tenant: &str, source: &Path) -> io::Result<StagedScript> {
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| name.ends_with(".py"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "only .py files are accepted"))?
        .to_string();
    if tenant.is_empty() || tenant.contains(['/', '\\']) || tenant == "." || tenant == ".." {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid tenant id"));
    }

    let dir = scripts_dir.join(tenant);
    fs::create_dir_all(&dir)?;
    let path = dir.join(&file_name);
    if fs::canonicalize(source).ok() != fs::canonicalize(&path).ok() {
        fs::copy(source, &path)?;
    }
    Ok(StagedScript { path, file_name })
}
