use crate::error::{io_error, MillError};
use crate::shared::random_hex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Pdf,
    Svg,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Pdf => "pdf",
            Self::Svg => "svg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportArea {
    #[default]
    Page,
    Drawing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSpec {
    #[serde(rename = "type")]
    pub format: ExportFormat,
    pub out: String,
    #[serde(default)]
    pub dpi: Option<u32>,
    #[serde(default)]
    pub area: ExportArea,
}

/// Sibling temporary path for an export destination. The extension is
/// preserved because the engine infers the output type from it; the
/// `.tmp-<hex>` marker keeps orphans identifiable.
pub fn temp_export_path(final_path: &Path) -> Result<PathBuf, MillError> {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    let suffix = final_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let hex = random_hex().map_err(|err| io_error(final_path, err))?;
    let name = format!("{stem}.tmp-{hex}{suffix}");
    Ok(final_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(name))
}

/// Publishes a finished export with a single rename. The destination is
/// never visible until the rename lands; a successful run that produced no
/// artifact is a hard error.
pub fn publish(tmp: &Path, final_path: &Path) -> Result<(), MillError> {
    if !tmp.exists() {
        return Err(MillError::ExportMissing {
            path: tmp.display().to_string(),
        });
    }
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
    }
    fs::rename(tmp, final_path).map_err(|err| io_error(final_path, err))
}

/// Best-effort removal of a leftover temporary artifact during cleanup.
pub fn discard(tmp: &Path) {
    let _ = fs::remove_file(tmp);
}
