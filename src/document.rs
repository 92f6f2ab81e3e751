use crate::config::MillConfig;
use crate::error::{io_error, MillError};
use crate::shared::random_hex;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Caller-supplied document: a workspace path or inline SVG text. Payload
/// fields stay optional so an absent payload surfaces as `MissingContent`
/// instead of a transport-level decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentRef {
    File {
        #[serde(default)]
        path: Option<String>,
    },
    Inline {
        #[serde(default)]
        svg: Option<String>,
    },
}

impl DocumentRef {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File {
            path: Some(path.into()),
        }
    }

    pub fn inline(svg: impl Into<String>) -> Self {
        Self::Inline {
            svg: Some(svg.into()),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }
}

/// A document pinned to a concrete on-disk path. Temporary files are created
/// here but deleted by the orchestrator.
#[derive(Debug)]
pub struct MaterializedDoc {
    pub path: PathBuf,
    pub temporary: bool,
}

pub fn materialize(
    doc: &DocumentRef,
    workspace: &Workspace,
    config: &MillConfig,
) -> Result<MaterializedDoc, MillError> {
    match doc {
        DocumentRef::File { path } => {
            let raw = path.as_deref().ok_or(MillError::MissingContent {
                detail: "file document requires a path",
            })?;
            let resolved = workspace.resolve(raw)?;
            let metadata = fs::metadata(&resolved).map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    MillError::NotFound {
                        path: raw.to_string(),
                    }
                } else {
                    io_error(&resolved, err)
                }
            })?;
            if metadata.len() > config.max_file_size {
                return Err(MillError::TooLarge {
                    size: metadata.len(),
                    limit: config.max_file_size,
                });
            }
            Ok(MaterializedDoc {
                path: resolved,
                temporary: false,
            })
        }
        DocumentRef::Inline { svg } => {
            let content = svg.as_deref().ok_or(MillError::MissingContent {
                detail: "inline document requires svg content",
            })?;
            let size = content.len() as u64;
            if size > config.max_file_size {
                return Err(MillError::TooLarge {
                    size,
                    limit: config.max_file_size,
                });
            }
            let name = format!(
                "inline-{}.svg",
                random_hex().map_err(|err| io_error(workspace.root(), err))?
            );
            let path = workspace.root().join(name);
            fs::write(&path, content).map_err(|err| io_error(&path, err))?;
            Ok(MaterializedDoc {
                path,
                temporary: true,
            })
        }
    }
}
