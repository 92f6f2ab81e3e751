use crate::config::MillConfig;
use crate::document::{self, DocumentRef, MaterializedDoc};
use crate::dom::{DomEditor, SetOp};
use crate::engine::{self, runner, ActionInfo};
use crate::error::{io_error, MillError};
use crate::export::{self, ExportSpec};
use crate::policy;
use crate::shared::atomic_write_file;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed bound for the engine's own action enumeration.
const ACTION_LIST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub doc: DocumentRef,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub export: Option<ExportSpec>,
    #[serde(default)]
    pub timeout_s: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub ok: bool,
    pub out: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSetOutcome {
    pub ok: bool,
    pub changed: usize,
    pub out: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomCleanOutcome {
    pub ok: bool,
    pub out: String,
}

/// The request orchestrator: one handle constructed at process start, shared
/// by every caller. Holds the workspace guard, the admission gate, and the
/// optional DOM editing capability.
pub struct Service {
    config: MillConfig,
    workspace: Workspace,
    gate: Arc<Semaphore>,
    dom: Option<Arc<dyn DomEditor>>,
}

impl Service {
    pub fn new(config: MillConfig) -> Result<Self, MillError> {
        let workspace = Workspace::new(&config.workspace)?;
        let gate = Arc::new(Semaphore::new(config.max_concurrent));
        Ok(Self {
            config,
            workspace,
            gate,
            dom: None,
        })
    }

    pub fn with_dom_editor(mut self, editor: Arc<dyn DomEditor>) -> Self {
        self.dom = Some(editor);
        self
    }

    pub fn config(&self) -> &MillConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Enumerates the engine's available actions headless, bounded by a
    /// fixed short timeout.
    pub async fn list_actions(&self) -> Result<Vec<ActionInfo>, MillError> {
        let _permit = self.admit().await?;
        let command = engine::action_list_command(&self.config.engine_binary);
        let output =
            runner::run_engine(&command, self.workspace.root(), ACTION_LIST_TIMEOUT, None).await?;
        Ok(engine::parse_action_list(&output.stdout))
    }

    /// Runs a validated action sequence, optionally followed by an export
    /// publication. Every exit path runs cleanup: temporary inline input and
    /// leftover temporary export artifacts are removed, the admission slot
    /// and any exclusive lock are released.
    pub async fn run_actions(&self, request: RunRequest) -> Result<RunOutcome, MillError> {
        // Validation is atomic and precedes admission, so an unsafe request
        // is rejected even while the gate is saturated.
        policy::validate_actions(&request.actions)?;

        let timeout = request
            .timeout_s
            .map(Duration::from_secs)
            .unwrap_or(self.config.timeout_default);
        let _permit = self.admit().await?;

        let doc = document::materialize(&request.doc, &self.workspace, &self.config)?;
        let result = self.execute_run(&request, &doc, timeout).await;
        if doc.temporary {
            if let Err(err) = fs::remove_file(&doc.path) {
                tracing::warn!(op = "cleanup.inline", path = %doc.path.display(), %err, "failed to remove temporary input");
            }
        }
        result
    }

    async fn execute_run(
        &self,
        request: &RunRequest,
        doc: &MaterializedDoc,
        timeout: Duration,
    ) -> Result<RunOutcome, MillError> {
        let export_paths = match &request.export {
            Some(spec) => {
                let final_path = self.workspace.resolve(&spec.out)?;
                let tmp_path = export::temp_export_path(&final_path)?;
                // The engine writes the temporary sibling itself, so the
                // destination directory has to exist before the run.
                if let Some(parent) = tmp_path.parent() {
                    fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
                }
                Some((spec.clone(), final_path, tmp_path))
            }
            None => None,
        };

        let command = engine::run_command(
            &self.config.engine_binary,
            &doc.path,
            &request.actions,
            export_paths
                .as_ref()
                .map(|(spec, _, tmp)| (spec, tmp.as_path())),
        );

        // Exclusive lock only for real files; inline temporaries are unique
        // by construction.
        let exclusive = (!doc.temporary).then_some(doc.path.as_path());
        let run = runner::run_engine(&command, self.workspace.root(), timeout, exclusive).await;

        let outcome = match run {
            Ok(_) => match &export_paths {
                Some((_, final_path, tmp_path)) => export::publish(tmp_path, final_path)
                    .map(|()| RunOutcome {
                        ok: true,
                        out: Some(final_path.display().to_string()),
                    }),
                None => Ok(RunOutcome {
                    ok: true,
                    out: None,
                }),
            },
            Err(err) => Err(err),
        };

        if let Some((_, _, tmp_path)) = &export_paths {
            export::discard(tmp_path);
        }
        outcome
    }

    /// Checks that the document parses, without mutating anything.
    pub async fn dom_validate(&self, doc: &DocumentRef) -> Result<(), MillError> {
        let editor = self.dom_editor()?;
        let _permit = self.admit().await?;
        let text = self.load_document_text(doc)?;
        editor
            .validate(&text)
            .map_err(|reason| MillError::ExecutionFailed {
                detail: format!("document parse failed: {reason}"),
            })
    }

    /// Applies structured edits and atomically persists the result inside
    /// the workspace. All selectors are validated before the editor runs.
    pub async fn dom_set(
        &self,
        doc: &DocumentRef,
        ops: &[SetOp],
        save_as: &str,
    ) -> Result<DomSetOutcome, MillError> {
        for op in ops {
            policy::validate_selector(&op.selector.value)?;
        }
        let editor = self.dom_editor()?;
        let _permit = self.admit().await?;

        let text = self.load_document_text(doc)?;
        let edited = editor
            .apply(&text, ops)
            .map_err(|reason| MillError::ExecutionFailed {
                detail: format!("dom mutation failed: {reason}"),
            })?;

        let out_path = self.persist_text(save_as, &edited.svg)?;
        Ok(DomSetOutcome {
            ok: true,
            changed: edited.changed,
            out: out_path.display().to_string(),
        })
    }

    /// Runs the editor's cleanup pass and atomically persists the result.
    pub async fn dom_clean(
        &self,
        doc: &DocumentRef,
        save_as: &str,
    ) -> Result<DomCleanOutcome, MillError> {
        let editor = self.dom_editor()?;
        let _permit = self.admit().await?;

        let text = self.load_document_text(doc)?;
        let cleaned = editor
            .clean(&text)
            .map_err(|reason| MillError::ExecutionFailed {
                detail: format!("dom cleanup failed: {reason}"),
            })?;

        let out_path = self.persist_text(save_as, &cleaned)?;
        Ok(DomCleanOutcome {
            ok: true,
            out: out_path.display().to_string(),
        })
    }

    fn persist_text(&self, save_as: &str, text: &str) -> Result<PathBuf, MillError> {
        let out_path = self.workspace.resolve(save_as)?;
        atomic_write_file(&out_path, text.as_bytes()).map_err(|err| io_error(&out_path, err))?;
        Ok(out_path)
    }

    fn load_document_text(&self, doc: &DocumentRef) -> Result<String, MillError> {
        match doc {
            DocumentRef::File { path } => {
                let raw = path.as_deref().ok_or(MillError::MissingContent {
                    detail: "file document requires a path",
                })?;
                let resolved = self.workspace.resolve(raw)?;
                let metadata = fs::metadata(&resolved).map_err(|err| {
                    if err.kind() == io::ErrorKind::NotFound {
                        MillError::NotFound {
                            path: raw.to_string(),
                        }
                    } else {
                        io_error(&resolved, err)
                    }
                })?;
                if metadata.len() > self.config.max_file_size {
                    return Err(MillError::TooLarge {
                        size: metadata.len(),
                        limit: self.config.max_file_size,
                    });
                }
                fs::read_to_string(&resolved).map_err(|err| io_error(&resolved, err))
            }
            DocumentRef::Inline { svg } => {
                let content = svg.as_deref().ok_or(MillError::MissingContent {
                    detail: "inline document requires svg content",
                })?;
                let size = content.len() as u64;
                if size > self.config.max_file_size {
                    return Err(MillError::TooLarge {
                        size,
                        limit: self.config.max_file_size,
                    });
                }
                Ok(content.to_string())
            }
        }
    }

    fn dom_editor(&self) -> Result<&Arc<dyn DomEditor>, MillError> {
        self.dom.as_ref().ok_or_else(|| MillError::ExecutionFailed {
            detail: "no dom editor configured".to_string(),
        })
    }

    async fn admit(&self) -> Result<OwnedSemaphorePermit, MillError> {
        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MillError::ExecutionFailed {
                detail: "admission gate closed".to_string(),
            })?;
        tracing::debug!(op = "gate.admit", available = self.gate.available_permits(), "request admitted");
        Ok(permit)
    }
}
