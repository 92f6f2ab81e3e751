use crate::export::{ExportArea, ExportSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod lock;
pub mod runner;

pub use lock::LockFile;
pub use runner::{run_engine, EngineOutput};

/// A fully built engine invocation: binary plus argv, no shell involved.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub binary: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn display_form(&self) -> String {
        format!("{} {}", self.binary, self.args.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInfo {
    pub id: String,
    pub doc: String,
}

/// Builds the batch invocation for a validated action sequence. Export
/// sub-steps are appended as additional actions targeting the temporary
/// path; the engine never writes the final destination itself.
pub fn run_command(
    binary: &str,
    infile: &Path,
    actions: &[String],
    export: Option<(&ExportSpec, &Path)>,
) -> EngineCommand {
    let mut acts: Vec<String> = Vec::new();
    if actions
        .iter()
        .any(|a| a.starts_with("select-") || a.starts_with("query-"))
    {
        acts.push("select-clear".to_string());
    }
    acts.extend(actions.iter().cloned());

    if let Some((spec, tmp_export)) = export {
        acts.push(
            match spec.area {
                ExportArea::Page => "export-area-page",
                ExportArea::Drawing => "export-area-drawing",
            }
            .to_string(),
        );
        acts.push(format!("export-type:{}", spec.format.as_str()));
        acts.push(format!("export-filename:{}", tmp_export.display()));
        if let Some(dpi) = spec.dpi.filter(|dpi| *dpi > 0) {
            acts.push(format!("export-dpi:{dpi}"));
        }
        acts.push("export-do".to_string());
    }

    // The engine closes the document itself; file-close is unreliable in
    // batch mode.
    EngineCommand {
        binary: binary.to_string(),
        args: vec![
            infile.display().to_string(),
            format!("--actions={}", acts.join(";")),
            "--batch-process".to_string(),
        ],
    }
}

pub fn action_list_command(binary: &str) -> EngineCommand {
    EngineCommand {
        binary: binary.to_string(),
        args: vec!["--action-list".to_string()],
    }
}

/// Parses `<id> : <description>` lines from the engine's action listing;
/// anything else is noise and skipped.
pub fn parse_action_list(stdout: &str) -> Vec<ActionInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            line.split_once(" : ").map(|(id, doc)| ActionInfo {
                id: id.trim().to_string(),
                doc: doc.trim().to_string(),
            })
        })
        .collect()
}
