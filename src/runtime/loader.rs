use anyhow::{Result, Context as AnyhowContext};
use std::path::Path;
use crate::runtime::task::PathPair;

/// Loads a task list: a sequence of `[pre_path, post_path]` pairs in
/// JSON, or YAML when the file extension says so.
pub fn load_task_list(file_path: impl AsRef<Path>) -> Result<Vec<PathPair>> {
    let file_path = file_path.as_ref();
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read task list from {}", file_path.display()))?;

    let is_yaml = file_path
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");

    let pairs: Vec<PathPair> = if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to deserialize YAML task list from {}", file_path.display()))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to deserialize JSON task list from {}", file_path.display()))?
    };

    Ok(pairs)
}
