use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};

use super::Tool;

const MAX_LIST_ENTRIES: usize = 500;

/// Resolve a model-supplied relative path against the workspace root.
/// Absolute paths and parent-directory traversal are rejected.
fn resolve(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        anyhow::bail!("absolute paths are not allowed: {}", relative);
    }
    for component in candidate.components() {
        if matches!(component, Component::ParentDir) {
            anyhow::bail!("path escapes the workspace: {}", relative);
        }
    }
    Ok(root.join(candidate))
}

pub struct FileRead {
    root: PathBuf,
}

impl FileRead {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for FileRead {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a file from the workspace. Path is relative to the workspace root."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative path to the file"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            path: String,
        }

        let args: Args = serde_json::from_value(args)?;
        let path = resolve(&self.root, &args.path)?;
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {}", args.path))?;

        Ok(serde_json::json!({
            "path": args.path,
            "content": content,
            "lines": content.lines().count(),
        }))
    }
}

pub struct FileWrite {
    root: PathBuf,
}

impl FileWrite {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for FileWrite {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write or overwrite an entire file in the workspace. Creates parent directories if needed."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative path"},
                "content": {"type": "string"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            path: String,
            content: String,
        }

        let args: Args = serde_json::from_value(args)?;
        let path = resolve(&self.root, &args.path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for: {}", args.path))?;
        }
        fs::write(&path, &args.content)
            .with_context(|| format!("Failed to write file: {}", args.path))?;

        Ok(serde_json::json!({
            "path": args.path,
            "bytes_written": args.content.len(),
        }))
    }
}

pub struct FileList {
    root: PathBuf,
}

impl FileList {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
        if out.len() >= MAX_LIST_ENTRIES {
            return Ok(());
        }
        let mut entries: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("Failed to list directory: {}", prefix))?
            .filter_map(|e| e.ok())
            .collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if out.len() >= MAX_LIST_ENTRIES {
                break;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let rel = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                out.push(format!("{}/", rel));
                self.walk(&entry.path(), &rel, out)?;
            } else {
                out.push(rel);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for FileList {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List files under a workspace directory, recursively. Hidden entries are skipped."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative directory (defaults to the root)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            path: Option<String>,
        }

        let args: Args = serde_json::from_value(args)?;
        let relative = args.path.unwrap_or_default();
        let dir = if relative.is_empty() {
            self.root.clone()
        } else {
            resolve(&self.root, &relative)?
        };

        let mut entries = Vec::new();
        self.walk(&dir, &relative, &mut entries)?;

        Ok(serde_json::json!({
            "path": relative,
            "entries": entries,
            "truncated": entries.len() >= MAX_LIST_ENTRIES,
        }))
    }
}
