//! File persistence tool — write or append text with path validation.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use stringer_core::error::ToolError;
use stringer_core::tool::Tool;

pub struct SaveFileTool {
    /// Allowed root directories. Empty = allow all.
    pub allowed_roots: Vec<String>,
    /// Forbidden path prefixes.
    pub forbidden_paths: Vec<String>,
}

impl SaveFileTool {
    /// Create a save tool with no path restrictions.
    pub fn new() -> Self {
        Self {
            allowed_roots: Vec::new(),
            forbidden_paths: Vec::new(),
        }
    }

    /// Create a save tool with path restrictions.
    pub fn with_restrictions(allowed_roots: Vec<String>, forbidden_paths: Vec<String>) -> Self {
        Self {
            allowed_roots,
            forbidden_paths,
        }
    }

    /// Validate a destination path against the restriction policy.
    ///
    /// Rejects traversal sequences outright, then checks forbidden prefixes
    /// and (when configured) allowed roots on the normalized path.
    fn validate_path(&self, path: &str) -> Result<(), String> {
        let normalized = path.replace('\\', "/");
        if normalized.contains("../") || normalized.contains("/..") || normalized == ".." {
            return Err(format!("Path traversal detected in '{path}'"));
        }

        let lowered = normalized.to_lowercase();
        for forbidden in &self.forbidden_paths {
            let prefix = forbidden.replace('\\', "/").to_lowercase();
            if lowered.starts_with(&prefix) {
                return Err(format!("Path '{path}' matches forbidden prefix '{forbidden}'"));
            }
        }

        if !self.allowed_roots.is_empty() {
            let allowed = self.allowed_roots.iter().any(|root| {
                let prefix = root.replace('\\', "/").to_lowercase();
                lowered.starts_with(&prefix)
            });
            if !allowed {
                return Err(format!("Path '{path}' is outside allowed roots"));
            }
        }

        Ok(())
    }
}

impl Default for SaveFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SaveFileTool {
    fn name(&self) -> &str {
        "save_file"
    }

    fn description(&self) -> &str {
        "Save text content to a local file. Overwrites by default; set append to add to the \
         end. Creates parent directories unless ensure_directory is false."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Destination file path (absolute or relative)"
                },
                "content": {
                    "type": "string",
                    "description": "Text to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting (default false)",
                    "default": false
                },
                "ensure_directory": {
                    "type": "boolean",
                    "description": "Create the parent directory if missing (default true)",
                    "default": true
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let append = arguments["append"].as_bool().unwrap_or(false);
        let ensure_directory = arguments["ensure_directory"].as_bool().unwrap_or(true);

        if let Err(reason) = self.validate_path(path) {
            return Err(ToolError::PermissionDenied {
                tool_name: "save_file".into(),
                reason,
            });
        }

        if ensure_directory
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Err(ToolError::ExecutionFailed {
                tool_name: "save_file".into(),
                reason: format!("Failed to create directory: {e}"),
            });
        }

        let write_result = if append {
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
            {
                Ok(mut file) => file.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(path, content).await
        };

        match write_result {
            Ok(()) => Ok(serde_json::json!({
                "status": "ok",
                "path": path,
                "mode": if append { "append" } else { "overwrite" },
                "bytes_written": content.len(),
            })),
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: "save_file".into(),
                reason: format!("Failed to write file: {e}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition() {
        let tool = SaveFileTool::new();
        assert_eq!(tool.name(), "save_file");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path", "content"]));
    }

    #[tokio::test]
    async fn write_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("report.md");

        let tool = SaveFileTool::new();
        let payload = tool
            .execute(serde_json::json!({
                "path": file_path.to_str().unwrap(),
                "content": "# Chennai news\n"
            }))
            .await
            .unwrap();

        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["bytes_written"], 15);
        assert_eq!(
            std::fs::read_to_string(&file_path).unwrap(),
            "# Chennai news\n"
        );
    }

    #[tokio::test]
    async fn append_mode_adds_to_existing() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("log.txt");
        std::fs::write(&file_path, "first\n").unwrap();

        let tool = SaveFileTool::new();
        let payload = tool
            .execute(serde_json::json!({
                "path": file_path.to_str().unwrap(),
                "content": "second\n",
                "append": true
            }))
            .await
            .unwrap();

        assert_eq!(payload["mode"], "append");
        assert_eq!(
            std::fs::read_to_string(&file_path).unwrap(),
            "first\nsecond\n"
        );
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("nested").join("deep").join("out.txt");

        let tool = SaveFileTool::new();
        tool.execute(serde_json::json!({
            "path": file_path.to_str().unwrap(),
            "content": "nested"
        }))
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "nested");
    }

    #[tokio::test]
    async fn missing_arguments_rejected() {
        let tool = SaveFileTool::new();
        assert!(
            tool.execute(serde_json::json!({"content": "x"}))
                .await
                .is_err()
        );
        assert!(
            tool.execute(serde_json::json!({"path": "/tmp/x"}))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn path_traversal_blocked() {
        let tool = SaveFileTool::with_restrictions(vec!["/home/user/workspace".into()], vec![]);
        let result = tool
            .execute(serde_json::json!({
                "path": "../../../etc/crontab",
                "content": "nope"
            }))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn forbidden_prefix_blocked() {
        let tool = SaveFileTool::with_restrictions(vec![], vec!["/etc".into()]);
        let result = tool
            .execute(serde_json::json!({
                "path": "/etc/shadow",
                "content": "nope"
            }))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn outside_allowed_roots_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let tool =
            SaveFileTool::with_restrictions(vec![dir.path().to_string_lossy().into()], vec![]);
        let result = tool
            .execute(serde_json::json!({
                "path": "/tmp/elsewhere.txt",
                "content": "nope"
            }))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
