use async_trait::async_trait;
use serde_json::Value;

use switchyard_core::tools::ToolError;

use super::str_arg;
use crate::registry::LocalHandler;

pub struct FileExists;

#[async_trait]
impl LocalHandler for FileExists {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let path = str_arg(&args, "file_path")?;
        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        Ok(Value::Bool(is_file))
    }
}

pub struct FileRead;

#[async_trait]
impl LocalHandler for FileRead {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let path = str_arg(&args, "file_path")?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read {path}: {e}")))?;
        Ok(Value::String(content))
    }
}

pub struct FileWrite;

#[async_trait]
impl LocalHandler for FileWrite {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let path = str_arg(&args, "file_path")?;
        let contents = str_arg(&args, "contents")?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to write {path}: {e}")))?;
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("switchyard_fs_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = scratch_dir();
        let path = dir.join("note.txt");
        let path_str = path.to_str().unwrap();

        let out = FileWrite
            .call(json!({"file_path": path_str, "contents": "line 1\nline 2"}))
            .await
            .unwrap();
        assert_eq!(out, Value::Null);

        let out = FileRead.call(json!({"file_path": path_str})).await.unwrap();
        assert_eq!(out, json!("line 1\nline 2"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn exists_only_for_files() {
        let dir = scratch_dir();
        let file = dir.join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let yes = FileExists
            .call(json!({"file_path": file.to_str().unwrap()}))
            .await
            .unwrap();
        let dir_check = FileExists
            .call(json!({"file_path": dir.to_str().unwrap()}))
            .await
            .unwrap();
        let missing = FileExists
            .call(json!({"file_path": dir.join("nope").to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(yes, json!(true));
        assert_eq!(dir_check, json!(false));
        assert_eq!(missing, json!(false));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn read_missing_file_fails() {
        let err = FileRead
            .call(json!({"file_path": "/definitely/not/here.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(ref m) if m.contains("here.txt")));
    }
}
