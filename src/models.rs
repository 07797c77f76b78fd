//! Model directory listing
//!
//! The models directory is flat and read-only from our side; every
//! `*.gguf` file in it is a servable model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::setup::paths::MODEL_EXTENSION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Model files in `dir`, sorted by name; a missing directory is created
pub async fn list_models(dir: &Path) -> ControlResult<Vec<ModelFile>> {
    if !dir.exists() {
        tracing::info!("[Models] Creating models directory {:?}", dir);
        tokio::fs::create_dir_all(dir).await?;
        return Ok(Vec::new());
    }

    let mut models = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_model_file(&path) {
            continue;
        }
        // Follows symlinks into shared model stores; dangling links are skipped
        let Ok(metadata) = tokio::fs::metadata(&path).await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        models.push(ModelFile {
            name: entry.file_name().to_string_lossy().to_string(),
            path,
            size_bytes: metadata.len(),
        });
    }

    models.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(models)
}

fn is_model_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(MODEL_EXTENSION))
}

/// Absolute path of model `name`, which must be an existing file directly
/// inside `models_dir`
pub async fn resolve_model_path(models_dir: &Path, name: &str) -> ControlResult<PathBuf> {
    let plain = Path::new(name)
        .file_name()
        .is_some_and(|f| f.to_str() == Some(name));
    if !plain {
        return Err(ControlError::ModelNotFound(name.to_string()));
    }

    let path = models_dir.join(name);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(ControlError::ModelNotFound(path.display().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_lists_only_gguf_sorted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("zeta.gguf"), b"12345").unwrap();
        std::fs::write(dir.path().join("Alpha.GGUF"), b"1").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("folder.gguf")).unwrap();

        let models = list_models(dir.path()).await.unwrap();
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha.GGUF", "zeta.gguf"]);
        assert_eq!(models[1].size_bytes, 5);
        assert_eq!(models[1].path, dir.path().join("zeta.gguf"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_models_are_listed() {
        let store = tempdir().unwrap();
        let dir = tempdir().unwrap();
        std::fs::write(store.path().join("shared.gguf"), b"123").unwrap();
        std::os::unix::fs::symlink(store.path().join("shared.gguf"), dir.path().join("shared.gguf")).unwrap();
        std::os::unix::fs::symlink(store.path().join("gone.gguf"), dir.path().join("gone.gguf")).unwrap();

        let models = list_models(dir.path()).await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "shared.gguf");
        assert_eq!(models[0].size_bytes, 3);
        assert!(resolve_model_path(dir.path(), "shared.gguf").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_dir_is_created() {
        let dir = tempdir().unwrap();
        let models_dir = dir.path().join("models");
        assert!(list_models(&models_dir).await.unwrap().is_empty());
        assert!(models_dir.is_dir());
    }

    #[tokio::test]
    async fn test_resolve_model_path() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("model.gguf"), b"x").unwrap();

        assert_eq!(
            resolve_model_path(dir.path(), "model.gguf").await.unwrap(),
            dir.path().join("model.gguf")
        );

        let err = resolve_model_path(dir.path(), "absent.gguf").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);

        let err = resolve_model_path(dir.path(), "../model.gguf").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
    }
}
