// src/db/blob_storage.rs

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::common::error::AppError;

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Armazenamento de arquivos (evidências e comprovantes). Devolve a URL pública.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, AppError>;

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, AppError>;

    /// Remove o arquivo; chave inexistente não é erro.
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

// Chaves vêm de ids gerados por nós, mas nunca deixamos escapar do diretório base.
fn check_key(key: &str) -> Result<(), AppError> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if safe {
        Ok(())
    } else {
        Err(AppError::invalid("key", "chave de arquivo inválida"))
    }
}

fn content_type_for(key: &str) -> &'static str {
    match Path::new(key).extension().and_then(|ext| ext.to_str()) {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Disco local, servido de volta em `{public_base_url}/files/{key}`.
pub struct LocalBlobStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String, AppError> {
        check_key(key)?;
        let path = self.root.join(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("criando diretório {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("gravando {}", path.display()))?;

        Ok(format!("{}/files/{}", self.public_base_url, key))
    }

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, AppError> {
        check_key(key)?;
        let path = self.root.join(key);

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(StoredBlob {
                bytes,
                content_type: content_type_for(key).to_string(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("lendo {}", path.display()))
                .into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        check_key(key)?;
        let path = self.root.join(key);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("removendo {}", path.display()))
                .into()),
        }
    }
}

/// Armazenamento em memória para testes e modo sem disco.
#[derive(Default)]
pub struct MemoryBlobStorage {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, AppError> {
        check_key(key)?;
        self.blobs.write().await.insert(
            key.to_string(),
            StoredBlob {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("memory://{key}"))
    }

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, AppError> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
