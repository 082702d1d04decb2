//! Motor plano: todos los registros y sus vectores en un `index.json`,
//! búsqueda exhaustiva por distancia L2 al cuadrado.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    backend_error, embed_records, ensure_creatable, ensure_queryable, preprocess, rerank,
    store_location, VectorStoreManager,
};
use crate::error::StoreError;
use crate::llm::Embedder;
use crate::models::{Document, IndexedRecord, ScoredDocument};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Serialize, Deserialize)]
struct FlatEntry {
    #[serde(flatten)]
    record: IndexedRecord,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FlatIndex {
    embedding_dimension: usize,
    entries: Vec<FlatEntry>,
}

pub struct FlatStore {
    work_directory: PathBuf,
    embedder: Arc<dyn Embedder>,
    distance_threshold: f32,
}

impl FlatStore {
    pub fn new(work_directory: PathBuf, embedder: Arc<dyn Embedder>, distance_threshold: f32) -> Self {
        Self {
            work_directory,
            embedder,
            distance_threshold,
        }
    }

    fn load_index(&self, store_name: &str) -> Result<FlatIndex, StoreError> {
        let location = store_location(&self.work_directory, store_name);
        ensure_queryable(&location)?;
        let path = location.join(INDEX_FILE);
        if !path.is_file() {
            return Err(StoreError::NotFound(path));
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt { path, source })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[async_trait]
impl VectorStoreManager for FlatStore {
    async fn create(&self, documents: &[Vec<Document>], store_name: &str) -> Result<usize, StoreError> {
        let location = store_location(&self.work_directory, store_name);
        ensure_creatable(&location)?;

        let records = preprocess(documents)?;
        if records.is_empty() {
            warn!("Sin fragmentos para '{}': no se crea el índice", store_name);
            return Ok(0);
        }

        let (vectors, embedding_dimension) = embed_records(self.embedder.as_ref(), &records).await?;
        let index = FlatIndex {
            embedding_dimension,
            entries: records
                .into_iter()
                .zip(vectors)
                .map(|(record, embedding)| FlatEntry { record, embedding })
                .collect(),
        };

        let content = serde_json::to_string_pretty(&index).map_err(backend_error)?;
        fs::create_dir_all(&location)?;
        fs::write(location.join(INDEX_FILE), content)?;

        info!(
            "Índice plano '{}' creado con {} registros en {}",
            store_name,
            index.entries.len(),
            location.display()
        );
        Ok(index.entries.len())
    }

    async fn query(
        &self,
        store_name: &str,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let index = self.load_index(store_name)?;
        let query_embedding = self
            .embedder
            .embed_one(question)
            .await
            .map_err(StoreError::Backend)?;
        if query_embedding.len() != index.embedding_dimension {
            return Err(backend_error(anyhow::anyhow!(
                "Dimensión de la consulta ({}) distinta a la del índice ({})",
                query_embedding.len(),
                index.embedding_dimension
            )));
        }

        let mut scored: Vec<(f32, &FlatEntry)> = index
            .entries
            .iter()
            .map(|entry| (squared_l2(&query_embedding, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);
        debug!("'{}': {} candidatos antes del umbral", store_name, scored.len());

        let results = scored
            .into_iter()
            .map(|(distance, entry)| ScoredDocument {
                document: entry.record.to_document(),
                distance,
            })
            .collect();
        Ok(rerank(results, self.distance_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{page, VowelEmbedder};
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> FlatStore {
        FlatStore::new(tmp.path().to_path_buf(), Arc::new(VowelEmbedder), 6.5)
    }

    #[test]
    fn squared_distance() {
        assert_eq!(squared_l2(&[1.0, 2.0], &[4.0, 6.0]), 25.0);
    }

    #[tokio::test]
    async fn query_honours_k_and_threshold() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let docs = vec![
            vec![page("/c/info/a.txt", "1", "aa"), page("/c/info/a.txt", "2", "aaa")],
            vec![page("/c/info/b.txt", "1", "aaaa")],
            vec![page("/c/info/c.txt", "1", "oooooooooo")],
        ];
        assert_eq!(store.create(&docs, "info").await.unwrap(), 4);

        // "aaa" está a distancia 0, "aa" y "aaaa" a 1, "o..." a 109.
        let all = store.query("info", "aaa", 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|r| r.distance <= 6.5));

        let top = store.query("info", "aaa", 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].document.content, "aaa");
        assert_eq!(top[0].document.page_label(), Some("2"));
    }

    #[tokio::test]
    async fn empty_input_leaves_store_absent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        assert_eq!(store.create(&[], "teoria").await.unwrap(), 0);
        assert!(matches!(
            store.query("teoria", "hola", 5).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_refuses_non_empty_location() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("teoria")).unwrap();
        fs::write(tmp.path().join("teoria").join("resto"), "x").unwrap();
        let docs = vec![vec![page("/c/teoria/t.txt", "1", "hola")]];
        assert!(matches!(
            store(&tmp).create(&docs, "teoria").await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn second_create_conflicts_and_keeps_existing_index() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store
            .create(&[vec![page("/c/info/guia.txt", "1", "examen")]], "info")
            .await
            .unwrap();
        let index = tmp.path().join("info").join(INDEX_FILE);
        let before = fs::read(&index).unwrap();

        let other = vec![vec![page("/c/info/otra.txt", "1", "uuuuuuuu")]];
        assert!(matches!(
            store.create(&other, "info").await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(fs::read(&index).unwrap(), before);
        assert_eq!(fs::read_dir(tmp.path().join("info")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn corrupt_index_is_reported() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("info")).unwrap();
        fs::write(tmp.path().join("info").join(INDEX_FILE), "{no es json").unwrap();
        assert!(matches!(
            store(&tmp).query("info", "hola", 5).await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
