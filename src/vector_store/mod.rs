//! Gestión de almacenes vectoriales por categoría.
//!
//! API pública:
//!   - `VectorStoreManager::create(&[Vec<Document>], &str)`
//!   - `VectorStoreManager::query(&str, &str, usize)`
//!   - `build_store(StoreBackend, ...)`: elige el motor una sola vez al arrancar.
//!
//! Un almacén vive en `work_directory/store_name`. Si esa ubicación existe y
//! no está vacía, `create` la rechaza: nunca se sobrescribe un índice que
//! puede estar siendo leído.

mod flat;
mod lance;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

pub use flat::FlatStore;
pub use lance::LanceStore;

use crate::config::StoreBackend;
use crate::error::StoreError;
use crate::llm::Embedder;
use crate::models::{Document, IndexedRecord, ScoredDocument};

/// Identificadores disponibles por documento: id = documento * 10000 + fragmento.
pub const IDS_PER_DOCUMENT: usize = 10_000;

pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 6.5;

#[async_trait]
pub trait VectorStoreManager: Send + Sync {
    /// Indexa los fragmentos (agrupados por fichero de origen) en un almacén
    /// nuevo. Devuelve el número de registros escritos.
    async fn create(&self, documents: &[Vec<Document>], store_name: &str) -> Result<usize, StoreError>;

    /// Búsqueda por similitud de los `k` vecinos más próximos, filtrada por
    /// el umbral de distancia (ver `rerank`).
    async fn query(
        &self,
        store_name: &str,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, StoreError>;
}

pub fn build_store(
    backend: StoreBackend,
    work_directory: impl Into<PathBuf>,
    embedder: Arc<dyn Embedder>,
    distance_threshold: f32,
) -> Arc<dyn VectorStoreManager> {
    let work_directory = work_directory.into();
    match backend {
        StoreBackend::LanceDb => Arc::new(LanceStore::new(work_directory, embedder, distance_threshold)),
        StoreBackend::Flat => Arc::new(FlatStore::new(work_directory, embedder, distance_threshold)),
    }
}

/// Asigna ids deterministas y reduce los metadatos a `{title, page_label}`.
pub fn preprocess(documents: &[Vec<Document>]) -> Result<Vec<IndexedRecord>, StoreError> {
    let mut records = Vec::new();
    for (doc_index, pages) in documents.iter().enumerate() {
        if pages.len() > IDS_PER_DOCUMENT {
            return Err(StoreError::TooManyChunks {
                document: doc_index,
                limit: IDS_PER_DOCUMENT,
            });
        }
        for (page_index, page) in pages.iter().enumerate() {
            let title = page
                .source()
                .and_then(|s| s.rsplit(['/', '\\']).next())
                .unwrap_or_default()
                .to_string();
            records.push(IndexedRecord {
                id: (doc_index * IDS_PER_DOCUMENT + page_index).to_string(),
                content: page.content.clone(),
                title,
                page_label: page.page_label().unwrap_or_default().to_string(),
            });
        }
    }
    Ok(records)
}

/// Ordena por distancia descendente y descarta lo que supere el umbral.
///
/// El orden resultante va del candidato más lejano admitido al más cercano,
/// así que los llamantes no deben tratarlo como "mejor primero".
pub fn rerank(mut results: Vec<ScoredDocument>, threshold: f32) -> Vec<ScoredDocument> {
    results.sort_by(|a, b| b.distance.total_cmp(&a.distance));
    results.retain(|r| r.distance <= threshold);
    results
}

pub(crate) fn store_location(work_directory: &Path, store_name: &str) -> PathBuf {
    work_directory.join(store_name)
}

fn is_non_empty_dir(path: &Path) -> std::io::Result<bool> {
    if !path.is_dir() {
        return Ok(path.exists());
    }
    Ok(std::fs::read_dir(path)?.next().is_some())
}

/// `Conflict` si la ubicación ya tiene contenido.
pub(crate) fn ensure_creatable(path: &Path) -> Result<(), StoreError> {
    if is_non_empty_dir(path)? {
        return Err(StoreError::Conflict(path.to_path_buf()));
    }
    Ok(())
}

/// `NotFound` si la ubicación no existe o está vacía.
pub(crate) fn ensure_queryable(path: &Path) -> Result<(), StoreError> {
    if !is_non_empty_dir(path)? {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    Ok(())
}

/// Calcula los embeddings de todos los registros y comprueba que todos
/// tienen la misma dimensión. Devuelve `(vectores, dimensión)`.
pub(crate) async fn embed_records(
    embedder: &dyn Embedder,
    records: &[IndexedRecord],
) -> Result<(Vec<Vec<f32>>, usize), StoreError> {
    let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
    let vectors = embedder.embed(&texts).await.map_err(StoreError::Backend)?;
    if vectors.len() != records.len() {
        return Err(backend_error(anyhow::anyhow!(
            "Se esperaban {} embeddings y se recibieron {}",
            records.len(),
            vectors.len()
        )));
    }
    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
        return Err(backend_error(anyhow::anyhow!(
            "Embeddings con dimensión vacía o inconsistente"
        )));
    }
    Ok((vectors, dimension))
}

pub(crate) fn backend_error<E>(err: E) -> StoreError
where
    E: Into<anyhow::Error>,
{
    StoreError::Backend(err.into())
}


#[cfg(test)]
mod tests {
    use super::test_support::page;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scored(content: &str, distance: f32) -> ScoredDocument {
        ScoredDocument {
            document: Document::new(content, Default::default()),
            distance,
        }
    }

    #[test]
    fn preprocess_assigns_ids_and_strips_metadata() {
        let docs = vec![
            vec![page("/c/teoria/tema1.pdf", "1", "a"), page("/c/teoria/tema1.pdf", "2", "b")],
            vec![page(r"C:\cursos\teoria\tema2.pdf", "7", "c")],
        ];
        let records = preprocess(&docs).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "10000"]);
        assert_eq!(records[0].title, "tema1.pdf");
        assert_eq!(records[2].title, "tema2.pdf");
        assert_eq!(records[2].page_label, "7");
    }

    #[test]
    fn preprocess_rejects_documents_that_overflow_the_id_space() {
        let pages: Vec<Document> = (0..=IDS_PER_DOCUMENT)
            .map(|_| page("/c/x.txt", "1", "x"))
            .collect();
        assert!(matches!(
            preprocess(&[pages]),
            Err(StoreError::TooManyChunks { document: 0, .. })
        ));
    }

    #[test]
    fn rerank_drops_everything_above_threshold() {
        let results = vec![scored("a", 1.0), scored("b", 7.0), scored("c", 6.5), scored("d", 3.0)];
        let kept = rerank(results, 6.5);
        let distances: Vec<f32> = kept.iter().map(|r| r.distance).collect();
        assert_eq!(distances, vec![6.5, 3.0, 1.0]);
        assert!(kept.iter().all(|r| r.distance <= 6.5));
    }

    #[test]
    fn rerank_may_return_nothing() {
        assert!(rerank(vec![scored("a", 9.0)], 6.5).is_empty());
    }

    #[test]
    fn creatable_and_queryable_follow_directory_contents() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("teoria");
        assert!(ensure_creatable(&missing).is_ok());
        assert!(matches!(ensure_queryable(&missing), Err(StoreError::NotFound(_))));

        fs::create_dir(&missing).unwrap();
        assert!(ensure_creatable(&missing).is_ok());
        assert!(matches!(ensure_queryable(&missing), Err(StoreError::NotFound(_))));

        fs::write(missing.join("algo"), "x").unwrap();
        assert!(matches!(ensure_creatable(&missing), Err(StoreError::Conflict(_))));
        assert!(ensure_queryable(&missing).is_ok());
    }
}
