//! Índice de prácticas: un árbol de resúmenes generado por el LLM y
//! persistido como un único JSON.
//!
//! API pública:
//!   - `PracticeTreeManager::create(&[Document], SummaryTree, &str)`
//!   - `PracticeTreeManager::read(&Path)`

mod tree;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

pub use tree::{
    build_tree, flatten, path_after_marker, path_relative_to, write_value, SummaryTree, TreeNode,
};

use crate::error::StoreError;
use crate::llm::LanguageModel;
use crate::models::Document;
use crate::prompts::summary_prompt;

pub struct PracticeTreeManager {
    work_directory: PathBuf,
    llm: Arc<dyn LanguageModel>,
    marker: String,
    content_root: Option<PathBuf>,
}

impl PracticeTreeManager {
    pub fn new(work_directory: impl Into<PathBuf>, llm: Arc<dyn LanguageModel>, marker: impl Into<String>) -> Self {
        Self {
            work_directory: work_directory.into(),
            llm,
            marker: marker.into(),
            content_root: None,
        }
    }

    /// Directorio de prácticas del contenido. Las claves del árbol se toman
    /// relativas a él; el marcador queda como último recurso.
    pub fn with_content_root(mut self, content_root: impl Into<PathBuf>) -> Self {
        self.content_root = Some(content_root.into());
        self
    }

    fn leaf_keys(&self, source: &str) -> Result<Vec<String>, StoreError> {
        match self
            .content_root
            .as_deref()
            .and_then(|root| path_relative_to(source, root))
        {
            Some(keys) => Ok(keys),
            None => path_after_marker(source, &self.marker),
        }
    }

    /// Resume cada documento fusionado, escribe el resumen en su hoja y
    /// persiste el árbol en `work_directory/store_name`. Devuelve la ruta
    /// del fichero escrito.
    pub async fn create(
        &self,
        merged_documents: &[Document],
        mut tree: SummaryTree,
        store_name: &str,
    ) -> Result<PathBuf, StoreError> {
        let output_path = self.work_directory.join(store_name);
        if fs::metadata(&output_path).map(|m| m.len() > 0).unwrap_or(false) {
            return Err(StoreError::Conflict(output_path));
        }

        let placed = merged_documents
            .iter()
            .map(|doc| -> Result<_, StoreError> {
                let source = doc.source().unwrap_or_default();
                Ok((source, self.leaf_keys(source)?, doc))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (source, keys, doc) in placed {
            let summary = self
                .llm
                .query(&summary_prompt(&doc.content))
                .await
                .map_err(StoreError::Backend)?;
            debug!("Resumen generado para {} ({} caracteres)", source, summary.len());

            write_value(&mut tree, &keys, summary);
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&tree).map_err(|source| StoreError::Corrupt {
            path: output_path.clone(),
            source,
        })?;
        fs::write(&output_path, json)?;

        info!(
            "Árbol de resúmenes guardado en {} ({} documentos)",
            output_path.display(),
            merged_documents.len()
        );
        Ok(output_path)
    }

    /// Carga un árbol persistido. `NotFound` si no existe; `Corrupt` si el
    /// contenido no es un árbol válido.
    pub fn read(path: &Path) -> Result<SummaryTree, StoreError> {
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}
