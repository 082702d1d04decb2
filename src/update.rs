//! Reconstrucción completa de los índices a partir del directorio de contenidos.
//!
//! Recorrido de una ejecución:
//! `Idle → Clearing → UpdatingTheory → UpdatingInformation → UpdatingPractice → Idle | Failed`.
//!
//! El vaciado es destructivo y no tiene vuelta atrás. Si una etapa falla, las
//! siguientes no se ejecutan y los índices quedan inconsistentes hasta la
//! próxima ejecución correcta.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::app_state::Status;
use crate::config::{AppConfig, CategoryLayout};
use crate::error::UpdateError;
use crate::loader::{merge_pages, DocumentLoader};
use crate::models::Document;
use crate::practice::{build_tree, PracticeTreeManager};
use crate::splitter::Splitter;
use crate::vector_store::VectorStoreManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStage {
    #[default]
    Idle,
    Clearing,
    UpdatingTheory,
    UpdatingInformation,
    UpdatingPractice,
    Failed,
}

impl UpdateStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStage::Idle => "idle",
            UpdateStage::Clearing => "clearing",
            UpdateStage::UpdatingTheory => "updating_theory",
            UpdateStage::UpdatingInformation => "updating_information",
            UpdateStage::UpdatingPractice => "updating_practice",
            UpdateStage::Failed => "failed",
        }
    }
}

/// Resultado de una ejecución completa.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub theory_records: usize,
    pub information_records: usize,
    pub practice_documents: usize,
    pub summary_tree: PathBuf,
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Actualización {}: {} registros de teoría, {} de información y {} documentos de prácticas resumidos en {}.",
            self.run_id,
            self.theory_records,
            self.information_records,
            self.practice_documents,
            self.summary_tree.display()
        )
    }
}

pub struct UpdateOrchestrator {
    content_root: PathBuf,
    database_root: PathBuf,
    layout: CategoryLayout,
    summary_tree_file: String,
    loader_recursive: bool,
    loader: Arc<dyn DocumentLoader>,
    splitter: Arc<dyn Splitter>,
    store: Arc<dyn VectorStoreManager>,
    practice: Arc<PracticeTreeManager>,
}

impl UpdateOrchestrator {
    pub fn new(
        cfg: &AppConfig,
        loader: Arc<dyn DocumentLoader>,
        splitter: Arc<dyn Splitter>,
        store: Arc<dyn VectorStoreManager>,
        practice: Arc<PracticeTreeManager>,
    ) -> Self {
        Self {
            content_root: cfg.content_path.clone(),
            database_root: cfg.database_path.clone(),
            layout: cfg.layout.clone(),
            summary_tree_file: cfg.summary_tree_file.clone(),
            loader_recursive: cfg.loader_recursive,
            loader,
            splitter,
            store,
            practice,
        }
    }

    /// Ejecuta una actualización completa, reflejando cada transición en `status`.
    pub async fn run(&self, status: &Mutex<Status>) -> Result<UpdateReport, UpdateError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "Iniciando actualización de índices");

        match self.run_stages(status, run_id, started_at).await {
            Ok(report) => {
                info!("{report}");
                update_status(status, |s| {
                    s.stage = UpdateStage::Idle;
                    s.is_busy = false;
                    s.message = report.to_string();
                    s.progress = 1.0;
                    s.last_run = Some(report.clone());
                });
                Ok(report)
            }
            Err(err) => {
                error!(%run_id, "Error crítico durante la actualización: {err:#}");
                update_status(status, |s| {
                    s.stage = UpdateStage::Failed;
                    s.is_busy = false;
                    s.message = format!("ERROR: {err}");
                });
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        status: &Mutex<Status>,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<UpdateReport, UpdateError> {
        self.check_preconditions()?;

        enter(status, UpdateStage::Clearing, "Vaciando índices anteriores", 0.0);
        for dir in self.layout.all() {
            clear_directory(&self.database_root.join(dir))?;
        }

        enter(status, UpdateStage::UpdatingTheory, "Indexando teoría", 0.25);
        let theory_records = self
            .update_vector_category(&self.layout.theory)
            .await
            .map_err(|source| stage_error(UpdateStage::UpdatingTheory, source))?;

        enter(status, UpdateStage::UpdatingInformation, "Indexando información", 0.5);
        let information_records = self
            .update_vector_category(&self.layout.information)
            .await
            .map_err(|source| stage_error(UpdateStage::UpdatingInformation, source))?;

        enter(status, UpdateStage::UpdatingPractice, "Resumiendo prácticas", 0.75);
        let (practice_documents, summary_tree) = self
            .update_practice()
            .await
            .map_err(|source| stage_error(UpdateStage::UpdatingPractice, source))?;

        Ok(UpdateReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            theory_records,
            information_records,
            practice_documents,
            summary_tree,
        })
    }

    /// Las dos raíces deben existir con los tres subdirectorios de categoría.
    /// Se comprueba todo antes de tocar nada.
    fn check_preconditions(&self) -> Result<(), UpdateError> {
        for root in [&self.content_root, &self.database_root] {
            if !root.is_dir() {
                return Err(UpdateError::Precondition(format!(
                    "La ruta no existe: {}",
                    root.display()
                )));
            }
            for dir in self.layout.all() {
                if !root.join(dir).is_dir() {
                    return Err(UpdateError::Precondition(format!(
                        "Estructura inválida en {}: falta el directorio '{}'",
                        root.display(),
                        dir
                    )));
                }
            }
        }
        Ok(())
    }

    async fn update_vector_category(&self, dir: &str) -> anyhow::Result<usize> {
        let documents = self
            .loader
            .load(&self.content_root.join(dir), self.loader_recursive)
            .await?;
        let chunked: Vec<Vec<Document>> = documents
            .iter()
            .map(|pages| self.splitter.split(pages))
            .collect();
        let records = self
            .store
            .create(&chunked, dir)
            .await
            .with_context(|| format!("No se pudo crear el índice '{dir}'"))?;
        info!("Categoría '{}': {} ficheros, {} registros", dir, documents.len(), records);
        Ok(records)
    }

    /// Prácticas se cargan siempre en modo recursivo: la estructura de
    /// carpetas forma parte del índice.
    async fn update_practice(&self) -> anyhow::Result<(usize, PathBuf)> {
        let practice_dir = self.content_root.join(&self.layout.practice);
        let documents = self.loader.load(&practice_dir, true).await?;
        let merged = merge_pages(documents);
        let tree = build_tree(&practice_dir)
            .with_context(|| format!("No se pudo recorrer {}", practice_dir.display()))?;

        let store_name = Path::new(&self.layout.practice)
            .join(&self.summary_tree_file)
            .to_string_lossy()
            .into_owned();
        let written = self.practice.create(&merged, tree, &store_name).await?;
        Ok((merged.len(), written))
    }
}

/// Vacía `dir` sin borrarlo: ficheros y subdirectorios fuera.
fn clear_directory(dir: &Path) -> Result<(), UpdateError> {
    let clearing = |source| UpdateError::Clearing {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(clearing)? {
        let path = entry.map_err(clearing)?.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|source| UpdateError::Clearing { path, source })?;
    }
    Ok(())
}

fn stage_error(stage: UpdateStage, source: anyhow::Error) -> UpdateError {
    UpdateError::Stage {
        stage: stage.as_str(),
        source,
    }
}

fn update_status(status: &Mutex<Status>, apply: impl FnOnce(&mut Status)) {
    let mut guard = status.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    apply(&mut guard);
}

fn enter(status: &Mutex<Status>, stage: UpdateStage, message: &str, progress: f32) {
    info!("[{}] {}", stage.as_str(), message);
    update_status(status, |s| {
        s.stage = stage;
        s.is_busy = true;
        s.message = message.to_string();
        s.progress = progress;
    });
}
