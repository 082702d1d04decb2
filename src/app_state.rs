use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::answer::AnswerOrchestrator;
use crate::classifier::ClassifierRewriter;
use crate::config::{AppConfig, LlmProvider};
use crate::error::UpdateError;
use crate::llm::{RigChatModel, RigEmbedder};
use crate::loader::FsDocumentLoader;
use crate::models::ChatMessage;
use crate::practice::PracticeTreeManager;
use crate::splitter::RecursiveTextSplitter;
use crate::update::{UpdateOrchestrator, UpdateReport, UpdateStage};
use crate::vector_store::build_store;

/// Contexto compartido por la capa HTTP y la CLI.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub answerer: Arc<AnswerOrchestrator>,
    pub updater: Arc<UpdateOrchestrator>,
    pub status: Arc<Mutex<Status>>,
    /// Las consultas toman el cerrojo en lectura; una actualización, en escritura.
    index_lock: Arc<RwLock<()>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Status {
    pub stage: UpdateStage,
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
    pub last_run: Option<UpdateReport>,
}

impl AppState {
    pub fn new(config: AppConfig, answerer: AnswerOrchestrator, updater: UpdateOrchestrator) -> Self {
        Self {
            config,
            answerer: Arc::new(answerer),
            updater: Arc::new(updater),
            status: Arc::new(Mutex::new(Status {
                message: "Servidor listo.".to_string(),
                ..Status::default()
            })),
            index_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Construye todos los componentes a partir de la configuración. El
    /// motor vectorial se elige aquí una sola vez.
    pub fn from_config(cfg: AppConfig) -> Result<Self> {
        if cfg.llm_provider != LlmProvider::OpenAI {
            return Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado",
                cfg.llm_provider
            ));
        }
        // El cliente de Rig entra en pánico si falta la clave.
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(anyhow!("Falta OPENAI_API_KEY en el entorno"));
        }

        let embedder = Arc::new(RigEmbedder::from_config(&cfg));
        let store = build_store(
            cfg.store_backend,
            cfg.database_path.clone(),
            embedder,
            cfg.retrieval.distance_threshold,
        );
        let loader = Arc::new(FsDocumentLoader::new());
        let splitter = Arc::new(RecursiveTextSplitter::new(
            cfg.retrieval.chunk_size,
            cfg.retrieval.chunk_overlap,
        ));

        let classifier_model = Arc::new(RigChatModel::new(cfg.llm_provider.clone(), cfg.classifier.clone()));
        let summary_model = Arc::new(RigChatModel::new(cfg.llm_provider.clone(), cfg.summary.clone()));
        let answer_model = Arc::new(RigChatModel::new(cfg.llm_provider.clone(), cfg.answer.clone()));

        let practice = Arc::new(
            PracticeTreeManager::new(cfg.database_path.clone(), summary_model, cfg.practice_marker.clone())
                .with_content_root(cfg.practice_content_dir()),
        );
        let updater = UpdateOrchestrator::new(&cfg, loader.clone(), splitter, store.clone(), practice);
        let answerer = AnswerOrchestrator::new(
            &cfg,
            ClassifierRewriter::new(classifier_model.clone()),
            store,
            loader,
            classifier_model,
            answer_model,
        );

        Ok(Self::new(cfg, answerer, updater))
    }

    pub async fn answer(&self, history: &[ChatMessage]) -> Result<String> {
        let _reading = self.index_lock.read().await;
        self.answerer.answer(history).await
    }

    /// Marca el estado como ocupado. Devuelve `false` si ya hay una
    /// actualización en curso.
    pub fn try_begin_update(&self) -> bool {
        let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        if status.is_busy {
            return false;
        }
        status.is_busy = true;
        status.message = "Iniciando actualización...".to_string();
        status.progress = 0.0;
        true
    }

    /// Ejecuta una actualización con acceso exclusivo a los índices.
    pub async fn run_update(&self) -> Result<UpdateReport, UpdateError> {
        let _writing = self.index_lock.write().await;
        self.updater.run(&self.status).await
    }

    pub fn status_snapshot(&self) -> Status {
        self.status.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
