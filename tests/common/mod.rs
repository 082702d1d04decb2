#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use tutor_rag::answer::AnswerOrchestrator;
use tutor_rag::app_state::AppState;
use tutor_rag::classifier::ClassifierRewriter;
use tutor_rag::config::{AppConfig, CategoryLayout, StoreBackend};
use tutor_rag::llm::{Embedder, LanguageModel};
use tutor_rag::loader::FsDocumentLoader;
use tutor_rag::practice::PracticeTreeManager;
use tutor_rag::prompts::NO_CONTEXT;
use tutor_rag::splitter::RecursiveTextSplitter;
use tutor_rag::update::UpdateOrchestrator;
use tutor_rag::vector_store::build_store;

pub const INSUFFICIENT: &str = "No dispongo de información suficiente en el contexto para responder.";

/// Embedding determinista: número de apariciones de cada vocal.
pub struct VowelEmbedder;

#[async_trait]
impl Embedder for VowelEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                "aeiou"
                    .chars()
                    .map(|v| t.to_lowercase().chars().filter(|c| *c == v).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Modelo falso que reconoce cada tipo de prompt y guarda todos los que recibe.
pub struct ScriptedModel {
    pub classification: Box<dyn Fn(&str) -> String + Send + Sync>,
    pub selection: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn classifying(category: &'static str, rewritten: &'static str) -> Self {
        Self {
            classification: Box::new(move |_: &str| {
                format!(r#"{{"category": "{category}", "rewrite_question": "{rewritten}"}}"#)
            }),
            selection: "[]".to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn query(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("\"rewrite_question\"") {
            Ok((self.classification)(prompt))
        } else if prompt.contains("Resúmenes disponibles") {
            Ok(self.selection.clone())
        } else if prompt.contains("Documento a resumir") {
            Ok("Resumen del documento".to_string())
        } else if prompt.contains(NO_CONTEXT) {
            Ok(INSUFFICIENT.to_string())
        } else {
            Ok("Respuesta basada en el contexto.".to_string())
        }
    }
}

pub struct Workspace {
    pub content: TempDir,
    pub database: TempDir,
}

impl Workspace {
    /// Crea las dos raíces con los tres subdirectorios de categoría.
    pub fn new() -> Self {
        let ws = Self {
            content: TempDir::new().unwrap(),
            database: TempDir::new().unwrap(),
        };
        for dir in CategoryLayout::default().all() {
            fs::create_dir(ws.content.path().join(dir)).unwrap();
            fs::create_dir(ws.database.path().join(dir)).unwrap();
        }
        ws
    }

    pub fn write(&self, relative: &str, body: &str) {
        let path = self.content.path().join(relative);
        fs::create_dir_all(path.parent().unwrap_or(Path::new("."))).unwrap();
        fs::write(path, body).unwrap();
    }

    pub fn config(&self) -> AppConfig {
        let mut cfg = AppConfig::with_roots(self.content.path(), self.database.path());
        cfg.store_backend = StoreBackend::Flat;
        cfg
    }
}

/// Estado de la aplicación con los colaboradores externos sustituidos.
pub fn app_state(ws: &Workspace, llm: Arc<ScriptedModel>) -> AppState {
    let cfg = ws.config();
    let store = build_store(
        cfg.store_backend,
        cfg.database_path.clone(),
        Arc::new(VowelEmbedder),
        cfg.retrieval.distance_threshold,
    );
    let loader = Arc::new(FsDocumentLoader::new());
    let practice = Arc::new(
        PracticeTreeManager::new(cfg.database_path.clone(), llm.clone(), cfg.practice_marker.clone())
            .with_content_root(cfg.practice_content_dir()),
    );
    let updater = UpdateOrchestrator::new(
        &cfg,
        loader.clone(),
        Arc::new(RecursiveTextSplitter::new(
            cfg.retrieval.chunk_size,
            cfg.retrieval.chunk_overlap,
        )),
        store.clone(),
        practice,
    );
    let answerer = AnswerOrchestrator::new(
        &cfg,
        ClassifierRewriter::new(llm.clone()),
        store,
        loader,
        llm.clone(),
        llm,
    );
    AppState::new(cfg, answerer, updater)
}
