//! Respuesta a una conversación: clasifica, recupera contexto según la
//! categoría y genera la respuesta final.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};

use crate::classifier::ClassifierRewriter;
use crate::config::{AppConfig, CategoryLayout};
use crate::llm::{strip_code_fence, LanguageModel};
use crate::loader::DocumentLoader;
use crate::models::{Category, ChatMessage};
use crate::practice::{flatten, PracticeTreeManager};
use crate::prompts::{
    dedup_fragments, file_selection_prompt, grounded_answer_prompt, practice_answer_prompt,
    IRRELEVANT_REPLY,
};
use crate::vector_store::VectorStoreManager;

pub struct AnswerOrchestrator {
    classifier: ClassifierRewriter,
    store: Arc<dyn VectorStoreManager>,
    loader: Arc<dyn DocumentLoader>,
    selector: Arc<dyn LanguageModel>,
    generator: Arc<dyn LanguageModel>,
    layout: CategoryLayout,
    practice_content_dir: PathBuf,
    summary_tree_path: PathBuf,
    top_k: usize,
}

impl AnswerOrchestrator {
    /// `selector` elige ficheros de prácticas; `generator` redacta la respuesta.
    pub fn new(
        cfg: &AppConfig,
        classifier: ClassifierRewriter,
        store: Arc<dyn VectorStoreManager>,
        loader: Arc<dyn DocumentLoader>,
        selector: Arc<dyn LanguageModel>,
        generator: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            classifier,
            store,
            loader,
            selector,
            generator,
            layout: cfg.layout.clone(),
            practice_content_dir: cfg.practice_content_dir(),
            summary_tree_path: cfg.summary_tree_path(),
            top_k: cfg.retrieval.top_k,
        }
    }

    pub async fn answer(&self, history: &[ChatMessage]) -> Result<String> {
        let (category, question) = self.classifier.classify_and_rewrite(history).await?;

        match category {
            Category::Irrelevant => {
                info!("Pregunta irrelevante: no se recupera contexto");
                Ok(IRRELEVANT_REPLY.to_string())
            }
            Category::Theory => self.answer_from_store(&self.layout.theory, &question).await,
            Category::Information => self.answer_from_store(&self.layout.information, &question).await,
            Category::Practice => self.answer_from_practice(&question).await,
        }
    }

    async fn answer_from_store(&self, store_name: &str, question: &str) -> Result<String> {
        let results = self
            .store
            .query(store_name, question, self.top_k)
            .await
            .with_context(|| format!("Fallo consultando el índice '{store_name}'"))?;
        info!("'{}': {} fragmentos dentro del umbral", store_name, results.len());

        let fragments = dedup_fragments(results.iter().map(|r| r.document.content.as_str()));
        let prompt = grounded_answer_prompt(question, &fragments);
        self.generator.query(&prompt).await
    }

    async fn answer_from_practice(&self, question: &str) -> Result<String> {
        let tree = PracticeTreeManager::read(&self.summary_tree_path)?;
        let summaries = flatten(&tree);

        let raw = self
            .selector
            .query(&file_selection_prompt(question, &summaries))
            .await?;
        let selected = parse_selection(&raw)?;
        info!("Ficheros de prácticas seleccionados: {:?}", selected);

        let known: HashSet<&str> = summaries.iter().map(|(path, _)| path.as_str()).collect();
        let mut seen_contents = HashSet::new();
        let mut sources = Vec::new();
        for path in selected {
            if !known.contains(path.as_str()) {
                warn!("El modelo seleccionó un fichero que no está en el árbol: {}", path);
                continue;
            }
            let full_path = self.practice_content_dir.join(&path);
            let pages = match self.loader.load_file(&full_path).await {
                Ok(pages) => pages,
                Err(err) => {
                    warn!("No se pudo cargar {}: {:#}", full_path.display(), err);
                    continue;
                }
            };
            let content: String = pages.iter().map(|p| p.content.as_str()).collect();
            let content = content.trim().to_string();
            if content.is_empty() || !seen_contents.insert(content.clone()) {
                continue;
            }
            sources.push((path, content));
        }

        let prompt = practice_answer_prompt(question, &sources);
        self.generator.query(&prompt).await
    }
}

/// La selección de ficheros debe ser una lista JSON de rutas.
fn parse_selection(raw: &str) -> Result<Vec<String>> {
    let payload = strip_code_fence(raw);
    serde_json::from_str::<Vec<String>>(payload).map_err(|e| {
        error!("Selección de ficheros no válida: '{}'", payload);
        anyhow!("La selección de ficheros no es una lista JSON de rutas ({e}): '{payload}'")
    })
}
