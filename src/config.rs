//! Carga y gestión de configuración de la aplicación (rutas, índices y LLMs).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Motor de almacenamiento vectorial. Se elige una vez al arrancar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    LanceDb,
    Flat,
}

impl StoreBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lancedb" | "lance" => Ok(Self::LanceDb),
            "flat" | "json" => Ok(Self::Flat),
            other => Err(anyhow!("Base de datos vectorial no implementada: {other}")),
        }
    }
}

/// Parámetros de un modelo de chat para un rol concreto
/// (clasificación, resumen o respuesta).
#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl ModelSettings {
    fn from_env(prefix: &str, default_max_tokens: u64) -> Result<Self> {
        Ok(Self {
            model: env::var(format!("{prefix}_MODEL")).unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            temperature: parse_var(&format!("{prefix}_TEMPERATURE"), 0.0)?,
            max_tokens: parse_var(&format!("{prefix}_MAX_TOKENS"), default_max_tokens)?,
        })
    }
}

/// Nombres de los subdirectorios de cada categoría. Son los mismos bajo la
/// raíz de contenidos y bajo la raíz de bases de datos.
#[derive(Clone, Debug)]
pub struct CategoryLayout {
    pub theory: String,
    pub information: String,
    pub practice: String,
}

impl Default for CategoryLayout {
    fn default() -> Self {
        Self {
            theory: "teoria".to_string(),
            information: "info".to_string(),
            practice: "practica".to_string(),
        }
    }
}

impl CategoryLayout {
    pub fn all(&self) -> [&str; 3] {
        [&self.theory, &self.information, &self.practice]
    }
}

/// Parámetros de troceado y recuperación.
#[derive(Clone, Debug)]
pub struct RetrievalSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub distance_threshold: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 500,
            top_k: 5,
            distance_threshold: 6.5,
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub content_path: PathBuf,
    pub database_path: PathBuf,
    pub layout: CategoryLayout,
    pub practice_marker: String,
    pub summary_tree_file: String,
    pub store_backend: StoreBackend,
    pub retrieval: RetrievalSettings,
    pub loader_recursive: bool,

    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub classifier: ModelSettings,
    pub summary: ModelSettings,
    pub answer: ModelSettings,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let content_path = env::var("CONTENT_PATH")
            .map(PathBuf::from)
            .map_err(|_| anyhow!("Falta CONTENT_PATH en el entorno"))?;
        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .map_err(|_| anyhow!("Falta DATABASE_PATH en el entorno"))?;

        let defaults = CategoryLayout::default();
        let layout = CategoryLayout {
            theory: env::var("THEORY_DIR").unwrap_or(defaults.theory),
            information: env::var("INFO_DIR").unwrap_or(defaults.information),
            practice: env::var("PRACTICE_DIR").unwrap_or(defaults.practice),
        };
        let practice_marker =
            env::var("PRACTICE_MARKER").unwrap_or_else(|_| layout.practice.clone());
        let summary_tree_file =
            env::var("SUMMARY_TREE_FILE").unwrap_or_else(|_| "summary_tree.json".to_string());

        let store_backend =
            StoreBackend::from_str(&env::var("STORE_BACKEND").unwrap_or_else(|_| "lancedb".to_string()))?;

        let retrieval_defaults = RetrievalSettings::default();
        let retrieval = RetrievalSettings {
            chunk_size: parse_var("CHUNK_SIZE", retrieval_defaults.chunk_size)?,
            chunk_overlap: parse_var("CHUNK_OVERLAP", retrieval_defaults.chunk_overlap)?,
            top_k: parse_var("RETRIEVAL_TOP_K", retrieval_defaults.top_k)?,
            distance_threshold: parse_var("RERANK_THRESHOLD", retrieval_defaults.distance_threshold)?,
        };
        if retrieval.chunk_overlap >= retrieval.chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({}) debe ser menor que CHUNK_SIZE ({})",
                retrieval.chunk_overlap,
                retrieval.chunk_size
            ));
        }
        let loader_recursive = parse_var("LOADER_RECURSIVE", true)?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());

        Ok(Self {
            content_path,
            database_path,
            layout,
            practice_marker,
            summary_tree_file,
            store_backend,
            retrieval,
            loader_recursive,
            server_addr,
            llm_provider,
            llm_embedding_model,
            classifier: ModelSettings::from_env("CLASSIFIER", 512)?,
            summary: ModelSettings::from_env("SUMMARY", 1024)?,
            answer: ModelSettings::from_env("ANSWER", 1024)?,
        })
    }

    /// Configuración con valores por defecto sobre dos raíces dadas.
    pub fn with_roots(content_path: impl Into<PathBuf>, database_path: impl Into<PathBuf>) -> Self {
        let layout = CategoryLayout::default();
        let default_model = |max_tokens| ModelSettings {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens,
        };
        Self {
            content_path: content_path.into(),
            database_path: database_path.into(),
            practice_marker: layout.practice.clone(),
            layout,
            summary_tree_file: "summary_tree.json".to_string(),
            store_backend: StoreBackend::LanceDb,
            retrieval: RetrievalSettings::default(),
            loader_recursive: true,
            server_addr: "127.0.0.1:8000".to_string(),
            llm_provider: LlmProvider::OpenAI,
            llm_embedding_model: "text-embedding-3-small".to_string(),
            classifier: default_model(512),
            summary: default_model(1024),
            answer: default_model(1024),
        }
    }

    /// Directorio de contenidos de la categoría de prácticas.
    pub fn practice_content_dir(&self) -> PathBuf {
        self.content_path.join(&self.layout.practice)
    }

    /// Fichero persistido con el árbol de resúmenes.
    pub fn summary_tree_path(&self) -> PathBuf {
        self.database_path
            .join(&self.layout.practice)
            .join(&self.summary_tree_file)
    }
}

/// Lee una variable de entorno opcional; si existe pero no se puede
/// interpretar, es un error de configuración.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {name}: '{raw}'")),
        Err(_) => Ok(default),
    }
}
