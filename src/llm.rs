//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.
//!
//! El núcleo sólo ve los traits `LanguageModel` y `Embedder`, de modo que los
//! tests pueden inyectar implementaciones en memoria.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel as _;
use tracing::debug;

use crate::config::{AppConfig, LlmProvider, ModelSettings};

/// Máximo de textos por petición de embeddings.
const EMBED_BATCH: usize = 256;

/// Colaborador de lenguaje: prompt completo de entrada, texto de salida.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn query(&self, prompt: &str) -> Result<String>;
}

/// Colaborador de embeddings. Los vectores son opacos para el núcleo.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow!("No se pudo generar embedding de la consulta"))
    }
}

/// Modelo de chat de Rig configurado para un rol concreto.
#[derive(Debug, Clone)]
pub struct RigChatModel {
    provider: LlmProvider,
    settings: ModelSettings,
}

impl RigChatModel {
    pub fn new(provider: LlmProvider, settings: ModelSettings) -> Self {
        Self { provider, settings }
    }

    async fn query_openai(&self, prompt: &str) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();

        let model_name = if self.settings.model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.settings.model.as_str()
        };

        let agent = client
            .agent(model_name)
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens)
            .build();

        let answer = agent.prompt(prompt).await?;
        Ok(answer)
    }
}

#[async_trait]
impl LanguageModel for RigChatModel {
    async fn query(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.settings.model, chars = prompt.len(), "Consulta al LLM");
        match self.provider {
            LlmProvider::OpenAI => self.query_openai(prompt).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }
}

/// Modelo de embeddings de Rig.
#[derive(Debug, Clone)]
pub struct RigEmbedder {
    provider: LlmProvider,
    model: String,
}

impl RigEmbedder {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            model: cfg.llm_embedding_model.clone(),
        }
    }

    async fn embed_with_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let client = openai::Client::from_env();

        let model_name = if self.model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.model.as_str()
        };
        let embedding_model = client.embedding_model(model_name);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH) {
            let embeddings = embedding_model.embed_texts(batch.to_vec()).await?;
            if embeddings.len() != batch.len() {
                return Err(anyhow!(
                    "Número de embeddings ({}) distinto al número de textos ({})",
                    embeddings.len(),
                    batch.len()
                ));
            }
            vectors.extend(
                embeddings
                    .into_iter()
                    .map(|e| e.vec.into_iter().map(|v| v as f32).collect::<Vec<f32>>()),
            );
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for RigEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            )),
        }
    }
}

/// Limpia la respuesta del LLM para que sólo quede el contenido estructurado
/// (quita un bloque ```json ... ``` envolvente si lo hay).
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fence_handles_wrapped_and_plain_json() {
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[\"x\"]\n```"), "[\"x\"]");
    }

    #[tokio::test]
    async fn unimplemented_provider_is_reported() {
        let model = RigChatModel::new(
            LlmProvider::Ollama,
            ModelSettings {
                model: "llama3".into(),
                temperature: 0.0,
                max_tokens: 16,
            },
        );
        let err = model.query("hola").await.unwrap_err();
        assert!(err.to_string().contains("no implementado"));
    }
}
