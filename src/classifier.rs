//! Clasificación de la intención del usuario y reformulación de la pregunta.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::error::ClassifyError;
use crate::llm::{strip_code_fence, LanguageModel};
use crate::models::{Category, ChatMessage, Role};
use crate::prompts::classification_prompt;

pub struct ClassifierRewriter {
    llm: Arc<dyn LanguageModel>,
}

impl ClassifierRewriter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Devuelve la categoría y la última pregunta del usuario reformulada
    /// para que se entienda sin el resto de la conversación.
    pub async fn classify_and_rewrite(
        &self,
        history: &[ChatMessage],
    ) -> Result<(Category, String), ClassifyError> {
        let (context, question) = split_history(history)?;
        let prompt = classification_prompt(&context, &question);

        let raw = self.llm.query(&prompt).await.map_err(ClassifyError::Llm)?;
        let (category, rewritten) = parse_classification(&raw).inspect_err(|e| {
            error!("Respuesta de clasificación descartada: {e}");
        })?;

        info!(%category, "Pregunta reformulada: {}", rewritten);
        Ok((category, rewritten))
    }
}

/// Separa la última pregunta del usuario del contexto que la precede.
///
/// El contexto incluye también las respuestas del asistente anteriores a la
/// pregunta, etiquetadas por rol, porque suelen contener el dato que la
/// pregunta da por supuesto ("¿qué entra?" tras "el día 5").
fn split_history(history: &[ChatMessage]) -> Result<(String, String), ClassifyError> {
    let last_user = history
        .iter()
        .rposition(|m| m.role == Role::User)
        .ok_or(ClassifyError::NoUserTurn)?;

    let context = history[..last_user]
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(format!("usuario: {}", m.content.trim())),
            Role::Assistant => Some(format!("asistente: {}", m.content.trim())),
            Role::System => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok((context, history[last_user].content.trim().to_string()))
}

/// Interpreta la respuesta del modelo como `{category, rewrite_question}`.
/// No hay categoría por defecto: cualquier desviación es un error.
pub fn parse_classification(raw: &str) -> Result<(Category, String), ClassifyError> {
    let payload = strip_code_fence(raw);
    let malformed = |source| ClassifyError::Malformed {
        payload: payload.to_string(),
        source,
    };

    let value: Value = serde_json::from_str(payload).map_err(malformed)?;
    let category = value
        .get("category")
        .filter(|v| !v.is_null())
        .ok_or_else(|| ClassifyError::MissingField {
            field: "category",
            payload: payload.to_string(),
        })?;
    let category: Category = serde_json::from_value(category.clone()).map_err(malformed)?;

    let rewritten = value
        .get("rewrite_question")
        .and_then(Value::as_str)
        .ok_or_else(|| ClassifyError::MissingField {
            field: "rewrite_question",
            payload: payload.to_string(),
        })?;

    // Para preguntas irrelevantes la reformulación se descarta.
    if category == Category::Irrelevant {
        return Ok((category, category.as_str().to_string()));
    }
    Ok((category, rewritten.trim().to_string()))
}
