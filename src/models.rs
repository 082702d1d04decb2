//! Modelos de dominio (documentos, registros indexados, categorías y turnos de chat).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type Metadata = HashMap<String, String>;

/// Claves de metadatos que el cargador garantiza.
pub const META_SOURCE: &str = "source";
pub const META_PAGE_LABEL: &str = "page_label";
pub const META_TITLE: &str = "title";

/// Una página (o fragmento) de un documento de origen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).map(String::as_str)
    }

    pub fn page_label(&self) -> Option<&str> {
        self.metadata.get(META_PAGE_LABEL).map(String::as_str)
    }
}

/// Entrada de un almacén vectorial antes de calcular su embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub id: String,
    pub content: String,
    pub title: String,
    pub page_label: String,
}

impl IndexedRecord {
    /// Reconstruye el documento que se entrega a los llamantes de `query`.
    pub fn to_document(&self) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert(META_TITLE.to_string(), self.title.clone());
        metadata.insert(META_PAGE_LABEL.to_string(), self.page_label.clone());
        Document::new(self.content.clone(), metadata)
    }
}

/// Documento recuperado junto con su distancia (menor = más parecido).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub distance: f32,
}

/// Intención del usuario; decide la estrategia de recuperación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "teoria", alias = "teoría", alias = "theory")]
    Theory,
    #[serde(rename = "informacion", alias = "información", alias = "information")]
    Information,
    #[serde(rename = "practica", alias = "práctica", alias = "practice")]
    Practice,
    #[serde(rename = "irrelevante", alias = "irrelevant")]
    Irrelevant,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Theory,
        Category::Information,
        Category::Practice,
        Category::Irrelevant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Theory => "teoria",
            Category::Information => "informacion",
            Category::Practice => "practica",
            Category::Irrelevant => "irrelevante",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Un turno de la conversación tal como llega de la capa HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
