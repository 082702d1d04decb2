//! Errores tipados de los componentes del núcleo.
//!
//! Los gestores de índices devuelven `StoreError` para que el llamante
//! distinga conflicto, ausencia y fallo del motor sin inspeccionar cadenas.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// La ubicación ya existe y no está vacía: nunca se sobrescribe.
    #[error("El índice ya existe y no está vacío: {}", .0.display())]
    Conflict(PathBuf),

    #[error("El índice no existe o está vacío: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Registro persistido corrupto en {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Ruta inválida: no se encontró el directorio '{marker}' en '{path}'")]
    MarkerNotFound { marker: String, path: String },

    #[error("El documento {document} supera los {limit} fragmentos admitidos por el esquema de ids")]
    TooManyChunks { document: usize, limit: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Fallo del motor de almacenamiento: {0}")]
    Backend(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("No se encontraron mensajes del usuario")]
    NoUserTurn,

    #[error("Respuesta de clasificación no válida ({source}): '{payload}'")]
    Malformed {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Clave faltante '{field}' en la respuesta de clasificación: '{payload}'")]
    MissingField { field: &'static str, payload: String },

    #[error("Fallo en la llamada al modelo de clasificación: {0}")]
    Llm(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Estructura de directorios incompleta; se detecta antes de mutar nada.
    #[error("Precondición no satisfecha: {0}")]
    Precondition(String),

    #[error("Error vaciando {}: {source}", .path.display())]
    Clearing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fallo en la etapa {stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}
