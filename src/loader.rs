//! Carga de documentos desde el sistema de archivos.
//!
//! Cada fichero produce una lista de páginas (`Document`) con los metadatos
//! `source` y `page_label`. Un fichero que no se puede leer se registra y se
//! omite; la carga del directorio continúa.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use mime_guess::MimeGuess;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::models::{Document, Metadata, META_PAGE_LABEL, META_SOURCE};

/// Colaborador de carga: páginas agrupadas por fichero de origen.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, dir: &Path, recursive: bool) -> Result<Vec<Vec<Document>>>;

    async fn load_file(&self, path: &Path) -> Result<Vec<Document>>;
}

#[derive(Debug, Clone, Default)]
pub struct FsDocumentLoader {
    http: reqwest::Client,
}

impl FsDocumentLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
        let walker = WalkDir::new(dir).sort_by_file_name();
        let walker = if recursive { walker } else { walker.max_depth(1) };
        walker
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("No se pudo acceder a una entrada bajo {}: {}", dir.display(), err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    async fn load_web_page(&self, path: &Path) -> Result<Vec<Document>> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer el fichero '{}'", path.display()))?;
        let url = Url::parse(raw.trim())
            .with_context(|| format!("URL inválida en '{}'", path.display()))?;

        let html = self
            .http
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let text = visible_text(&html)?;

        Ok(vec![Document::new(text, page_metadata(url.as_str(), 1))])
    }
}

#[async_trait]
impl DocumentLoader for FsDocumentLoader {
    async fn load(&self, dir: &Path, recursive: bool) -> Result<Vec<Vec<Document>>> {
        if !dir.is_dir() {
            return Err(anyhow!("La ruta no es un directorio: {}", dir.display()));
        }

        let mut documents = Vec::new();
        for path in Self::collect_files(dir, recursive) {
            match self.load_file(&path).await {
                Ok(pages) if pages.is_empty() => {
                    info!("Fichero sin contenido útil, se omite: {}", path.display());
                }
                Ok(pages) => documents.push(pages),
                Err(err) => warn!("Error procesando {}: {:#}", path.display(), err),
            }
        }

        info!("Cargados {} documentos desde {}", documents.len(), dir.display());
        Ok(documents)
    }

    async fn load_file(&self, path: &Path) -> Result<Vec<Document>> {
        let extension = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("")
            .to_lowercase();
        let source = path.to_string_lossy().to_string();

        let pages = match extension.as_str() {
            "pdf" => pdf_extract::extract_text_by_pages(path)
                .map_err(|e| anyhow!("No se pudo extraer texto del PDF {}: {}", path.display(), e))?
                .into_iter()
                .enumerate()
                .map(|(i, text)| Document::new(text, page_metadata(&source, i + 1)))
                .collect(),
            "url" => self.load_web_page(path).await?,
            "txt" | "py" | "md" => vec![read_text_page(path, &source)?],
            _ => {
                let mime = MimeGuess::from_path(path).first();
                match &mime {
                    Some(m) if m.type_() == mime_guess::mime::TEXT => {
                        vec![read_text_page(path, &source)?]
                    }
                    _ => {
                        return Err(anyhow!(
                            "Formato no soportado ('.{}', {}): {}",
                            extension,
                            mime.as_ref().map(|m| m.to_string()).unwrap_or_else(|| "desconocido".into()),
                            path.display()
                        ))
                    }
                }
            }
        };

        Ok(pages
            .into_iter()
            .map(|mut page| {
                page.content = mark_figures(&page.content);
                page
            })
            .collect())
    }
}

/// Une las páginas de cada fichero en un único documento con los metadatos
/// de la primera página. Los ficheros sin páginas se descartan.
pub fn merge_pages(documents: Vec<Vec<Document>>) -> Vec<Document> {
    documents
        .into_iter()
        .filter_map(|pages| {
            let metadata = pages.first()?.metadata.clone();
            let content: String = pages.iter().map(|p| p.content.as_str()).collect();
            Some(Document::new(content, metadata))
        })
        .collect()
}

fn read_text_page(path: &Path, source: &str) -> Result<Document> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Fichero no-texto o no-UTF8: {}", path.display()))?;
    Ok(Document::new(text, page_metadata(source, 1)))
}

fn page_metadata(source: &str, page: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(META_SOURCE.to_string(), source.to_string());
    metadata.insert(META_PAGE_LABEL.to_string(), page.to_string());
    metadata
}

/// Las referencias de imagen en Markdown (`![...]`) se etiquetan como figuras.
fn mark_figures(text: &str) -> String {
    static FIGURE: OnceLock<Regex> = OnceLock::new();
    let re = FIGURE.get_or_init(|| Regex::new(r"(!\[[^\]]*\])").expect("regex de figuras válida"));
    re.replace_all(text, "texto Figure = $1").into_owned()
}

fn visible_text(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let body = Selector::parse("body").map_err(|e| anyhow!("Selector inválido: {e:?}"))?;
    let text = match document.select(&body).next() {
        Some(node) => node.text().collect::<Vec<_>>(),
        None => document.root_element().text().collect::<Vec<_>>(),
    };
    Ok(text
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn loads_text_files_sorted_and_skips_unsupported() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "segundo").unwrap();
        fs::write(tmp.path().join("a.py"), "print('hola')").unwrap();
        fs::write(tmp.path().join("imagen.png"), [0u8, 159, 146, 150]).unwrap();

        let loader = FsDocumentLoader::new();
        let docs = loader.load(tmp.path(), false).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0][0].content, "print('hola')");
        assert_eq!(docs[1][0].content, "segundo");
        assert_eq!(docs[1][0].page_label(), Some("1"));
        assert!(docs[1][0].source().unwrap().ends_with("b.txt"));
        // Los ficheros no soportados se omiten, no se borran.
        assert!(tmp.path().join("imagen.png").exists());
    }

    #[tokio::test]
    async fn recursive_mode_controls_depth() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("raiz.txt"), "raiz").unwrap();
        fs::write(tmp.path().join("sub").join("hijo.txt"), "hijo").unwrap();

        let loader = FsDocumentLoader::new();
        assert_eq!(loader.load(tmp.path(), false).await.unwrap().len(), 1);
        assert_eq!(loader.load(tmp.path(), true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn load_rejects_missing_directory() {
        let loader = FsDocumentLoader::new();
        let result = loader.load(Path::new("/no/existe/en/absoluto"), true).await;
        tokio_test::assert_err!(result);
    }

    #[test]
    fn merge_pages_concatenates_and_keeps_first_metadata() {
        let pages = vec![
            Document::new("uno ", page_metadata("/c/practica/a.pdf", 1)),
            Document::new("dos", page_metadata("/c/practica/a.pdf", 2)),
        ];
        let merged = merge_pages(vec![pages, Vec::new()]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "uno dos");
        assert_eq!(merged[0].page_label(), Some("1"));
    }

    #[test]
    fn figure_references_are_tagged() {
        assert_eq!(
            mark_figures("ver ![diagrama] aquí"),
            "ver texto Figure = ![diagrama] aquí"
        );
    }

    #[test]
    fn visible_text_ignores_markup() {
        let text = visible_text("<html><body><h1>Título</h1><p>Cuerpo  del texto</p></body></html>").unwrap();
        assert_eq!(text, "Título Cuerpo  del texto");
    }
}
