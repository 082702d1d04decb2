//! Troceado de documentos en fragmentos solapados para su indexación.
//!
//! Se prueba cada separador por orden de prioridad (saltos de párrafo, de
//! línea, fin de frase, espacio) y sólo si un trozo sigue siendo demasiado
//! largo se corta por longitud. Las longitudes se miden en caracteres.

use std::collections::VecDeque;

use crate::models::Document;

pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n\n", "\n\n", "\n", ". ", " "];

/// Capacidad de trocear documentos. Transformación pura, sin efectos.
pub trait Splitter: Send + Sync {
    fn split(&self, documents: &[Document]) -> Vec<Document>;
}

#[derive(Debug, Clone)]
pub struct RecursiveTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::with_separators(chunk_size, chunk_overlap, &DEFAULT_SEPARATORS)
    }

    pub fn with_separators(chunk_size: usize, chunk_overlap: usize, separators: &[&str]) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: separators.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Trocea un texto suelto.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Primer separador presente en el texto; los siguientes quedan para
        // los trozos que sigan siendo demasiado largos.
        let position = separators.iter().position(|sep| text.contains(sep));
        let (pieces, remaining): (Vec<&str>, &[&str]) = match position {
            Some(i) => (split_keeping_separator(text, separators[i]), &separators[i + 1..]),
            None => (vec![text], &[]),
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.extend(self.hard_cut(piece));
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Agrupa trozos consecutivos hasta `chunk_size`, conservando al inicio
    /// del siguiente fragmento como mucho `chunk_overlap` caracteres del anterior.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        push_trimmed(&mut chunks, &window);
        chunks
    }

    fn hard_cut(&self, text: &str) -> Vec<String> {
        let chars: Vec<&str> = text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
        self.merge(&chars)
    }
}

impl Splitter for RecursiveTextSplitter {
    fn split(&self, documents: &[Document]) -> Vec<Document> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .map(move |chunk| Document::new(chunk, doc.metadata.clone()))
            })
            .collect()
    }
}

/// Divide `text` por `sep` dejando el separador al principio del trozo siguiente.
fn split_keeping_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn push_trimmed(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
