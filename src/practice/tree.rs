//! Árbol de resúmenes con la forma del directorio de prácticas.
//!
//! Cada directorio es un mapa `nombre -> nodo`; cada fichero es una hoja que
//! empieza vacía (`null` en JSON) y acaba conteniendo su resumen.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Clave y valor que sustituyen a un subárbol ilegible por falta de permisos.
pub const PERMISSION_ERROR_KEY: &str = "error";
pub const PERMISSION_ERROR_VALUE: &str = "Permission denied";

pub type SummaryTree = BTreeMap<String, TreeNode>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Dir(SummaryTree),
    Leaf(Option<String>),
}

impl TreeNode {
    pub fn summary(&self) -> Option<&str> {
        match self {
            TreeNode::Leaf(Some(s)) => Some(s),
            _ => None,
        }
    }
}

/// Recorre `path` y construye el árbol. Las claves quedan ordenadas por
/// nombre; un directorio sin permisos de lectura se sustituye por
/// `{"error": "Permission denied"}` y el recorrido sigue.
pub fn build_tree(path: &Path) -> std::io::Result<SummaryTree> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            return Ok(SummaryTree::from([(
                PERMISSION_ERROR_KEY.to_string(),
                TreeNode::Leaf(Some(PERMISSION_ERROR_VALUE.to_string())),
            )]));
        }
        Err(err) => return Err(err),
    };

    let mut tree = SummaryTree::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        // `file_type` no sigue enlaces: un enlace simbólico es una hoja.
        let node = if entry.file_type()?.is_dir() {
            TreeNode::Dir(build_tree(&entry.path())?)
        } else {
            TreeNode::Leaf(None)
        };
        tree.insert(name, node);
    }
    Ok(tree)
}

fn normal_segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Segmentos de `path` relativos a `root`. `None` si `path` no cuelga de
/// `root` o si coincide con él.
pub fn path_relative_to(path: &str, root: &Path) -> Option<Vec<String>> {
    let relative = Path::new(path).strip_prefix(root).ok()?;
    Some(normal_segments(relative)).filter(|segments| !segments.is_empty())
}

/// Segmentos de `path` posteriores a la primera aparición de `marker`
/// (sin distinguir mayúsculas). Falla si el marcador no aparece o si no le
/// sigue ningún segmento.
pub fn path_after_marker(path: &str, marker: &str) -> Result<Vec<String>, StoreError> {
    let marker_lower = marker.to_lowercase();
    let segments = normal_segments(Path::new(path));

    segments
        .iter()
        .position(|s| s.to_lowercase() == marker_lower)
        .map(|i| segments[i + 1..].to_vec())
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| StoreError::MarkerNotFound {
            marker: marker.to_string(),
            path: path.to_string(),
        })
}

/// Escribe `value` como hoja en la ruta `keys`, creando (o reemplazando por)
/// mapas vacíos los niveles intermedios que hagan falta.
pub fn write_value(tree: &mut SummaryTree, keys: &[String], value: String) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = tree;
    for key in parents {
        let node = current.entry(key.clone()).or_insert(TreeNode::Leaf(None));
        if let TreeNode::Leaf(_) = node {
            *node = TreeNode::Dir(SummaryTree::new());
        }
        let TreeNode::Dir(children) = node else {
            return;
        };
        current = children;
    }
    current.insert(last.clone(), TreeNode::Leaf(Some(value)));
}

/// Aplana el árbol a pares `(ruta "a/b/fichero", resumen)`. Las hojas sin
/// resumen no aparecen.
pub fn flatten(tree: &SummaryTree) -> Vec<(String, String)> {
    fn walk(tree: &SummaryTree, prefix: &str, out: &mut Vec<(String, String)>) {
        for (key, node) in tree {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}/{key}")
            };
            match node {
                TreeNode::Dir(children) => walk(children, &path, out),
                TreeNode::Leaf(Some(summary)) => out.push((path, summary.clone())),
                TreeNode::Leaf(None) => {}
            }
        }
    }

    let mut out = Vec::new();
    walk(tree, "", &mut out);
    out
}
