use std::path::PathBuf;

use crate::domain::errors::{DomainError, DomainResult};

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "avi", "mkv", "mov", "webm", "m4v"];

/// Vídeos almacenados que se ofrecen en el selector de la rama de vídeo.
pub struct VideoLibrary {
    dir: PathBuf,
}

impl VideoLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Nombres de fichero ordenados; un directorio inexistente es una lista vacía.
    pub fn list(&self) -> Vec<String> {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = read_dir
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }

    /// Ruta completa de un vídeo de la lista; solo se aceptan nombres listados.
    pub fn resolve(&self, name: &str) -> DomainResult<String> {
        if self.list().iter().any(|n| n == name) {
            Ok(self.dir.join(name).to_string_lossy().into_owned())
        } else {
            Err(DomainError::NotFound(format!("video '{name}' is not in {}", self.dir.display())))
        }
    }
}
