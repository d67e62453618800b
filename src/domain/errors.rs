use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("No encontrado: {0}")]
    NotFound(String),
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),
    #[error("Error de operación: {0}")]
    OperationFailed(String),
    /// El modelo no se pudo cargar desde `path`.
    #[error("Unable to load model. Check the specified path: {path}")]
    ModelLoad { path: String, detail: String },
    #[error("Error occurred while opening the image: {0}")]
    Decode(String),
}

impl DomainError {
    /// Texto secundario que la interfaz muestra bajo el banner de error.
    pub fn detail(&self) -> String {
        match self {
            DomainError::ModelLoad { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
