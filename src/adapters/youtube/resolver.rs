use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::application::ports::StreamUrlResolverPort;
use crate::domain::errors::{DomainError, DomainResult};

/// Resuelve una página de YouTube a la URL directa del vídeo usando `yt-dlp -g`.
pub struct YtDlpResolver {
    binary: String,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl StreamUrlResolverPort for YtDlpResolver {
    fn resolve(&self, page_url: &str) -> DomainResult<String> {
        info!("Resolviendo URL de YouTube: {}", page_url);
        let output = Command::new(&self.binary)
            .args(["-g", "-f", "best[ext=mp4]/best", "--no-playlist", page_url])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo ejecutar {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} terminó con {}: {}", self.binary, output.status, stderr.trim());
            return Err(DomainError::OperationFailed(format!("yt-dlp failed: {}", stderr.trim())));
        }

        first_stream_url(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| DomainError::NotFound(format!("no playable stream for {page_url}")))
    }
}

/// Primera línea de la salida de `yt-dlp -g` que sea una URL.
pub fn first_stream_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("http://") || l.starts_with("https://"))
        .map(str::to_string)
}
