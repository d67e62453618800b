use serde::{Deserialize, Serialize};

use super::errors::{DomainError, DomainResult};

/// Tipos de fuente que ofrece la barra lateral, en el orden en que se muestran.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    Video,
    Webcam,
    #[serde(rename = "RTSP")]
    Rtsp,
    #[serde(rename = "YouTube")]
    Youtube,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Image,
        SourceKind::Video,
        SourceKind::Webcam,
        SourceKind::Rtsp,
        SourceKind::Youtube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Image => "Image",
            SourceKind::Video => "Video",
            SourceKind::Webcam => "Webcam",
            SourceKind::Rtsp => "RTSP",
            SourceKind::Youtube => "YouTube",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == raw.trim())
            .ok_or_else(invalid_source)
    }
}

pub fn invalid_source() -> DomainError {
    DomainError::InvalidInput("Please select a valid source type!".into())
}

/// Fuente continua ya resuelta a partir de la selección del usuario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum StreamSource {
    Video(String),
    Webcam(u32),
    Rtsp(String),
    Youtube(String),
}

impl StreamSource {
    /// Combina el tipo elegido con su valor (ruta, índice o URL).
    pub fn from_selection(kind: SourceKind, value: &str) -> DomainResult<Self> {
        let value = value.trim();
        match kind {
            SourceKind::Image => Err(DomainError::InvalidInput(
                "Image source is handled by the image detector, not the stream".into(),
            )),
            SourceKind::Video if !value.is_empty() => Ok(StreamSource::Video(value.to_string())),
            SourceKind::Webcam => value
                .parse::<u32>()
                .map(StreamSource::Webcam)
                .map_err(|_| DomainError::InvalidInput(format!("webcam index must be a number, got '{value}'"))),
            SourceKind::Rtsp if value.starts_with("rtsp://") || value.starts_with("rtsps://") => {
                Ok(StreamSource::Rtsp(value.to_string()))
            }
            SourceKind::Youtube if is_youtube_url(value) => Ok(StreamSource::Youtube(value.to_string())),
            SourceKind::Video => Err(DomainError::InvalidInput("no video selected".into())),
            SourceKind::Rtsp => Err(DomainError::InvalidInput(format!("not an RTSP url: '{value}'"))),
            SourceKind::Youtube => Err(DomainError::InvalidInput(format!("not a YouTube url: '{value}'"))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StreamSource::Video(p) => format!("video:{p}"),
            StreamSource::Webcam(i) => format!("webcam:{i}"),
            StreamSource::Rtsp(u) => format!("rtsp:{u}"),
            StreamSource::Youtube(u) => format!("youtube:{u}"),
        }
    }
}

fn is_youtube_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .unwrap_or(value);
    let rest = rest.strip_prefix("www.").or_else(|| rest.strip_prefix("m.")).unwrap_or(rest);
    rest.starts_with("youtube.com/") || rest.starts_with("youtu.be/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sidebar_labels() {
        assert_eq!(SourceKind::parse("RTSP").unwrap(), SourceKind::Rtsp);
        assert_eq!(SourceKind::parse("YouTube").unwrap(), SourceKind::Youtube);
    }

    #[test]
    fn empty_or_unknown_source_is_a_user_error() {
        for raw in ["", "Screen", "rtsp"] {
            let err = SourceKind::parse(raw).unwrap_err();
            assert_eq!(err.to_string(), "Entrada inválida: Please select a valid source type!");
        }
    }

    #[test]
    fn webcam_needs_numeric_index() {
        assert_eq!(StreamSource::from_selection(SourceKind::Webcam, "2").unwrap(), StreamSource::Webcam(2));
        assert!(StreamSource::from_selection(SourceKind::Webcam, "cam").is_err());
    }

    #[test]
    fn youtube_urls_are_recognised() {
        assert!(StreamSource::from_selection(SourceKind::Youtube, "https://www.youtube.com/watch?v=abc").is_ok());
        assert!(StreamSource::from_selection(SourceKind::Youtube, "https://youtu.be/abc").is_ok());
        assert!(StreamSource::from_selection(SourceKind::Youtube, "https://vimeo.com/1").is_err());
    }

    #[test]
    fn rtsp_requires_scheme() {
        assert!(StreamSource::from_selection(SourceKind::Rtsp, "rtsp://10.0.0.2:8554/cam").is_ok());
        assert!(StreamSource::from_selection(SourceKind::Rtsp, "http://10.0.0.2").is_err());
    }
}
