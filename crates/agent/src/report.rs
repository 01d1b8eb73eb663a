use async_trait::async_trait;
use thiserror::Error;

use mercalytica_core::ReportArtifact;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("report template error: {0}")]
    Template(String),
    #[error("report conversion failed: {0}")]
    Conversion(String),
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns report text into a retrievable artifact named `report_<UTC timestamp>.<ext>`.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, content: &str) -> Result<ReportArtifact, RenderError>;
}
