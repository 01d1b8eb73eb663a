//! Report rendering for agent-generated market reports.
//!
//! The report body is laid into an HTML template and converted with `wkhtmltopdf`
//! when that binary is on `PATH`. Without it, or when conversion fails, the HTML
//! itself is stored as the artifact.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tera::{Context, Tera};
use tokio::process::Command;
use tracing::{error, info, warn};

use mercalytica_agent::report::{DocumentRenderer, RenderError};
use mercalytica_core::config::ReportsConfig;
use mercalytica_core::ReportArtifact;

pub const REPORT_TITLE: &str = "Reporte Analítico de Mercado";
const REPORT_TEMPLATE: &str = "report.html.tera";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Pdf,
    Html,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Html => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Html => "text/html; charset=utf-8",
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        match Path::new(filename).extension()?.to_str()? {
            "pdf" => Some(Self::Pdf),
            "html" => Some(Self::Html),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ReportView<'a> {
    title: &'a str,
    generated_at: String,
    sections: Vec<Vec<&'a str>>,
}

#[derive(Clone, Debug)]
pub struct ReportRenderer {
    tera: Tera,
    wkhtmltopdf_path: Option<PathBuf>,
    output_dir: PathBuf,
}

impl ReportRenderer {
    /// Loads templates from `template_dir`, falling back to the embedded copy.
    pub fn new(config: &ReportsConfig) -> Self {
        let pattern = format!("{}/**/*", config.template_dir.display());
        let tera = match Tera::new(&pattern) {
            Ok(tera) if tera.get_template_names().any(|name| name == REPORT_TEMPLATE) => tera,
            Ok(_) => {
                warn!(
                    event_name = "system.reports.embedded_template",
                    template_dir = %config.template_dir.display(),
                    "report template not found on disk, using embedded template"
                );
                Self::embedded_templates()
            }
            Err(error) => {
                warn!(
                    event_name = "system.reports.embedded_template",
                    error = %error,
                    "report templates failed to load, using embedded template"
                );
                Self::embedded_templates()
            }
        };

        let wkhtmltopdf_path = which::which("wkhtmltopdf").ok();
        match &wkhtmltopdf_path {
            Some(path) => info!(path = %path.display(), "wkhtmltopdf found"),
            None => warn!("wkhtmltopdf not found in PATH, reports will be stored as HTML"),
        }

        Self { tera, wkhtmltopdf_path, output_dir: config.output_dir.clone() }
    }

    fn embedded_templates() -> Tera {
        let mut tera = Tera::default();
        tera.add_raw_template(
            REPORT_TEMPLATE,
            include_str!("../../../templates/reports/report.html.tera"),
        )
        .expect("embedded report template must parse");
        tera
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn render_html(&self, content: &str) -> Result<String, RenderError> {
        let view = ReportView {
            title: REPORT_TITLE,
            generated_at: Utc::now().format("%d-%m-%Y %H:%M:%S UTC").to_string(),
            sections: split_sections(content),
        };
        let context =
            Context::from_serialize(&view).map_err(|e| RenderError::Template(e.to_string()))?;
        self.tera.render(REPORT_TEMPLATE, &context).map_err(|e| RenderError::Template(e.to_string()))
    }

    async fn convert_html_to_pdf(
        &self,
        html: &str,
        wkhtmltopdf_path: &Path,
        pdf_path: &Path,
    ) -> Result<(), RenderError> {
        let html_path = std::env::temp_dir().join(format!("report_{}.html", uuid::Uuid::new_v4()));
        tokio::fs::write(&html_path, html).await?;

        let output = Command::new(wkhtmltopdf_path)
            .args(["--page-size", "A4"])
            .args(["--margin-top", "15mm", "--margin-bottom", "15mm"])
            .args(["--margin-left", "12mm", "--margin-right", "12mm"])
            .args(["--encoding", "utf-8", "--quiet"])
            .arg(&html_path)
            .arg(pdf_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;
        let _ = tokio::fs::remove_file(&html_path).await;
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, "wkhtmltopdf failed");
            return Err(RenderError::Conversion(stderr.trim().to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl DocumentRenderer for ReportRenderer {
    async fn render(&self, content: &str) -> Result<ReportArtifact, RenderError> {
        let html = self.render_html(content)?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let stem = format!("report_{}", Utc::now().format("%Y%m%dT%H%M%S%6fZ"));

        if let Some(wkhtmltopdf) = &self.wkhtmltopdf_path {
            let filename = format!("{stem}.{}", ReportFormat::Pdf.extension());
            match self.convert_html_to_pdf(&html, wkhtmltopdf, &self.output_dir.join(&filename)).await
            {
                Ok(()) => return Ok(ReportArtifact { filename, content: content.to_string() }),
                Err(error) => {
                    warn!(error = %error, "PDF conversion failed, storing report as HTML");
                }
            }
        }

        let filename = format!("{stem}.{}", ReportFormat::Html.extension());
        tokio::fs::write(self.output_dir.join(&filename), html).await?;
        Ok(ReportArtifact { filename, content: content.to_string() })
    }
}

/// Sections are separated by blank lines; lines inside a section stay as line breaks.
fn split_sections(content: &str) -> Vec<Vec<&str>> {
    let mut sections = Vec::new();
    let mut current = Vec::new();

    for line in content.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }

    sections
}

#[cfg(test)]
mod tests {
    use mercalytica_agent::report::DocumentRenderer;
    use mercalytica_core::config::ReportsConfig;

    use super::{split_sections, ReportFormat, ReportRenderer, REPORT_TITLE};

    fn html_only_renderer(output_dir: &std::path::Path) -> ReportRenderer {
        let mut renderer = ReportRenderer::new(&ReportsConfig {
            output_dir: output_dir.to_path_buf(),
            template_dir: output_dir.join("no-templates-here"),
        });
        renderer.wkhtmltopdf_path = None;
        renderer
    }

    #[test]
    fn sections_split_on_blank_lines() {
        let sections = split_sections("RESUMEN\nventas al alza\n\n\n  \nDETALLE\n");

        assert_eq!(sections, vec![vec!["RESUMEN", "ventas al alza"], vec!["DETALLE"]]);
        assert!(split_sections("\n\n").is_empty());
    }

    #[tokio::test]
    async fn renders_html_artifact_when_wkhtmltopdf_is_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = html_only_renderer(&dir.path().join("reports"));

        let artifact = renderer
            .render("RESUMEN EJECUTIVO\nVentas <estables>\n\nCONCLUSIÓN")
            .await
            .expect("render");

        assert!(artifact.filename.starts_with("report_"));
        assert_eq!(ReportFormat::from_filename(&artifact.filename), Some(ReportFormat::Html));

        let html = std::fs::read_to_string(renderer.output_dir().join(&artifact.filename))
            .expect("artifact written");
        assert!(html.contains(REPORT_TITLE));
        assert!(html.contains("RESUMEN EJECUTIVO<br>Ventas &lt;estables&gt;"));
        assert!(html.contains("CONCLUSIÓN"));
    }

    #[tokio::test]
    async fn consecutive_renders_get_distinct_filenames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = html_only_renderer(dir.path());

        let first = renderer.render("UNO").await.expect("render");
        let second = renderer.render("DOS").await.expect("render");

        assert_ne!(first.filename, second.filename);
    }

    #[test]
    fn report_format_follows_extension() {
        assert_eq!(ReportFormat::from_filename("report_1.pdf"), Some(ReportFormat::Pdf));
        assert_eq!(ReportFormat::from_filename("report_1.html"), Some(ReportFormat::Html));
        assert_eq!(ReportFormat::from_filename("report_1.txt"), None);
        assert_eq!(ReportFormat::Pdf.content_type(), "application/pdf");
    }
}
