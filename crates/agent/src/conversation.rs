use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use mercalytica_core::{Message, Role};

use crate::guardrails::{GuardrailDecision, PromptGuard};
use crate::llm::{AgentError, AgentHandle, AgentMessage, AgentProvider};
use crate::normalizer::extract_text;
use crate::report::{DocumentRenderer, RenderError};

/// Token the agent puts on its own line to ask for a formal report.
pub const REPORT_MARKER: &str = "[REPORTE_INICIADO]";

pub const REPORT_CONFIRMATION: &str = "**[Reporte Creado]**\n\
Su análisis ha sido completado y el reporte está listo. Puede descargarlo a través del enlace.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentResponse {
    pub text: String,
    pub report_file: Option<String>,
}

impl AgentResponse {
    fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), report_file: None }
    }
}

#[derive(Debug, Error)]
enum RespondError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl RespondError {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Agent(AgentError::Load(_) | AgentError::NoHandle) => "chat.agent.load_failed",
            Self::Agent(_) => "chat.agent.invoke_failed",
            Self::Render(_) => "chat.report.render_failed",
        }
    }
}

/// Rules every agent call starts with. `today` is stamped into generated reports.
pub fn system_contract(today: NaiveDate) -> String {
    format!(
        "Eres un Asistente Analítico de Mercado (AAM). Tu rol es proporcionar análisis concisos, \
precisos y profesionales sobre productos, empresas y tendencias del mercado.

REGLAS Y FUNCIONALIDAD

1. Actúa siempre como un analista profesional de mercado.
2. Mantén la coherencia con el historial de la sesión.
3. Usa las herramientas disponibles para consultar datos de usuarios, empresas, productos y órdenes, \
y para buscar reseñas y menciones en la web y redes sociales con su análisis de sentimiento.

GENERACIÓN DE REPORTE

4. Si el usuario solicita un reporte formal o un análisis completo, inicia la respuesta exactamente \
con la etiqueta {marker}, sola en su propia línea.
5. No uses la etiqueta {marker} para consultas informales.
6. La fecha para cualquier reporte es: {date}.

FORMATO DEL TEXTO DEL REPORTE

7. Después de la etiqueta no añadas símbolos decorativos ni líneas vacías. Comienza el texto del \
reporte inmediatamente en la línea siguiente.
8. No uses formato Markdown: nada de negritas, cursivas ni listas con guiones o asteriscos.
9. Para simular encabezados usa TEXTO EN MAYÚSCULAS y separa párrafos y secciones únicamente con \
un doble salto de línea.",
        marker = REPORT_MARKER,
        date = today.format("%d/%m/%Y"),
    )
}

/// Runs one agent exchange over a session history.
///
/// The agent handle is loaded on first use and shared afterwards. A failed load
/// leaves the slot empty, so the next call tries again.
pub struct ConversationOrchestrator {
    provider: Arc<dyn AgentProvider>,
    renderer: Arc<dyn DocumentRenderer>,
    guard: PromptGuard,
    agent: OnceCell<Arc<dyn AgentHandle>>,
    invoke_timeout: Duration,
}

impl ConversationOrchestrator {
    pub fn new(
        provider: Arc<dyn AgentProvider>,
        renderer: Arc<dyn DocumentRenderer>,
        invoke_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            renderer,
            guard: PromptGuard::new(),
            agent: OnceCell::new(),
            invoke_timeout,
        }
    }

    /// Never fails: agent and renderer faults come back as a displayable error reply.
    pub async fn respond(&self, history: &[Message]) -> AgentResponse {
        match self.try_respond(history).await {
            Ok(response) => response,
            Err(error) => {
                warn!(event_name = error.event_name(), error = %error, "agent exchange failed");
                AgentResponse::plain(format!(
                    "ERROR: Fallo al procesar la solicitud del modelo. Por favor, inténtelo de nuevo. \
Detalle: {error}"
                ))
            }
        }
    }

    async fn try_respond(&self, history: &[Message]) -> Result<AgentResponse, RespondError> {
        let agent = self.agent().await?;

        if let Some(last) = history.last().filter(|message| message.role == Role::User) {
            if let GuardrailDecision::Deny { reason_code, user_message } =
                self.guard.evaluate(&last.text)
            {
                warn!(
                    event_name = "chat.guardrail.blocked",
                    reason_code,
                    "user message blocked before reaching the agent"
                );
                return Ok(AgentResponse::plain(user_message));
            }
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(AgentMessage::system(system_contract(Utc::now().date_naive())));
        messages.extend(history.iter().map(AgentMessage::from));

        let reply = tokio::time::timeout(self.invoke_timeout, agent.invoke(&messages))
            .await
            .map_err(|_| AgentError::Timeout(self.invoke_timeout))??;
        let text = extract_text(&reply);

        if !text.contains(REPORT_MARKER) {
            return Ok(AgentResponse::plain(text));
        }

        let body = text.replace(REPORT_MARKER, "").trim().to_string();
        let artifact = self.renderer.render(&body).await?;
        info!(
            event_name = "chat.report.generated",
            filename = %artifact.filename,
            "report artifact generated"
        );

        Ok(AgentResponse {
            text: format!("{REPORT_CONFIRMATION}\n\n{body}"),
            report_file: Some(artifact.filename),
        })
    }

    async fn agent(&self) -> Result<Arc<dyn AgentHandle>, AgentError> {
        let agent = self
            .agent
            .get_or_try_init(|| async {
                self.provider.load().await.and_then(|agent| agent.ok_or(AgentError::NoHandle))
            })
            .await?;
        Ok(Arc::clone(agent))
    }
}
