pub mod analysis;
pub mod config;
pub mod dryrun;
pub mod session;
pub mod synthesis;
pub mod transport;

use std::sync::Arc;

use anyhow::{bail, Result};
use reader_contracts::models::{
    ModelSelection, ModelSelector, CAPABILITY_IMAGE, CAPABILITY_VISION,
};
use tracing::{debug, info, warn};

pub use analysis::{AnalysisClient, GeminiAnalysisClient};
pub use config::ReaderConfig;
pub use dryrun::{DryrunAnalysisClient, DryrunImageClient};
pub use session::{ImageInput, ReadingSession, SubmitOutcome, IMAGE_RENDER_FAILED_MESSAGE};
pub use synthesis::{GeminiImageClient, ImageSynthesisClient};
pub use transport::{ContentTransport, GeminiTransport};

/// The pair of model clients a [`ReadingSession`] runs on.
#[derive(Clone)]
pub struct SessionClients {
    pub analysis: Arc<dyn AnalysisClient>,
    pub images: Arc<dyn ImageSynthesisClient>,
    pub analysis_model: String,
    pub image_model: String,
}

impl SessionClients {
    pub fn into_session(self) -> ReadingSession {
        ReadingSession::new(self.analysis, self.images)
    }
}

pub fn build_clients(config: &ReaderConfig) -> Result<SessionClients> {
    let selector = ModelSelector::new(None);
    let analysis_selection = select_model(
        &selector,
        config.analysis_model.as_deref(),
        CAPABILITY_VISION,
    )?;
    let image_selection = select_model(&selector, config.image_model.as_deref(), CAPABILITY_IMAGE)?;

    let mut gemini: Option<Arc<GeminiTransport>> = None;
    let mut gemini_transport = || -> Result<Arc<dyn ContentTransport>> {
        if let Some(existing) = gemini.as_ref() {
            let shared: Arc<dyn ContentTransport> = existing.clone();
            return Ok(shared);
        }
        let Some(api_key) = config.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set");
        };
        let transport = Arc::new(GeminiTransport::new(&config.api_base, api_key)?);
        gemini = Some(transport.clone());
        let shared: Arc<dyn ContentTransport> = transport;
        Ok(shared)
    };

    let analysis_model = analysis_selection.model.name.clone();
    let analysis: Arc<dyn AnalysisClient> = match analysis_selection.model.provider.as_str() {
        "gemini" => Arc::new(GeminiAnalysisClient::new(
            gemini_transport()?,
            analysis_model.clone(),
        )),
        "dryrun" => Arc::new(DryrunAnalysisClient),
        other => bail!("Unsupported analysis provider '{other}'"),
    };

    let image_model = image_selection.model.name.clone();
    let images: Arc<dyn ImageSynthesisClient> = match image_selection.model.provider.as_str() {
        "gemini" => Arc::new(GeminiImageClient::new(
            gemini_transport()?,
            image_model.clone(),
        )),
        "dryrun" => Arc::new(DryrunImageClient::default()),
        other => bail!("Unsupported image provider '{other}'"),
    };

    info!(
        analysis_model = analysis_model.as_str(),
        image_model = image_model.as_str(),
        "model clients ready"
    );
    Ok(SessionClients {
        analysis,
        images,
        analysis_model,
        image_model,
    })
}

fn select_model(
    selector: &ModelSelector,
    requested: Option<&str>,
    capability: &str,
) -> Result<ModelSelection> {
    let selection = selector
        .select(requested, capability)
        .map_err(anyhow::Error::msg)?;
    if let Some(reason) = selection.fallback_reason.as_deref() {
        if selection.requested.is_some() {
            warn!(model = selection.model.name.as_str(), "{reason}");
        } else {
            debug!(model = selection.model.name.as_str(), "{reason}");
        }
    }
    Ok(selection)
}
