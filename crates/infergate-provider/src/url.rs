//! URL building for upstream endpoints.
//!
//! Path segments are pushed with `path_segments_mut` so ids and model
//! names are percent-encoded instead of concatenated.

use infergate_core::ModelRef;
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Parse a base URL, refusing ones that cannot carry path segments.
pub fn parse_base(raw: &str) -> ProviderResult<Url> {
    let url = Url::parse(raw.trim_end_matches('/'))?;
    if url.cannot_be_a_base() {
        return Err(ProviderError::InvalidUrl(format!(
            "{raw} cannot be used as a base URL"
        )));
    }
    Ok(url)
}

fn with_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        path.extend(segments);
    }
    url
}

/// Endpoints of a prediction API rooted at `base`.
#[derive(Debug, Clone)]
pub struct PredictionRoutes {
    base: Url,
}

impl PredictionRoutes {
    pub fn new(base_url: &str) -> ProviderResult<Self> {
        Ok(Self {
            base: parse_base(base_url)?,
        })
    }

    /// Versioned runs go to `/predictions`; otherwise the model's own
    /// predictions endpoint runs its latest version.
    pub fn create(&self, model: Option<&ModelRef>, versioned: bool) -> ProviderResult<Url> {
        if versioned {
            return Ok(with_segments(&self.base, ["predictions"]));
        }
        let model = model.ok_or_else(|| {
            ProviderError::InvalidArgument(
                "either a version or an owner/name model is required".to_string(),
            )
        })?;
        Ok(with_segments(
            &self.base,
            ["models", &model.owner, &model.name, "predictions"],
        ))
    }

    pub fn get(&self, id: &str) -> Url {
        with_segments(&self.base, ["predictions", id])
    }

    pub fn cancel(&self, id: &str) -> Url {
        with_segments(&self.base, ["predictions", id, "cancel"])
    }

    pub fn model(&self, model: &ModelRef) -> Url {
        with_segments(&self.base, ["models", &model.owner, &model.name])
    }
}

/// `{base}/v1/chat/completions`, tolerating bases that already end in `/v1`.
pub fn chat_url(base_url: &str) -> ProviderResult<Url> {
    let base = parse_base(base_url)?;
    let segments: &[&str] = if base.path().trim_end_matches('/').ends_with("/v1") {
        &["chat", "completions"]
    } else {
        &["v1", "chat", "completions"]
    };
    Ok(with_segments(&base, segments.iter().copied()))
}

/// `{base}/health` on the engine's root, dropping a trailing `/v1`.
pub fn health_url(base_url: &str) -> ProviderResult<Url> {
    let trimmed = base_url.trim_end_matches('/');
    let root = trimmed.strip_suffix("/v1").unwrap_or(trimmed);
    Ok(with_segments(&parse_base(root)?, ["health"]))
}
