//! Partner parameters and URLs for launching the School Yourself iframe.

use serde::Serialize;
use url::Url;

use crate::{auth, config::BlockConfig};

/// User id sent when the LMS gives us no anonymous student id
/// (Studio previews, local workbench).
pub const DEBUG_STUDENT_ID: &str = "debug";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("base URL '{0}' cannot be extended")]
    BaseUrl(String),
}

/// URL parameters identifying the partner and the (signed) learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchParams {
    pub partner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_signature: Option<String>,
}

pub fn student_id(anonymous_student_id: Option<&str>) -> &str {
    match anonymous_student_id {
        Some(id) if !id.is_empty() => id,
        _ => DEBUG_STUDENT_ID,
    }
}

/// Build the partner parameters. The user id is signed only when the block
/// has a shared key.
pub fn launch_params(block: &BlockConfig, user_id: Option<&str>) -> LaunchParams {
    let mut params = LaunchParams {
        partner: block.partner_id.clone(),
        partner_user_id: None,
        partner_signature: None,
    };

    if let Some(user_id) = user_id.filter(|id| !id.is_empty()) {
        params.partner_user_id = Some(user_id.to_string());
        if !block.shared_key.is_empty() {
            params.partner_signature = Some(auth::partner_signature(
                block.shared_key.expose(),
                user_id,
                block.signature_hash,
            ));
        }
    }

    params
}

fn extend(base_url: &str, segments: &[&str]) -> Result<Url, LaunchError> {
    let mut url = Url::parse(base_url).map_err(|_| LaunchError::BaseUrl(base_url.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| LaunchError::BaseUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// `{base_url}/player?id={module_id}&partner=...`
pub fn iframe_url(block: &BlockConfig, params: &LaunchParams) -> Result<Url, LaunchError> {
    let mut url = extend(&block.base_url, &["player"])?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("id", &block.module_id);
        query.append_pair("partner", &params.partner);
        if let Some(user_id) = &params.partner_user_id {
            query.append_pair("partner_user_id", user_id);
        }
        if let Some(signature) = &params.partner_signature {
            query.append_pair("partner_signature", signature);
        }
    }
    Ok(url)
}

/// `{base_url}/screenshot/{module_id}`
pub fn screenshot_url(block: &BlockConfig) -> Result<Url, LaunchError> {
    let mut segments = vec!["screenshot"];
    segments.extend(block.module_id.split('/'));
    extend(&block.base_url, &segments)
}
