//! Wire models for the grade relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    auth::{MasteryMap, SignatureHash},
    config::{BlockConfig, BlockKind},
    launch::LaunchParams,
};

/// A decoded grade callback. Missing or mistyped fields are `None` so the
/// verifier can report them. A non-numeric mastery value is left out of the
/// map and its topic kept in `invalid_topic`, to be reported once the
/// required fields have been checked.
///
/// Body of `POST /blocks/:block_id/grade`:
/// `{ "mastery": { "<topic>": 0.7 }, "user_id": "...", "signature": "<hex>" }`
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackPayload {
    pub mastery: Option<MasteryMap>,
    pub user_id: Option<String>,
    pub signature: Option<String>,
    /// First topic (in key order) whose mastery is not a JSON number.
    pub invalid_topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("callback payload is not a JSON object")]
    NotAnObject,
}

impl CallbackPayload {
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let obj = value.as_object().ok_or(PayloadError::NotAnObject)?;

        let mut invalid_topic = None;
        let mastery = obj.get("mastery").and_then(Value::as_object).map(|entries| {
            let mut map = MasteryMap::new();
            for (topic, score) in entries {
                match score.as_f64() {
                    Some(score) => {
                        map.insert(topic.clone(), score);
                    }
                    None => {
                        invalid_topic.get_or_insert_with(|| topic.clone());
                    }
                }
            }
            map
        });

        let text = |field: &str| obj.get(field).and_then(Value::as_str).map(str::to_owned);

        Ok(Self {
            mastery,
            user_id: text("user_id"),
            signature: text("signature"),
            invalid_topic,
        })
    }
}

/// The `grade` event handed to the host's publishing facility.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeEvent {
    pub block_id: String,
    pub event_type: &'static str,
    pub value: f64,
    pub max_value: f64,
    pub user_id: String,
    pub module_id: String,
    pub emitted_at: DateTime<Utc>,
}

/// Response for `GET /blocks/:block_id`. Never carries the shared key.
#[derive(Debug, Serialize)]
pub struct BlockInfo {
    pub block_id: String,
    pub kind: BlockKind,
    pub display_name: String,
    pub module_id: String,
    pub module_title: String,
    pub module_description: String,
    pub base_url: String,
    pub has_score: bool,
    pub weight: f64,
    pub signature_hash: SignatureHash,
    pub shared_key_configured: bool,
}

impl From<&BlockConfig> for BlockInfo {
    fn from(b: &BlockConfig) -> Self {
        Self {
            block_id: b.block_id.clone(),
            kind: b.kind,
            display_name: b.display_name(),
            module_id: b.module_id.clone(),
            module_title: b.module_title.clone(),
            module_description: b.module_description.clone(),
            base_url: b.base_url.clone(),
            has_score: b.has_score(),
            weight: b.weight,
            signature_hash: b.signature_hash,
            shared_key_configured: !b.shared_key.is_empty(),
        }
    }
}

/// Query string for `GET /blocks/:block_id/launch`.
#[derive(Debug, Deserialize)]
pub struct LaunchQuery {
    /// Anonymous student id supplied by the LMS runtime, if any.
    pub anonymous_student_id: Option<String>,
}

/// Response for `GET /blocks/:block_id/launch`.
#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub display_name: String,
    pub iframe_url: String,
    pub screenshot_url: String,
    pub params: LaunchParams,
}
