//! End-to-end handling of one grade callback.
//!
//! ```text
//! Received ─┬─> MalformedInput / SignatureMismatch               (no grade)
//!           └─> Verified ─┬─> TopicNotFound / InvalidMasteryValue (no grade)
//!                         └─> Translated ──> GradeEmitted
//! ```
//!
//! Each callback is independent: the same signed payload always produces the
//! same grade, and nothing is retried.

use serde_json::Value;

use crate::{
    auth::{self, MalformedReason, VerificationResult},
    config::BlockConfig,
    grading::{self, Grade, TranslationError},
    models::{CallbackPayload, GradeEvent, PayloadError},
    publish::GradePublisher,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallbackError {
    #[error("callback payload is not a JSON object")]
    NotAnObject,

    #[error("malformed input: {0}")]
    MalformedInput(MalformedReason),

    #[error("block has no shared key configured")]
    KeyNotConfigured,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error(transparent)]
    Translation(#[from] TranslationError),
}

impl From<PayloadError> for CallbackError {
    fn from(e: PayloadError) -> Self {
        match e {
            PayloadError::NotAnObject => CallbackError::NotAnObject,
        }
    }
}

impl CallbackError {
    /// Outcome code returned to the partner.
    pub fn code(&self) -> &'static str {
        match self {
            CallbackError::MalformedInput(_) | CallbackError::KeyNotConfigured => "forbidden",
            CallbackError::NotAnObject | CallbackError::Translation(_) => "bad_request",
            CallbackError::SignatureMismatch => "invalid_signature",
        }
    }
}

/// A callback that made it all the way through verification and translation.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedCallback {
    pub user_id: String,
    pub grade: Grade,
}

/// Decode, verify and translate a callback for `block`. Pure; emits nothing.
pub fn process(block: &BlockConfig, payload: &Value) -> Result<GradedCallback, CallbackError> {
    let payload = CallbackPayload::from_value(payload)?;

    if block.shared_key.is_empty() {
        return Err(CallbackError::KeyNotConfigured);
    }

    // Missing fields outrank a bad mastery value; neither reaches the HMAC.
    if let Some(topic) = payload.invalid_topic {
        auth::require_fields(
            payload.user_id.as_deref(),
            payload.mastery.as_ref(),
            payload.signature.as_deref(),
        )
        .map_err(CallbackError::MalformedInput)?;
        return Err(TranslationError::InvalidMasteryValue(topic).into());
    }

    let mastery = match auth::verify(
        block.shared_key.expose(),
        payload.user_id.as_deref(),
        payload.mastery.as_ref(),
        payload.signature.as_deref(),
        block.signature_hash,
    ) {
        VerificationResult::Verified(mastery) => mastery,
        VerificationResult::SignatureMismatch => return Err(CallbackError::SignatureMismatch),
        VerificationResult::MalformedInput(reason) => {
            return Err(CallbackError::MalformedInput(reason))
        }
    };

    let grade = grading::translate(&mastery, &block.module_id)?;

    Ok(GradedCallback {
        // verify() only returns Verified for a non-empty user id
        user_id: payload.user_id.unwrap_or_default(),
        grade,
    })
}

/// Run a callback through the pipeline and publish the grade on success.
pub fn handle_grade(
    block: &BlockConfig,
    payload: &Value,
    publisher: &dyn GradePublisher,
) -> Result<Grade, CallbackError> {
    let graded = match process(block, payload) {
        Ok(graded) => graded,
        Err(e) => {
            match &e {
                CallbackError::SignatureMismatch => tracing::warn!(
                    block_id = %block.block_id,
                    "Rejected grade callback: signature mismatch (tampering or misconfigured key?)"
                ),
                CallbackError::KeyNotConfigured => tracing::warn!(
                    block_id = %block.block_id,
                    "Rejected grade callback: no shared key configured"
                ),
                other => tracing::debug!(
                    block_id = %block.block_id,
                    "Rejected grade callback: {other}"
                ),
            }
            return Err(e);
        }
    };

    if block.has_score() {
        publisher.publish(GradeEvent {
            block_id: block.block_id.clone(),
            event_type: "grade",
            value: graded.grade.value,
            max_value: graded.grade.max_value,
            user_id: graded.user_id.clone(),
            module_id: block.module_id.clone(),
            emitted_at: chrono::Utc::now(),
        });
    } else {
        tracing::debug!(block_id = %block.block_id, "Block is ungraded — grade not published");
    }

    tracing::info!(
        block_id = %block.block_id,
        user_id = %graded.user_id,
        "Grade callback accepted: {:.3}",
        graded.grade.value
    );

    Ok(graded.grade)
}
