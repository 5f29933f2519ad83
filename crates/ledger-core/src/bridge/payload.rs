//! Host-facing submission payload

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::SendPayload;

/// Body of `CREATE_EXPENSE` / `CREATE_INCOME`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u64>,
}

impl From<&SendPayload> for SubmissionPayload {
    fn from(payload: &SendPayload) -> Self {
        let amount = if payload.paid_value.is_finite() {
            payload.paid_value
        } else {
            0.0
        };
        let note = non_blank(&payload.notes).or_else(|| non_blank(&payload.vendor));

        Self {
            amount,
            currency_code: non_blank(&payload.currency_code),
            note,
            occurred_at: non_blank(&payload.date),
            category_id: normalize_category_id(payload.category_id.as_ref()),
        }
    }
}

/// Coerce a free-form category id to a non-negative integer.
///
/// Accepts unsigned integers, digit-only strings and integral finite numbers;
/// anything else yields `None`.
pub fn normalize_category_id(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(number) => number.as_u64().or_else(|| {
            let float = number.as_f64()?;
            let integral = float.is_finite() && float >= 0.0 && float.fract() == 0.0;
            // Only values inside u64 range reach the cast
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            (integral && float < 18_446_744_073_709_551_616.0).then_some(float as u64)
        }),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
                return None;
            }
            text.parse().ok()
        }
        _ => None,
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
