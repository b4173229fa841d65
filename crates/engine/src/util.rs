//! Input normalization shared by the engine and the conversation layer.

use crate::{INVITE_CODE_LEN, ResultEngine, EngineError};

const MIN_CARD_ID_LEN: usize = 3;

/// Keep word characters, `-` and `:`; at least three of them must remain.
pub fn sanitize_card_id(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ':'))
        .collect();
    (cleaned.chars().count() >= MIN_CARD_ID_LEN).then_some(cleaned)
}

/// Uppercase, keep `[A-Z0-9]`, require exactly the invite code length.
pub fn sanitize_invite_code(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();
    (cleaned.len() == INVITE_CODE_LEN).then_some(cleaned)
}

/// Trim free text; blank becomes `None`.
pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

pub(crate) fn require_card_id(raw: &str) -> ResultEngine<String> {
    sanitize_card_id(raw)
        .ok_or_else(|| EngineError::InvalidAmount(format!("invalid card id: {raw}")))
}
