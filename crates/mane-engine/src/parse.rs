use mane_contracts::error::EngineError;
use serde::de::DeserializeOwned;

/// Pulls a strict JSON object out of freeform model text: the greedy span
/// from the first `{` to the last `}` is deserialized against the expected
/// shape. A missing or invalid span is a hard `MalformedAnalysis` failure,
/// never a silently defaulted value.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, EngineError> {
    let start = text.find('{').ok_or_else(|| {
        EngineError::MalformedAnalysis("no JSON object found in model reply".to_string())
    })?;
    let end = text.rfind('}').filter(|end| *end > start).ok_or_else(|| {
        EngineError::MalformedAnalysis("unterminated JSON object in model reply".to_string())
    })?;
    let span = &text[start..=end];
    serde_json::from_str(span)
        .map_err(|err| EngineError::MalformedAnalysis(format!("invalid analysis JSON: {err}")))
}
