use mane_contracts::error::EngineError;
use mane_contracts::models::{Dialect, ImageFieldShape, ModelDescriptor};
use mane_contracts::transform::{ImageRef, TransformIntent};
use serde_json::{json, Map, Value};

/// Mandatory on every kling-dialect prompt: these backends are observed to
/// over-edit faces without an explicit constraint, with or without a
/// reference image.
pub const IDENTITY_CLAUSE: &str = "The person must remain completely identical — same face, \
features, expression, skin, body, background; only the hair changes.";

pub const SOURCE_MARKER: &str = "@Image1";
pub const REFERENCE_MARKER: &str = "@Image2";

/// Pre-flight floor for inline source payloads. Anything shorter cannot be a
/// real photo and would only waste a round trip.
const MIN_SOURCE_BASE64_LEN: usize = 64;

/// A backend-specific request, opaque to callers. Built fresh per call and
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub endpoint: String,
    pub payload: Map<String, Value>,
}

/// Builds the wire payload and prompt for one logical transform intent
/// against one backend descriptor.
pub fn build_request(
    intent: &TransformIntent,
    descriptor: &ModelDescriptor,
) -> Result<BackendRequest, EngineError> {
    check_source_image(&intent.source_image)?;

    let reference = match descriptor.image_field_shape {
        // Reference-image styling is only supported on array-dialect
        // backends; a single image field carries the source and nothing else.
        ImageFieldShape::Single => None,
        ImageFieldShape::Array => intent.reference_image.as_ref(),
    };

    let prompt = build_prompt(descriptor.dialect, &intent.style_text, reference.is_some());

    let mut payload = Map::new();
    payload.insert("prompt".to_string(), Value::String(prompt));
    match descriptor.image_field_shape {
        ImageFieldShape::Array => {
            // Source always first: the positional prompt markers depend on
            // this ordering.
            let mut images = vec![Value::String(intent.source_image.to_uri())];
            if let Some(reference) = reference {
                images.push(Value::String(reference.to_uri()));
            }
            payload.insert("image_urls".to_string(), Value::Array(images));
        }
        ImageFieldShape::Single => {
            payload.insert(
                "image_url".to_string(),
                Value::String(intent.source_image.to_uri()),
            );
            // Backend quality defaults, not user-configurable per call:
            // moderate strength keeps the original face, bounded steps and
            // safety filtering match what these backends expect, and the
            // synchronous mode returns the result in the same response.
            payload.insert("strength".to_string(), json!(0.55));
            payload.insert("num_inference_steps".to_string(), json!(28));
            payload.insert("enable_safety_checker".to_string(), Value::Bool(true));
            payload.insert("sync_mode".to_string(), Value::Bool(true));
        }
    }

    Ok(BackendRequest {
        endpoint: descriptor.endpoint.clone(),
        payload,
    })
}

fn build_prompt(dialect: Dialect, style_text: &str, has_reference: bool) -> String {
    match dialect {
        // Kling backends have no implicit image binding: images must be
        // referenced positionally, and the identity clause is appended after
        // the style text every time.
        Dialect::Kling => {
            if has_reference {
                format!(
                    "Change the hairstyle of the person in {SOURCE_MARKER} to match the \
hairstyle shown in {REFERENCE_MARKER}: {style_text}. {IDENTITY_CLAUSE}"
                )
            } else {
                format!(
                    "Change the hairstyle of the person in {SOURCE_MARKER} to: {style_text}. \
{IDENTITY_CLAUSE}"
                )
            }
        }
        // These backends infer the target image implicitly from the image
        // field; the style text goes through verbatim.
        Dialect::Flux | Dialect::NanoBanana | Dialect::Other => style_text.to_string(),
    }
}

fn check_source_image(source: &ImageRef) -> Result<(), EngineError> {
    match source {
        ImageRef::DataUri { base64, .. } => {
            let trimmed = base64.trim();
            if trimmed.is_empty() {
                return Err(EngineError::InvalidImageData(
                    "source image payload is empty".to_string(),
                ));
            }
            if trimmed.len() < MIN_SOURCE_BASE64_LEN {
                return Err(EngineError::InvalidImageData(format!(
                    "source image payload is implausibly short ({} chars)",
                    trimmed.len()
                )));
            }
        }
        ImageRef::HostedUrl { url } => {
            if url.trim().is_empty() {
                return Err(EngineError::InvalidImageData(
                    "source image URL is empty".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mane_contracts::error::EngineError;
    use mane_contracts::models::{Dialect, ImageFieldShape, ModelDescriptor};
    use mane_contracts::transform::{Gender, ImageRef, TransformIntent};
    use serde_json::Value;

    use super::{build_request, IDENTITY_CLAUSE, REFERENCE_MARKER, SOURCE_MARKER};

    fn descriptor(dialect: Dialect, shape: ImageFieldShape) -> ModelDescriptor {
        ModelDescriptor {
            id: "test-model".to_string(),
            endpoint: "https://backends.example.com/test-model".to_string(),
            dialect,
            image_field_shape: shape,
        }
    }

    fn source() -> ImageRef {
        ImageRef::data_uri("image/jpeg", "QUJDRA==".repeat(32))
    }

    fn reference() -> ImageRef {
        ImageRef::hosted_url("https://cdn.example.com/reference.jpg")
    }

    fn intent(reference_image: Option<ImageRef>) -> TransformIntent {
        TransformIntent {
            source_image: source(),
            reference_image,
            style_text: "long platinum waves".to_string(),
            subject_gender: Gender::Female,
        }
    }

    #[test]
    fn kling_prompt_always_carries_marker_and_identity_clause() {
        let request = build_request(
            &intent(None),
            &descriptor(Dialect::Kling, ImageFieldShape::Array),
        )
        .unwrap();
        let prompt = request.payload["prompt"].as_str().unwrap();
        assert!(prompt.contains(SOURCE_MARKER));
        assert!(!prompt.contains(REFERENCE_MARKER));
        assert!(prompt.contains(IDENTITY_CLAUSE));
        assert!(prompt.contains("long platinum waves"));

        let text_idx = prompt.find("long platinum waves").unwrap();
        let clause_idx = prompt.find(IDENTITY_CLAUSE).unwrap();
        assert!(clause_idx > text_idx, "clause is appended after the style text");
    }

    #[test]
    fn kling_reference_adds_second_marker_and_two_element_array() {
        let request = build_request(
            &intent(Some(reference())),
            &descriptor(Dialect::Kling, ImageFieldShape::Array),
        )
        .unwrap();
        let prompt = request.payload["prompt"].as_str().unwrap();
        assert!(prompt.contains(SOURCE_MARKER));
        assert!(prompt.contains(REFERENCE_MARKER));
        assert!(prompt.contains(IDENTITY_CLAUSE));

        let images = request.payload["image_urls"].as_array().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0], Value::String(source().to_uri()));
        assert_eq!(images[1], Value::String(reference().to_uri()));
    }

    #[test]
    fn flux_prompt_is_style_text_verbatim() {
        let request = build_request(
            &intent(None),
            &descriptor(Dialect::Flux, ImageFieldShape::Single),
        )
        .unwrap();
        assert_eq!(
            request.payload["prompt"],
            Value::String("long platinum waves".to_string())
        );
    }

    #[test]
    fn single_shape_drops_reference_and_carries_generation_defaults() {
        let request = build_request(
            &intent(Some(reference())),
            &descriptor(Dialect::Flux, ImageFieldShape::Single),
        )
        .unwrap();
        assert_eq!(
            request.payload["image_url"],
            Value::String(source().to_uri())
        );
        assert!(!request.payload.contains_key("image_urls"));
        let serialized = serde_json::to_string(&request.payload).unwrap();
        assert!(!serialized.contains("reference.jpg"));

        assert_eq!(request.payload["strength"], serde_json::json!(0.55));
        assert_eq!(request.payload["num_inference_steps"], serde_json::json!(28));
        assert_eq!(request.payload["enable_safety_checker"], Value::Bool(true));
        assert_eq!(request.payload["sync_mode"], Value::Bool(true));
    }

    #[test]
    fn array_shape_without_reference_sends_single_element_list() {
        let request = build_request(
            &intent(None),
            &descriptor(Dialect::NanoBanana, ImageFieldShape::Array),
        )
        .unwrap();
        let images = request.payload["image_urls"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert!(!request.payload.contains_key("strength"));
    }

    #[test]
    fn empty_source_image_fails_pre_flight() {
        let mut bad = intent(None);
        bad.source_image = ImageRef::data_uri("image/png", "");
        let err = build_request(&bad, &descriptor(Dialect::Flux, ImageFieldShape::Single))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidImageData(_)));
    }

    #[test]
    fn implausibly_short_source_image_fails_pre_flight() {
        let mut bad = intent(None);
        bad.source_image = ImageRef::data_uri("image/png", "aGVsbG8=");
        let err = build_request(&bad, &descriptor(Dialect::Kling, ImageFieldShape::Array))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidImageData(_)));
    }

    #[test]
    fn endpoint_comes_from_descriptor() {
        let request = build_request(
            &intent(None),
            &descriptor(Dialect::Other, ImageFieldShape::Single),
        )
        .unwrap();
        assert_eq!(request.endpoint, "https://backends.example.com/test-model");
    }
}
