use mane_contracts::analysis::{HairAnalysis, StyleAssessment};
use mane_contracts::error::EngineError;
use mane_contracts::events::{EventWriter, TransformEvent};
use mane_contracts::models::ModelRegistry;
use mane_contracts::transform::{ExtractionResult, Gender, ImageRef, TransformIntent};
use serde_json::{json, Value};

use crate::adapter::build_request;
use crate::backend::{stable_hash, Backend};
use crate::config::EngineConfig;
use crate::extract::extract;
use crate::parse::parse_json;

/// What one full transform call produced. A failed assessment is recorded
/// here rather than aborting; whether to stop on it is the caller's policy,
/// not the pipeline's.
#[derive(Debug)]
pub struct TransformOutcome {
    pub model_id: String,
    pub assessment: Option<StyleAssessment>,
    pub assessment_error: Option<String>,
    pub result: ExtractionResult,
}

/// Sequential orchestrator for a single user request: optional feasibility
/// assessment, then the generation call. No fan-out, no retries; network
/// failures surface immediately.
pub struct TransformPipeline {
    config: EngineConfig,
    registry: ModelRegistry,
    backend: Box<dyn Backend>,
    events: Option<EventWriter>,
}

impl TransformPipeline {
    pub fn new(config: EngineConfig, registry: ModelRegistry, backend: Box<dyn Backend>) -> Self {
        Self {
            config,
            registry,
            backend,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Vision read of the subject's current hair, as strict JSON pulled out
    /// of the model's freeform reply.
    pub fn analyze_hair(&self, photo: &ImageRef) -> Result<HairAnalysis, EngineError> {
        let prompt = analysis_prompt();
        let raw = self.backend.chat(&vision_chat_payload(
            &self.config.analysis_model,
            &prompt,
            photo,
        ))?;
        parse_json(&message_text(&raw).ok_or_else(|| {
            EngineError::MalformedAnalysis("analysis reply carried no text".to_string())
        })?)
    }

    /// Feasibility verdict for the requested style on this subject.
    pub fn assess_style(
        &self,
        photo: &ImageRef,
        style_text: &str,
        gender: Gender,
    ) -> Result<StyleAssessment, EngineError> {
        self.emit(TransformEvent::AssessmentStarted);
        let prompt = assessment_prompt(style_text, gender);
        let raw = self.backend.chat(&vision_chat_payload(
            &self.config.vision_model,
            &prompt,
            photo,
        ))?;
        let text = message_text(&raw).ok_or_else(|| {
            EngineError::MalformedAnalysis("assessment reply carried no text".to_string())
        })?;
        let assessment: StyleAssessment = parse_json(&text)?;
        self.emit(TransformEvent::AssessmentReady {
            is_realistic: assessment.is_realistic,
            feasibility_score: assessment.feasibility_score,
        });
        Ok(assessment)
    }

    /// Builds the backend request, runs it, and normalizes the response.
    /// `NotFound` after a generation call is a definite failure
    /// (`NoImageProduced`); `Text` flows through so the caller can show what
    /// the model said instead of an image.
    pub fn generate(
        &self,
        intent: &TransformIntent,
        model_id: Option<&str>,
    ) -> Result<ExtractionResult, EngineError> {
        let descriptor = match model_id {
            Some(id) => self.registry.lookup(id)?,
            None => match self.registry.lookup(&self.config.generation_model) {
                Ok(descriptor) => descriptor,
                Err(_) => self.registry.default_descriptor(),
            },
        };
        let request = build_request(intent, descriptor)?;
        self.emit(TransformEvent::GenerationStarted {
            model: descriptor.id.clone(),
            dialect: descriptor.dialect,
            request_hash: stable_hash(&Value::Object(request.payload.clone())),
        });

        let raw = self.backend.generate(&request)?;
        match extract(&raw) {
            ExtractionResult::NotFound => Err(EngineError::NoImageProduced),
            ExtractionResult::Image(image) => {
                self.emit(TransformEvent::ImageExtracted {
                    model: descriptor.id.clone(),
                    image_kind: ref_kind(&image).to_string(),
                });
                Ok(ExtractionResult::Image(image))
            }
            ExtractionResult::Text(text) => {
                self.emit(TransformEvent::TextFallback {
                    model: descriptor.id.clone(),
                    chars: text.chars().count(),
                });
                Ok(ExtractionResult::Text(text))
            }
        }
    }

    /// The full flow: optional assessment, then generation. The two calls
    /// stay strictly sequential to keep progress reporting simple, even
    /// though neither consumes the other's output.
    pub fn transform(
        &self,
        intent: &TransformIntent,
        model_id: Option<&str>,
        assess: bool,
    ) -> Result<TransformOutcome, EngineError> {
        let descriptor_id = match model_id {
            Some(id) => self.registry.lookup(id)?.id.clone(),
            None => match self.registry.lookup(&self.config.generation_model) {
                Ok(descriptor) => descriptor.id.clone(),
                Err(_) => self.registry.default_descriptor().id.clone(),
            },
        };

        let (assessment, assessment_error) = if assess {
            match self.assess_style(&intent.source_image, &intent.style_text, intent.subject_gender)
            {
                Ok(assessment) => (Some(assessment), None),
                Err(err) => {
                    self.emit(TransformEvent::AssessmentFailed {
                        error: err.to_string(),
                    });
                    (None, Some(err.to_string()))
                }
            }
        } else {
            (None, None)
        };

        let result = self.generate(intent, Some(&descriptor_id))?;
        self.emit(TransformEvent::TransformFinished {
            model: descriptor_id.clone(),
            result: result.kind().to_string(),
        });

        Ok(TransformOutcome {
            model_id: descriptor_id,
            assessment,
            assessment_error,
            result,
        })
    }

    fn emit(&self, event: TransformEvent) {
        if let Some(events) = &self.events {
            // Event stream loss must never fail a transform.
            let _ = events.record(&event);
        }
    }
}

fn ref_kind(image: &ImageRef) -> &'static str {
    match image {
        ImageRef::DataUri { .. } => "data_uri",
        ImageRef::HostedUrl { .. } => "hosted_url",
    }
}

/// Chat-completions body with one text part and the photo as an inline
/// image-url part.
fn vision_chat_payload(model: &str, prompt: &str, photo: &ImageRef) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                {"type": "text", "text": prompt},
                {"type": "image_url", "image_url": {"url": photo.to_uri()}},
            ],
        }],
    })
}

/// The assistant reply text: a plain content string, or the first text
/// segment of a segmented reply.
fn message_text(raw: &Value) -> Option<String> {
    let content = raw.pointer("/choices/0/message/content")?;
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(segments) => segments
            .iter()
            .find(|segment| segment.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|segment| segment.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn analysis_prompt() -> String {
    "Analyze the hair in this photo. Reply with only a JSON object shaped as \
{\"texture\":\"straight|wavy|curly|coily\",\"density\":\"thin|medium|thick\",\
\"condition\":\"dry|oily|healthy|damaged\",\"quality_score\":1-10,\
\"observations\":\"...\",\"recommendations\":[\"...\"]}. No prose outside the JSON."
        .to_string()
}

fn assessment_prompt(style_text: &str, gender: Gender) -> String {
    format!(
        "The person in this photo is {}. Rate the feasibility of restyling their hair as: \
\"{}\". Reply with only a JSON object shaped as {{\"is_realistic\":true|false,\
\"feasibility_score\":1-10,\"reasoning\":\"...\",\"required_treatments\":[\"...\"],\
\"recommended_products\":[\"...\"],\"estimated_time\":\"...\",\
\"alternatives\":[\"...\"]}}. Include alternatives only when the style is not realistic. \
No prose outside the JSON.",
        gender.as_str(),
        style_text
    )
}
