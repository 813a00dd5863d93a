use serde::{Deserialize, Serialize};

/// A reference to an image, either carried inline as base64 or hosted
/// remotely. Exactly one representation is active per instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    DataUri { mime_type: String, base64: String },
    HostedUrl { url: String },
}

impl ImageRef {
    pub fn data_uri(mime_type: impl Into<String>, base64: impl Into<String>) -> Self {
        Self::DataUri {
            mime_type: mime_type.into(),
            base64: base64.into(),
        }
    }

    pub fn hosted_url(url: impl Into<String>) -> Self {
        Self::HostedUrl { url: url.into() }
    }

    /// Parses a `data:<mime>;base64,<payload>` string. Incidental whitespace
    /// inside the payload is stripped (models sometimes wrap base64 with
    /// line breaks).
    pub fn from_data_uri(raw: &str) -> Option<Self> {
        let rest = raw.trim().strip_prefix("data:")?;
        let (mime_type, payload) = rest.split_once(";base64,")?;
        if mime_type.is_empty() || payload.trim().is_empty() {
            return None;
        }
        let base64: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        Some(Self::DataUri {
            mime_type: mime_type.to_string(),
            base64,
        })
    }

    /// The wire form backends accept in an image field: a data URI for
    /// inline payloads, the URL itself for hosted images.
    pub fn to_uri(&self) -> String {
        match self {
            Self::DataUri { mime_type, base64 } => format!("data:{mime_type};base64,{base64}"),
            Self::HostedUrl { url } => url.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::DataUri { base64, .. } => base64.trim().is_empty(),
            Self::HostedUrl { url } => url.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

/// A single logical style-transform request: one source photo, an optional
/// reference hairstyle photo, and the style description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformIntent {
    pub source_image: ImageRef,
    pub reference_image: Option<ImageRef>,
    pub style_text: String,
    pub subject_gender: Gender,
}

/// Outcome of normalizing an arbitrary backend response.
///
/// `NotFound` is a definite "no usable output" signal, distinct from
/// `Text("")`; it must never be coerced to empty text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExtractionResult {
    Image(ImageRef),
    Text(String),
    NotFound,
}

impl ExtractionResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Text(_) => "text",
            Self::NotFound => "not_found",
        }
    }

    pub fn as_image(&self) -> Option<&ImageRef> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Gender, ImageRef};

    #[test]
    fn data_uri_round_trips_through_wire_form() {
        let image = ImageRef::data_uri("image/png", "aGVsbG8=");
        let uri = image.to_uri();
        assert_eq!(uri, "data:image/png;base64,aGVsbG8=");
        assert_eq!(ImageRef::from_data_uri(&uri), Some(image));
    }

    #[test]
    fn from_data_uri_strips_interior_whitespace() {
        let parsed = ImageRef::from_data_uri("data:image/jpeg;base64,aGVs\nbG8g\nd29ybGQ=").unwrap();
        match parsed {
            ImageRef::DataUri { mime_type, base64 } => {
                assert_eq!(mime_type, "image/jpeg");
                assert_eq!(base64, "aGVsbG8gd29ybGQ=");
            }
            other => panic!("expected data uri, got {other:?}"),
        }
    }

    #[test]
    fn from_data_uri_rejects_non_base64_and_empty_payloads() {
        assert_eq!(ImageRef::from_data_uri("data:image/png;base64,"), None);
        assert_eq!(ImageRef::from_data_uri("data:;base64,aGVsbG8="), None);
        assert_eq!(ImageRef::from_data_uri("https://example.com/a.png"), None);
    }

    #[test]
    fn hosted_url_wire_form_is_the_url() {
        let image = ImageRef::hosted_url("https://cdn.example.com/result.png");
        assert_eq!(image.to_uri(), "https://cdn.example.com/result.png");
    }

    #[test]
    fn gender_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Gender::Female).unwrap(), "\"female\"");
        assert_eq!(Gender::Male.as_str(), "male");
    }
}
