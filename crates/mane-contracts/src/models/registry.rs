use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Request/response shape convention of a generation backend.
///
/// Decided once at catalog-definition time; call sites must never re-derive
/// dialect by matching on model id substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Flux,
    Kling,
    NanoBanana,
    Other,
}

/// Cardinality of the backend's image field: one inline field, or an array
/// of image URLs. Reference-image styling is only possible on `Array`
/// backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFieldShape {
    Single,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub endpoint: String,
    pub dialect: Dialect,
    pub image_field_shape: ImageFieldShape,
}

impl ModelDescriptor {
    pub fn accepts_reference_image(&self) -> bool {
        self.image_field_shape == ImageFieldShape::Array
    }
}

/// Static catalog of supported generation backends, looked up by id and
/// never mutated after construction.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelDescriptor>,
    default_id: String,
}

impl ModelRegistry {
    /// Builds a registry from an explicit catalog, falling back to the
    /// built-in one when none (or an empty one) is supplied, so the registry
    /// is never empty and `default_descriptor` stays total.
    pub fn new(
        models: Option<IndexMap<String, ModelDescriptor>>,
        default_id: impl Into<String>,
    ) -> Self {
        let models = models
            .filter(|catalog| !catalog.is_empty())
            .unwrap_or_else(default_models);
        Self {
            models,
            default_id: default_id.into(),
        }
    }

    pub fn lookup(&self, id: &str) -> Result<&ModelDescriptor, EngineError> {
        self.models
            .get(id)
            .ok_or_else(|| EngineError::UnknownModel(id.to_string()))
    }

    /// The configured default descriptor, or the catalog's first entry when
    /// the configured id is not registered. Never fails.
    pub fn default_descriptor(&self) -> &ModelDescriptor {
        self.models.get(&self.default_id).unwrap_or_else(|| {
            self.models
                .first()
                .map(|(_, descriptor)| descriptor)
                .expect("registry catalog is never empty")
        })
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }
}

pub fn default_models() -> IndexMap<String, ModelDescriptor> {
    let mut map = IndexMap::new();

    let mut insert = |id: &str, endpoint: &str, dialect: Dialect, shape: ImageFieldShape| {
        map.insert(
            id.to_string(),
            ModelDescriptor {
                id: id.to_string(),
                endpoint: endpoint.to_string(),
                dialect,
                image_field_shape: shape,
            },
        );
    };

    insert(
        "flux-kontext-pro",
        "https://fal.run/fal-ai/flux-pro/kontext",
        Dialect::Flux,
        ImageFieldShape::Single,
    );
    insert(
        "flux-kontext-max",
        "https://fal.run/fal-ai/flux-pro/kontext/max",
        Dialect::Flux,
        ImageFieldShape::Single,
    );
    insert(
        "kling-image-v1.5",
        "https://fal.run/fal-ai/kling-image/v1.5",
        Dialect::Kling,
        ImageFieldShape::Array,
    );
    insert(
        "nano-banana-edit",
        "https://fal.run/fal-ai/nano-banana/edit",
        Dialect::NanoBanana,
        ImageFieldShape::Array,
    );
    insert(
        "gpt-image-edit",
        "https://fal.run/fal-ai/gpt-image-1/edit-image",
        Dialect::Other,
        ImageFieldShape::Single,
    );
    insert(
        "dryrun-style-1",
        "dryrun",
        Dialect::Other,
        ImageFieldShape::Single,
    );

    map
}
