mod registry;

pub use registry::{default_models, Dialect, ImageFieldShape, ModelDescriptor, ModelRegistry};
