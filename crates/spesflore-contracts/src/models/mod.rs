mod registry;

pub use registry::{Capability, ModelRegistry, ModelSpec};
