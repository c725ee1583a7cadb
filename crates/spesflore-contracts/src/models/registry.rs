use indexmap::IndexMap;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Capability {
    Text,
    Vision,
    Image,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::Image => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub backend: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn for_backend(&self, backend: &str) -> Self {
        Self {
            models: self
                .models
                .iter()
                .filter(|(_, model)| model.backend == backend)
                .map(|(name, model)| (name.clone(), model.clone()))
                .collect(),
        }
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, backend: &str, capabilities: &[Capability]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                backend: backend.to_string(),
                capabilities: capabilities.to_vec(),
            },
        );
    };

    insert(
        "gemini-3-flash-preview",
        "gemini",
        &[Capability::Text, Capability::Vision],
    );
    insert(
        "gemini-3-pro-preview",
        "gemini",
        &[Capability::Text, Capability::Vision],
    );
    insert("gemini-2.5-flash", "gemini", &[Capability::Text, Capability::Vision]);
    insert("gemini-2.5-flash-image", "gemini", &[Capability::Image]);
    insert("gemini-3-pro-image-preview", "gemini", &[Capability::Image]);
    insert(
        "dryrun-botanist-1",
        "dryrun",
        &[Capability::Text, Capability::Vision],
    );
    insert("dryrun-image-1", "dryrun", &[Capability::Image]);

    map
}
