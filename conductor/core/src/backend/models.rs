//! Model Catalog
//!
//! The models offered to the user, keyed by the provider's identifier and
//! shown under a friendlier display name.

/// Information about an available model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// Provider model identifier
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// What the model is good at
    pub description: &'static str,
}

/// Built-in models, the first being the default
pub const MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo {
        id: "openai/gpt-oss-20b:free",
        name: "Super Neura",
        description: "Fast response and efficient for general and daily tasks",
    },
    ModelInfo {
        id: "moonshotai/kimi-k2:free",
        name: "Neura Code",
        description: "Code and Math logic solutions",
    },
    ModelInfo {
        id: "deepseek/deepseek-chat-v3-0324:free",
        name: "Neura Thinking",
        description: "Advanced searching and thinking Model",
    },
];

/// The model used when nothing else is configured
#[must_use]
pub fn default_model() -> &'static ModelInfo {
    &MODEL_CATALOG[0]
}

/// Find a catalog entry by identifier or display name (case-insensitive)
#[must_use]
pub fn find_model(key: &str) -> Option<&'static ModelInfo> {
    let key = key.trim();
    MODEL_CATALOG
        .iter()
        .find(|m| m.id == key || m.name.eq_ignore_ascii_case(key))
}

/// Map a catalog display name to its identifier; other values pass through
///
/// Models outside the catalog stay usable by their provider identifier.
#[must_use]
pub fn resolve_model(key: &str) -> String {
    find_model(key).map_or_else(|| key.trim().to_string(), |m| m.id.to_string())
}
