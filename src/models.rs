use crate::completion::Backend;
use crate::error::ChatError;
use crate::locale::Language;

/// A selectable model and the upstream reference it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub id: String,
    pub upstream: String,
    pub label_en: String,
    pub label_ja: String,
}

impl ModelEntry {
    fn new(id: &str, upstream: &str, label_en: &str, label_ja: &str) -> Self {
        Self {
            id: id.to_string(),
            upstream: upstream.to_string(),
            label_en: label_en.to_string(),
            label_ja: label_ja.to_string(),
        }
    }

    pub fn label(&self, language: Language) -> &str {
        match language {
            Language::English => &self.label_en,
            Language::Japanese => &self.label_ja,
        }
    }
}

/// Ordered model list for one backend; the first entry is the default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    pub fn builtin(backend: Backend) -> Self {
        let entries = match backend {
            Backend::Replicate => vec![
                ModelEntry::new(
                    "Llama2-7B",
                    "a16z-infra/llama7b-v2-chat:4f0a4744c7295c024a1de15e1a63c880d3da035fa1f49bfd344fe076074c8eea",
                    "Llama2-7B: Light version",
                    "Llama2-7B (軽量版)",
                ),
                ModelEntry::new(
                    "Llama2-13B",
                    "a16z-infra/llama13b-v2-chat:df7690f1994d94e96ad9d568eac121aecf50684a0b0963b25a41cc40061269e5",
                    "Llama2-13B: Standard version",
                    "Llama2-13B (標準版)",
                ),
            ],
            Backend::OpenAi => vec![
                ModelEntry::new(
                    "gpt-3.5-turbo",
                    "gpt-3.5-turbo",
                    "GPT-3.5: Light and simple",
                    "GPT-3.5: 軽快な対話",
                ),
                ModelEntry::new(
                    "gpt-4-0125-preview",
                    "gpt-4-0125-preview",
                    "GPT-4: Detailed and thoughtful",
                    "GPT-4: 丁寧な対話",
                ),
                ModelEntry::new(
                    "gpt-4o-2024-11-20",
                    "gpt-4o-2024-11-20",
                    "GPT-4 Option: In-depth responses",
                    "GPT-4 オプション: 詳細な対話",
                ),
            ],
        };
        Self { entries }
    }

    pub fn resolve(&self, id: &str) -> Result<&str, ChatError> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.upstream.as_str())
            .ok_or_else(|| ChatError::UnknownModel(id.to_string()))
    }

    pub fn default_id(&self) -> Option<&str> {
        self.entries.first().map(|entry| entry.id.as_str())
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_replicate_versions() {
        let registry = ModelRegistry::builtin(Backend::Replicate);
        assert_eq!(
            registry.resolve("Llama2-13B").unwrap(),
            "a16z-infra/llama13b-v2-chat:df7690f1994d94e96ad9d568eac121aecf50684a0b0963b25a41cc40061269e5"
        );
        assert_eq!(registry.default_id(), Some("Llama2-7B"));
    }

    #[test]
    fn test_openai_ids_map_to_themselves() {
        let registry = ModelRegistry::builtin(Backend::OpenAi);
        for entry in registry.entries() {
            assert_eq!(registry.resolve(&entry.id).unwrap(), entry.id);
        }
    }

    #[test]
    fn test_unknown_model_is_uniform_error() {
        let registry = ModelRegistry::builtin(Backend::Replicate);
        for id in ["gpt-3.5-turbo", "llama2-7b", ""] {
            assert!(matches!(
                registry.resolve(id),
                Err(ChatError::UnknownModel(ref missing)) if missing == id
            ));
        }
    }

    #[test]
    fn test_labels_follow_language() {
        let registry = ModelRegistry::builtin(Backend::Replicate);
        let entry = &registry.entries()[0];
        assert_eq!(entry.label(Language::English), "Llama2-7B: Light version");
        assert_eq!(entry.label(Language::Japanese), "Llama2-7B (軽量版)");
    }
}
