//! Bot-authored text lookup by `(language, namespace, key)`.

use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::{Context, Result};

/// Namespace holding the chat bot strings.
pub const CHAT_NAMESPACE: &str = "chat";
/// Key of the notice sent to a room when humans take over.
pub const HANDOFF_NOTICE_KEY: &str = "handoffNotice";

/// Pure lookup into translated text bundles.
///
/// Missing entries resolve to the key itself so the bot never sends an empty message.
pub trait TextBundle: Send + Sync {
    fn text(&self, language: &str, namespace: &str, key: &str) -> String;
}

pub type SharedTextBundle = Arc<dyn TextBundle>;

type Namespaces = HashMap<String, HashMap<String, String>>;

/// In-memory bundles shaped `{ <lang>: { <namespace>: { <key>: <text> } } }`.
#[derive(Debug, Clone, Default)]
pub struct StaticTextBundle {
    languages: HashMap<String, Namespaces>,
    fallback_language: Option<String>,
}

impl StaticTextBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Language consulted when the requested one has no entry.
    pub fn with_fallback_language(mut self, language: impl Into<String>) -> Self {
        self.fallback_language = Some(language.into());
        self
    }

    pub fn insert(
        &mut self,
        language: impl Into<String>,
        namespace: impl Into<String>,
        key: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.languages
            .entry(language.into())
            .or_default()
            .entry(namespace.into())
            .or_default()
            .insert(key.into(), text.into());
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let languages: HashMap<String, Namespaces> =
            serde_yaml_bw::from_str(raw).context("parse text bundle")?;
        Ok(Self {
            languages,
            fallback_language: None,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read text bundle {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }

    fn get(&self, language: &str, namespace: &str, key: &str) -> Option<&str> {
        self.languages
            .get(language)?
            .get(namespace)?
            .get(key)
            .map(String::as_str)
    }

    pub fn shared(self) -> SharedTextBundle {
        Arc::new(self)
    }
}

impl TextBundle for StaticTextBundle {
    fn text(&self, language: &str, namespace: &str, key: &str) -> String {
        self.get(language, namespace, key)
            .or_else(|| {
                self.fallback_language
                    .as_deref()
                    .and_then(|fallback| self.get(fallback, namespace, key))
            })
            .unwrap_or(key)
            .to_string()
    }
}
