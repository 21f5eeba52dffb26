//! Read-only FAQ reference data.

use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MessageContent;

/// Block id that hands the conversation to a human instead of naming a block.
pub const PERSON_BLOCK: &str = "person";
/// Opening block for a room with no history.
pub const WELCOME_BLOCK: &str = "welcome";
/// Opening block for a room that has been idle for a long time.
pub const HI_BLOCK: &str = "hi";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("faq block not found: {id}")]
pub struct BlockNotFoundError {
    pub id: String,
}

/// Named, ordered sequence of bot-authored contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqBlock {
    pub id: String,
    #[serde(default)]
    pub data: Vec<MessageContent>,
}

/// Lookup of FAQ blocks by id.
pub trait FaqCatalog: Send + Sync {
    fn block(&self, id: &str) -> Option<&FaqBlock>;

    fn require(&self, id: &str) -> Result<&FaqBlock, BlockNotFoundError> {
        self.block(id).ok_or_else(|| BlockNotFoundError { id: id.to_string() })
    }
}

pub type SharedFaqCatalog = Arc<dyn FaqCatalog>;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    blocks: Vec<FaqBlock>,
}

/// Catalog held in memory, usually loaded once from a YAML or JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticFaqCatalog {
    blocks: HashMap<String, FaqBlock>,
}

impl StaticFaqCatalog {
    pub fn new(blocks: impl IntoIterator<Item = FaqBlock>) -> Self {
        Self {
            blocks: blocks
                .into_iter()
                .map(|block| (block.id.clone(), block))
                .collect(),
        }
    }

    /// Parses `blocks: [{id, data}]`. JSON is accepted as it is valid YAML.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        // Go through a JSON value so single-key maps decode as content variants.
        let value: serde_json::Value =
            serde_yaml_bw::from_str(raw).context("parse faq catalog")?;
        let file: CatalogFile = serde_json::from_value(value).context("decode faq catalog")?;
        let catalog = Self::new(file.blocks);
        tracing::debug!(blocks = catalog.len(), "faq catalog loaded");
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read faq catalog {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("load faq catalog {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn shared(self) -> SharedFaqCatalog {
        Arc::new(self)
    }
}

impl FaqCatalog for StaticFaqCatalog {
    fn block(&self, id: &str) -> Option<&FaqBlock> {
        self.blocks.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QuickReply;

    const CATALOG: &str = r#"
blocks:
  - id: welcome
    data:
      - text: "Hello! How can we help?"
      - quickReplies:
          - title: "Opening hours"
            goToBlocks: ["hours"]
          - title: "Talk to a person"
            goToBlocks: ["person"]
  - id: hours
    data:
      - text: "We are open 9-17."
"#;

    #[test]
    fn loads_yaml_catalog() {
        let catalog = StaticFaqCatalog::from_yaml_str(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        let welcome = catalog.require(WELCOME_BLOCK).unwrap();
        assert_eq!(welcome.data.len(), 2);
        assert_eq!(
            welcome.data[1],
            MessageContent::QuickReplies(vec![
                QuickReply::new("Opening hours", vec!["hours".into()]),
                QuickReply::new("Talk to a person", vec![PERSON_BLOCK.into()]),
            ])
        );
    }

    #[test]
    fn missing_block_is_an_error() {
        let catalog = StaticFaqCatalog::from_yaml_str(CATALOG).unwrap();
        let err = catalog.require("parking").unwrap_err();
        assert_eq!(err.id, "parking");
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faq.json");
        std::fs::write(
            &path,
            r#"{"blocks":[{"id":"hi","data":[{"text":"Welcome back"}]}]}"#,
        )
        .unwrap();
        let catalog = StaticFaqCatalog::from_path(&path).unwrap();
        assert!(catalog.block(HI_BLOCK).is_some());
        assert!(StaticFaqCatalog::from_path(dir.path().join("missing.yaml")).is_err());
    }
}
