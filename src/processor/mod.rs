//! Document processors and their dispatch table.
//!
//! A [`ProcessorRegistry`] maps document class names to implementations of
//! [`DocumentProcessor`]. Registration is explicit; the first processor to
//! claim a class keeps it.

pub mod hooks;

pub use hooks::{Hook, HookRegistry};

use crate::config::{DocumentConfig, TableConfig};
use crate::error::{Error, Result};
use crate::input::Page;
use crate::kv::{KvExtractor, StructureItem};
use crate::table::{PageOutcome, SkipReason, TableExtractor, TableResult};
use indexmap::IndexMap;
use serde::Serialize;

/// Everything extracted from one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutput {
    pub class_name: String,
    /// True when a table was reconstructed
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TableResult>,
    pub fields: Vec<StructureItem>,
}

/// A processor for one or more document classes.
pub trait DocumentProcessor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Classes this processor handles.
    fn supported_class_names(&self) -> Vec<String>;

    /// Process a page as `class_name`.
    fn process(&self, page: &Page, class_name: &str) -> Result<ProcessOutput>;
}

/// Dispatch table from class name to processor.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn DocumentProcessor>>,
    by_class: IndexMap<String, usize>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor for every class it supports. Classes already
    /// claimed stay with their earlier processor.
    pub fn register(&mut self, processor: Box<dyn DocumentProcessor>) {
        let idx = self.processors.len();
        for class in processor.supported_class_names() {
            if let Some(&owner) = self.by_class.get(&class) {
                log::warn!(
                    "class '{}' already handled by '{}', ignoring '{}'",
                    class,
                    self.processors[owner].name(),
                    processor.name()
                );
                continue;
            }
            self.by_class.insert(class, idx);
        }
        self.processors.push(processor);
    }

    /// Registered class names, in registration order.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.by_class.keys().map(|k| k.as_str())
    }

    /// Process a page under its own class name.
    pub fn process(&self, page: &Page) -> Result<ProcessOutput> {
        let class = page.class_name.as_deref().unwrap_or_default();
        self.process_as(page, class)
    }

    /// Process a page under an explicit class name.
    pub fn process_as(&self, page: &Page, class_name: &str) -> Result<ProcessOutput> {
        let &idx = self
            .by_class
            .get(class_name)
            .ok_or_else(|| Error::UnknownDocumentClass(class_name.to_string()))?;
        let processor = &self.processors[idx];
        log::debug!("processing '{}' with '{}'", class_name, processor.name());
        processor.process(page, class_name)
    }
}

/// Processor driven entirely by a [`DocumentConfig`].
#[derive(Debug, Clone)]
pub struct ConfiguredProcessor {
    name: String,
    config: DocumentConfig,
    hooks: HookRegistry,
}

impl ConfiguredProcessor {
    /// Validate `config` against the built-in hooks.
    pub fn new(name: impl Into<String>, config: DocumentConfig) -> Result<Self> {
        Self::with_hooks(name, config, HookRegistry::with_builtins())
    }

    /// Validate `config` against a custom hook registry.
    pub fn with_hooks(
        name: impl Into<String>,
        config: DocumentConfig,
        hooks: HookRegistry,
    ) -> Result<Self> {
        for class in config.classes.values() {
            class.validate_with(&hooks)?;
        }
        Ok(Self {
            name: name.into(),
            config,
            hooks,
        })
    }

    fn post_process(
        &self,
        config: &TableConfig,
        table: &mut Option<TableResult>,
        fields: &mut [StructureItem],
    ) {
        if config.post_process.is_empty() {
            return;
        }
        if let Some(table) = table {
            for block in table.records.iter_mut().flat_map(|r| r.blocks.values_mut()) {
                if let Some(names) = config.post_process.get(&block.column) {
                    block.lines = block.lines.iter().map(|l| self.hooks.apply(names, l)).collect();
                    let text = block.lines.join("\n");
                    block.scores = resized(&block.scores, text.chars().count());
                    block.text = text;
                }
            }
        }
        for item in fields.iter_mut() {
            if let Some(names) = config.post_process.get(&item.field) {
                let text = self.hooks.apply(names, &item.text);
                item.set_text(text);
            }
        }
    }
}

/// Keep scores when the length is unchanged, otherwise pad with their mean.
fn resized(scores: &[f32], n: usize) -> Vec<f32> {
    if scores.len() == n {
        return scores.to_vec();
    }
    let mean = if scores.is_empty() {
        1.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    };
    vec![mean; n]
}

impl DocumentProcessor for ConfiguredProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_class_names(&self) -> Vec<String> {
        self.config.class_names()
    }

    fn process(&self, page: &Page, class_name: &str) -> Result<ProcessOutput> {
        let config = self
            .config
            .class(class_name)
            .ok_or_else(|| Error::UnknownDocumentClass(class_name.to_string()))?;
        let arena = page.arena();

        let mut fields = KvExtractor::new(config).extract(&arena);
        let (mut table, skip_reason) = if config.headers.is_empty() {
            (None, None)
        } else {
            match TableExtractor::new(config).extract(&arena) {
                PageOutcome::Table(t) => (Some(t), None),
                PageOutcome::Skipped(reason) => {
                    log::info!("class '{}': no table ({:?})", class_name, reason);
                    (None, Some(reason))
                },
            }
        };
        self.post_process(config, &mut table, &mut fields);

        Ok(ProcessOutput {
            class_name: class_name.to_string(),
            found: table.is_some(),
            skip_reason,
            table,
            fields,
        })
    }
}
