//! The merged schema cache.
//!
//! One immutable [`MergedSchema`] generation is current at a time. Requests
//! hold an `Arc` to the generation they started with, so a rebuild never
//! disturbs in-flight work.

use crate::error::MergeError;
use crate::merge::MergedSchema;
use kite_schema::ApiDescription;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds the current merged schema generation.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    current: RwLock<Option<Arc<MergedSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current generation, if one has been built.
    pub async fn current(&self) -> Option<Arc<MergedSchema>> {
        self.current.read().await.clone()
    }

    /// Makes `descriptions` current.
    ///
    /// A new generation is merged only when the descriptions differ from the
    /// current one; otherwise the current generation is returned unchanged.
    /// A failed merge leaves the current generation in place.
    pub async fn refresh(&self, descriptions: &[ApiDescription]) -> Result<Arc<MergedSchema>, MergeError> {
        if let Some(current) = self.current.read().await.as_ref() {
            if current.is_built_from(descriptions) {
                return Ok(Arc::clone(current));
            }
        }

        let mut slot = self.current.write().await;
        // Another refresh may have won the race for the write lock.
        if let Some(current) = slot.as_ref() {
            if current.is_built_from(descriptions) {
                return Ok(Arc::clone(current));
            }
        }

        let generation = slot.as_ref().map_or(1, |current| current.generation() + 1);
        let merged = match MergedSchema::merge(descriptions) {
            Ok(merged) => Arc::new(merged.with_generation(generation)),
            Err(error) => {
                tracing::error!(errors = error.diagnostics.error_count(), "schema merge failed");
                return Err(error);
            }
        };
        tracing::info!(
            generation,
            providers = merged.providers().len(),
            "merged schema generation published"
        );
        *slot = Some(Arc::clone(&merged));
        Ok(merged)
    }
}
