//! Document registry
//!
//! Keeps at most one [`DocumentHandle`] per document identifier. The first
//! caller for an identifier opens the document; concurrent callers for the
//! same identifier wait for that open instead of starting their own, and all
//! of them get its outcome. A failed open leaves nothing behind, so the next
//! call tries again.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use super::handle::DocumentHandle;
use crate::config::ScaleRange;
use crate::engine::{DocumentEngine, EngineDocument};
use crate::error::{PageImageError, Result};
use crate::render::OutputFileWriter;
use crate::source::SourceResolver;

/// Turns a document identifier into an opened engine document
#[async_trait]
pub trait DocumentOpener: Send + Sync {
    async fn open(&self, identifier: &str) -> Result<Arc<dyn EngineDocument>>;
}

/// Resolves identifiers to bytes or paths, then hands them to an engine
pub struct SourceOpener {
    resolver: SourceResolver,
    engine: Arc<dyn DocumentEngine>,
}

impl SourceOpener {
    pub fn new(resolver: SourceResolver, engine: Arc<dyn DocumentEngine>) -> Self {
        Self { resolver, engine }
    }
}

#[async_trait]
impl DocumentOpener for SourceOpener {
    async fn open(&self, identifier: &str) -> Result<Arc<dyn EngineDocument>> {
        let source = self.resolver.resolve(identifier).await?;
        let engine = Arc::clone(&self.engine);

        // Parsing is CPU-bound
        tokio::task::spawn_blocking(move || engine.open(source)).await?
    }
}

type Slot = Shared<BoxFuture<'static, Result<Arc<DocumentHandle>>>>;

/// Identifier-keyed set of open documents
pub struct DocumentRegistry {
    opener: Arc<dyn DocumentOpener>,
    writer: OutputFileWriter,
    scale_range: ScaleRange,
    slots: Mutex<HashMap<String, Slot>>,
}

impl DocumentRegistry {
    pub fn new(
        opener: Arc<dyn DocumentOpener>,
        writer: OutputFileWriter,
        scale_range: ScaleRange,
    ) -> Self {
        Self {
            opener,
            writer,
            scale_range,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the handle for `identifier`, opening the document if needed
    pub async fn resolve(&self, identifier: &str) -> Result<Arc<DocumentHandle>> {
        let slot = {
            let mut slots = self.slots.lock();
            match slots.get(identifier) {
                Some(slot) => slot.clone(),
                None => {
                    let slot = self.open(identifier);
                    slots.insert(identifier.to_string(), slot.clone());
                    slot
                }
            }
        };

        let opened = slot.clone().await;
        if opened.is_err() {
            self.discard_failed(identifier, &slot);
        }
        opened
    }

    /// Start opening `identifier`; every waiter gets the same outcome
    fn open(&self, identifier: &str) -> Slot {
        let opener = Arc::clone(&self.opener);
        let writer = self.writer.clone();
        let scale_range = self.scale_range;
        let identifier = identifier.to_string();

        async move {
            let document = opener.open(&identifier).await.map_err(|e| {
                tracing::warn!("Failed to open document {}: {}", identifier, e);
                e
            })?;
            tracing::info!(
                "Opened document {} ({} pages)",
                identifier,
                document.page_count()
            );
            Ok::<_, PageImageError>(Arc::new(DocumentHandle::new(
                identifier,
                document,
                writer,
                scale_range,
            )))
        }
        .boxed()
        .shared()
    }

    /// Forget a failed slot unless it was already released or replaced
    fn discard_failed(&self, identifier: &str, slot: &Slot) {
        let mut slots = self.slots.lock();
        if slots
            .get(identifier)
            .is_some_and(|current| current.ptr_eq(slot))
        {
            slots.remove(identifier);
        }
    }

    /// Remove `identifier` and dispose its handle
    ///
    /// An open still in progress is awaited first. Returns whether a document
    /// was actually released; unknown identifiers are a no-op.
    pub async fn release(&self, identifier: &str) -> bool {
        let Some(slot) = self.slots.lock().remove(identifier) else {
            return false;
        };
        Self::dispose_slot(identifier, slot).await
    }

    async fn dispose_slot(identifier: &str, slot: Slot) -> bool {
        match slot.await {
            Ok(handle) => {
                handle.dispose().await;
                true
            }
            Err(_) => {
                tracing::debug!("Nothing to release for {}", identifier);
                false
            }
        }
    }

    /// Release every document
    pub async fn shutdown(&self) {
        let slots: Vec<(String, Slot)> = self.slots.lock().drain().collect();
        if slots.is_empty() {
            return;
        }

        tracing::info!("Releasing {} documents", slots.len());
        futures::future::join_all(
            slots
                .into_iter()
                .map(|(identifier, slot)| async move {
                    Self::dispose_slot(&identifier, slot).await
                }),
        )
        .await;
    }

    /// Number of open documents
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot.peek(), Some(Ok(_))))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
