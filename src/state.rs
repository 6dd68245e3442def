// SPDX-License-Identifier: EUPL-1.2

//! Application state: configured blocks and the grade publisher.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::{self, BlockConfig},
    publish::{GradePublisher, TracingPublisher},
};

/// Shared application state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Blocks keyed by `block_id`. Read-only after start-up.
    pub blocks: HashMap<String, BlockConfig>,
    /// Where accepted grades go. Defaults to structured logging.
    pub publisher: Arc<dyn GradePublisher>,
}

impl AppState {
    pub fn new(blocks: Vec<BlockConfig>, publisher: Arc<dyn GradePublisher>) -> Self {
        let blocks = blocks
            .into_iter()
            .map(|b| (b.block_id.clone(), b))
            .collect();
        Self { blocks, publisher }
    }

    /// Load block configuration from the environment (see [`config::load_blocks`]).
    pub fn from_env() -> anyhow::Result<Self> {
        let blocks = config::load_blocks()?;
        for block in &blocks {
            tracing::info!(
                "Block '{}' ({:?}) → module {} [{}]",
                block.block_id,
                block.kind,
                block.module_id,
                block.signature_hash.as_str()
            );
        }
        Ok(Self::new(blocks, Arc::new(TracingPublisher)))
    }

    pub fn block(&self, block_id: &str) -> Option<&BlockConfig> {
        self.blocks.get(block_id)
    }
}
