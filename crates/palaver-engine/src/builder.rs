use std::sync::Arc;

use anyhow::{Context, Result};

use palaver_llm::ChatClient;
use palaver_store::ChatStore;

use crate::config::EngineConfig;
use crate::engine::ResponderEngine;
use crate::service::ChatService;
use crate::title::{LlmTitleGenerator, TitleGenerator};
use crate::tools::{ToolHandler, ToolRegistry};
use crate::turn::TurnController;

/// Assembles a [`ChatService`] from its parts. A store and a chat client
/// are required; everything else has defaults (no tools, LLM-backed
/// titles on the configured model).
#[derive(Default)]
pub struct ChatServiceBuilder {
    store: Option<Arc<dyn ChatStore>>,
    client: Option<Arc<dyn ChatClient>>,
    tools: ToolRegistry,
    titles: Option<Arc<dyn TitleGenerator>>,
    config: EngineConfig,
}

impl ChatServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tool(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Overrides the title generator (defaults to [`LlmTitleGenerator`]).
    pub fn titles(mut self, titles: Arc<dyn TitleGenerator>) -> Self {
        self.titles = Some(titles);
        self
    }

    pub fn build(self) -> Result<ChatService> {
        let store = self.store.context("ChatServiceBuilder requires a store")?;
        let client = self.client.context("ChatServiceBuilder requires a chat client")?;

        let titles = self.titles.unwrap_or_else(|| {
            Arc::new(LlmTitleGenerator::new(
                Arc::clone(&client),
                self.config.model.clone(),
            ))
        });

        let engine = ResponderEngine::new(client, self.config);
        let controller = TurnController::new(
            Arc::clone(&store),
            engine,
            Arc::new(self.tools),
            titles,
        );

        Ok(ChatService::new(store, controller))
    }
}
