use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};

use crate::{
    app::scrape_job::ScrapeJobManager,
    config::Config,
    scrape::{HtmlScraper, ScrapeOptions, Scraper},
    semantic::{ContentPipeline, EmbeddingModel, EmbeddingProvider, SearchEngine},
    store::{RetryPolicy, Store},
};

/// Application context: the store and every service built on top of it,
/// wired once from the configuration.
pub struct AppContext {
    config: Config,
    store: Arc<Store>,
    search: SearchEngine,
    pipeline: Option<Arc<ContentPipeline>>,
    jobs: ScrapeJobManager,
}

impl AppContext {
    /// Opens the database and loads the embedding model when enabled. A model
    /// that fails to load disables semantic search instead of failing.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let db_path = config.database_path();
        let store = Store::open_with(&db_path, RetryPolicy::from(&config.store))
            .with_context(|| format!("failed to open database {}", db_path.display()))?;

        let embedder: Option<Arc<dyn EmbeddingProvider>> = if config.embeddings.enabled {
            match EmbeddingModel::new(
                &config.embeddings.model,
                config.models_dir(),
                Some(Duration::from_secs(config.embeddings.download_timeout_secs)),
            ) {
                Ok(model) => Some(Arc::new(model)),
                Err(e) => {
                    log::warn!("semantic search disabled: {e}");
                    None
                }
            }
        } else {
            None
        };

        let scraper = HtmlScraper::from_config(&config.scrape)?;

        Ok(Self::with_parts(
            config,
            Arc::new(store),
            embedder,
            Arc::new(scraper),
        ))
    }

    /// Wires the services around already constructed parts.
    pub fn with_parts(
        config: Config,
        store: Arc<Store>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        scraper: Arc<dyn Scraper>,
    ) -> Self {
        let pipeline = embedder.clone().map(|embedder| {
            Arc::new(ContentPipeline::new(
                store.clone(),
                embedder,
                config.chunking,
                config.embeddings.max_batch_size,
            ))
        });

        let search = SearchEngine::new(store.clone(), embedder, config.search.clone());

        let jobs = ScrapeJobManager::new(
            store.clone(),
            scraper,
            pipeline.clone(),
            ScrapeOptions::from(&config.scrape),
        );

        Self {
            config,
            store,
            search,
            pipeline,
            jobs,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    /// `None` when no embedding provider is available.
    pub fn pipeline(&self) -> Option<&Arc<ContentPipeline>> {
        self.pipeline.as_ref()
    }

    pub fn jobs(&self) -> &ScrapeJobManager {
        &self.jobs
    }
}
