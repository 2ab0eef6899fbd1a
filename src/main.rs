use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::{sync::Arc, thread::sleep, time::Duration};
use tracing_subscriber::EnvFilter;

use marksearch::{
    store::{ImportBatch, ListFilter},
    AppContext, Config, Eid, JobStatus, SearchRequest,
};

mod cli;

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn scrape(ctx: Arc<AppContext>, ids: Vec<String>) -> anyhow::Result<()> {
    let ids: Vec<Eid> = if ids.is_empty() {
        ctx.store()
            .list_bookmarks(&ListFilter {
                status: Some(marksearch::store::BookmarkStatus::Pending),
                ..Default::default()
            })?
            .into_iter()
            // oldest first
            .rev()
            .map(|b| b.id)
            .collect()
    } else {
        ids.into_iter().map(Eid::from).collect()
    };

    if ids.is_empty() {
        log::info!("nothing to scrape");
        return Ok(());
    }

    ctrlc::set_handler({
        let ctx = ctx.clone();
        move || {
            log::info!("received shutdown signal");
            if let Err(e) = ctx.jobs().stop() {
                log::debug!("{e}");
            }
        }
    })
    .context("failed to set Ctrl+C handler")?;

    ctx.jobs().start(&ids)?;

    let progress = ProgressBar::new(ids.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")?
            .progress_chars("█▓░"),
    );

    loop {
        let status = ctx.jobs().get_status();
        progress.set_position(status.current as u64);
        progress.set_message(status.current_url.clone().unwrap_or_default());

        if !matches!(status.status, JobStatus::Running | JobStatus::Paused) {
            break;
        }
        sleep(Duration::from_millis(200));
    }

    let status = ctx.jobs().wait();
    progress.finish_and_clear();
    print_json(&status)
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.verbose);

    let config = Config::load()?;
    let ctx = Arc::new(AppContext::from_config(config)?);

    match args.command {
        cli::Command::Import { file } => {
            let data = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let batch: ImportBatch =
                serde_json::from_str(&data).context("failed to parse import file")?;
            let counts = ctx.store().import_batch(&batch)?;
            print_json(&counts)?;
        }

        cli::Command::List {
            status,
            folder,
            limit,
        } => {
            let bookmarks = ctx.store().list_bookmarks(&ListFilter {
                status: status.map(Into::into),
                folder_path: folder,
                limit,
            })?;
            print_json(&bookmarks)?;
        }

        cli::Command::Search {
            query,
            limit,
            search_type,
        } => {
            let response = ctx.search().search_request(&SearchRequest {
                query,
                limit,
                search_type: search_type.map(Into::into),
            })?;
            print_json(&response)?;
        }

        cli::Command::Scrape { ids } => scrape(ctx.clone(), ids)?,

        cli::Command::Process { id } => {
            let Some(pipeline) = ctx.pipeline() else {
                if !ctx.config().embeddings.enabled {
                    bail!("embeddings are disabled in config.yaml");
                }
                bail!(
                    "embedding model {} failed to load",
                    ctx.config().embeddings.model
                );
            };
            match id {
                Some(id) => {
                    let chunks = pipeline.process_content(&id)?;
                    print_json(&serde_json::json!({ "bookmark_id": id, "chunks": chunks }))?;
                }
                None => print_json(&pipeline.process_pending()?)?,
            }
        }

        cli::Command::Delete { id } => {
            ctx.store().delete_bookmark(&id)?;
            log::info!("deleted bookmark {id}");
        }

        cli::Command::Stats => print_json(&ctx.store().stats()?)?,
    }

    Ok(())
}
