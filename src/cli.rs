use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use marksearch::{semantic::SearchType, store::BookmarkStatus};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum StatusArg {
    Pending,
    Completed,
    Failed,
}

impl From<StatusArg> for BookmarkStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => BookmarkStatus::Pending,
            StatusArg::Completed => BookmarkStatus::Completed,
            StatusArg::Failed => BookmarkStatus::Failed,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum SearchMode {
    Hybrid,
    Semantic,
    Keyword,
}

impl From<SearchMode> for SearchType {
    fn from(value: SearchMode) -> Self {
        match value {
            SearchMode::Hybrid => SearchType::Hybrid,
            SearchMode::Semantic => SearchType::Semantic,
            SearchMode::Keyword => SearchType::Keyword,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Import a parsed folder/bookmark tree (JSON)
    Import {
        /// path to the JSON file
        file: PathBuf,
    },

    /// List bookmarks, newest first
    List {
        #[clap(short, long, value_enum)]
        status: Option<StatusArg>,

        /// Folder path; includes subfolders
        #[clap(short, long)]
        folder: Option<String>,

        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Search bookmarks
    Search {
        query: String,

        #[clap(short, long)]
        limit: Option<usize>,

        #[clap(short = 't', long = "type", value_enum)]
        search_type: Option<SearchMode>,
    },

    /// Scrape bookmarks in order. Scrapes every pending bookmark when no ids
    /// are given. Ctrl+C stops the job.
    Scrape { ids: Vec<String> },

    /// Chunk and embed scraped content. Processes every bookmark with
    /// content but no embeddings when no id is given.
    Process { id: Option<String> },

    /// Delete a bookmark together with its content and embeddings
    Delete { id: String },

    /// Print store statistics
    Stats,
}
