use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;

use code_graph::service::{CodeGraphService, ContextRequest, IndexRequest, RelatedRequest};

#[derive(Parser)]
#[command(name = "code-graph")]
#[command(about = "Index a source tree into a call/import graph and query it")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Index the current directory (Python only)
    code-graph index .

    # Index Rust and TypeScript sources, tests included
    code-graph index ./repo -l rust -l typescript --include-tests

    # Callers and callees of a function, two hops out
    code-graph context ./repo main --depth 2

    # Files that import or call into a file
    code-graph related ./repo app/models.py --relationship imported_by
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Which files to index; shared by every command.
#[derive(clap::Args, Clone)]
pub struct IndexArgs {
    /// Language to index (repeatable, defaults to python)
    #[arg(short = 'l', long = "language")]
    pub languages: Vec<String>,

    /// Also index test files and directories
    #[arg(long)]
    pub include_tests: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index a directory and print the counts
    Index {
        /// Path to the project
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        index: IndexArgs,

        /// Extract files one at a time instead of in parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Show callers and callees of a function
    Context {
        /// Path to the project
        path: PathBuf,

        /// Function name
        function: String,

        /// Maximum number of call hops
        #[arg(long, default_value = "3")]
        depth: u32,

        /// Leave callers out
        #[arg(long)]
        no_callers: bool,

        /// Leave callees out
        #[arg(long)]
        no_callees: bool,

        #[command(flatten)]
        index: IndexArgs,
    },

    /// List files related to a file by imports or calls
    Related {
        /// Path to the project
        path: PathBuf,

        /// File, relative to the project
        file: String,

        /// imports, imported_by, calls, called_by or all
        #[arg(long, default_value = "all")]
        relationship: String,

        /// Maximum number of results
        #[arg(long, default_value = "20")]
        limit: usize,

        #[command(flatten)]
        index: IndexArgs,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let service = CodeGraphService::new();

    match cli.command {
        Commands::Index {
            path,
            index,
            sequential,
        } => index_project(&service, &path, &index, sequential).await,
        Commands::Context {
            path,
            function,
            depth,
            no_callers,
            no_callees,
            index,
        } => {
            ensure_indexed(&service, &path, &index).await?;
            let context = service
                .function_context(ContextRequest {
                    project_path: path_string(&path),
                    function_name: function,
                    include_callers: Some(!no_callers),
                    include_callees: Some(!no_callees),
                    max_depth: Some(depth),
                })
                .await?;
            print_json(&context)
        }
        Commands::Related {
            path,
            file,
            relationship,
            limit,
            index,
        } => {
            ensure_indexed(&service, &path, &index).await?;
            let related = service
                .related_files(RelatedRequest {
                    project_path: path_string(&path),
                    file_path: file,
                    relationship_type: Some(relationship),
                    limit: Some(limit),
                })
                .await?;
            print_json(&related)
        }
    }
}

async fn index_project(service: &CodeGraphService, path: &Path, args: &IndexArgs, sequential: bool) -> anyhow::Result<()> {
    let request = IndexRequest {
        parallel: Some(!sequential),
        ..index_request(path, args)
    };
    let response = service.index(request).await?;
    print_json(&response)
}

async fn ensure_indexed(service: &CodeGraphService, path: &Path, args: &IndexArgs) -> anyhow::Result<()> {
    service.index(index_request(path, args)).await?;
    Ok(())
}

fn index_request(path: &Path, args: &IndexArgs) -> IndexRequest {
    IndexRequest {
        project_path: path_string(path),
        languages: (!args.languages.is_empty()).then(|| args.languages.clone()),
        include_tests: Some(args.include_tests),
        parallel: None,
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{}", json);
    Ok(())
}
