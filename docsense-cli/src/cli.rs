//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docsense_rag::{AnalyzerConfig, ContextSource};

#[derive(Debug, Parser)]
#[command(name = "docsense")]
#[command(about = "Ask a language model whether a document looks AI-generated")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file (fields not set take their defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the vector index
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// Embedding model identifier
    #[arg(long, global = true)]
    pub embedding_model: Option<String>,

    /// Generative model identifier
    #[arg(long, global = true)]
    pub generation_model: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, global = true, env = "OPENAI_API_BASE")]
    pub api_base: Option<String>,

    /// API key (empty for local servers)
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Number of reference passages to retrieve
    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    /// What the prompt context is filled with
    #[arg(long, global = true, value_enum)]
    pub context: Option<ContextArg>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyse one or more documents
    Analyze {
        /// Documents to analyse (plain text or PDF)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print the prompt and retrieved references as JSON
        #[arg(long)]
        json: bool,

        /// Build the index from the sample corpus if none exists
        #[arg(long)]
        bootstrap: bool,
    },

    /// Build (or rebuild) the vector index
    BuildIndex {
        /// Newline-delimited corpus file; the built-in sample corpus if omitted
        #[arg(long)]
        corpus: Option<PathBuf>,
    },

    /// Analyse documents entered at a prompt, keeping the model loaded
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContextArg {
    /// The extracted document text
    Document,
    /// The retrieved reference passages
    Retrieved,
}

impl From<ContextArg> for ContextSource {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::Document => ContextSource::Document,
            ContextArg::Retrieved => ContextSource::Retrieved,
        }
    }
}

impl Cli {
    /// Resolve the analyzer configuration: file (or defaults), then flags.
    pub fn analyzer_config(&self) -> Result<AnalyzerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                AnalyzerConfig::from_json(&json)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => AnalyzerConfig::default(),
        };

        if let Some(index) = &self.index {
            config.index_location = index.clone();
        }
        if let Some(model) = &self.embedding_model {
            config.embedding_model = model.clone();
        }
        if let Some(model) = &self.generation_model {
            config.generation_model = model.clone();
        }
        if let Some(k) = self.top_k {
            config.retrieval_k = k;
        }
        if let Some(context) = self.context {
            config.context_source = context.into();
        }

        config.validate()?;
        Ok(config)
    }
}
