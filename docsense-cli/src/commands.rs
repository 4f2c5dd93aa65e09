//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use docsense_rag::openai::{OPENAI_API_BASE, OpenAIEmbeddingProvider};
use docsense_rag::openai_chat::OpenAIModelLoader;
use docsense_rag::{AnalyzerConfig, DocumentAnalyzer, RagError, Stage, VectorIndex};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Command};

/// Reference passages used when no corpus file is given.
pub const SAMPLE_CORPUS: [&str; 3] = [
    "Artificial intelligence has transformed how documents are created.",
    "AI-generated text often lacks human creativity.",
    "Understanding whether text is AI-generated requires specific analysis.",
];

const PROMPT: &str = "docsense> ";

/// Some documents passed to `analyze` failed; each was already reported.
#[derive(Debug, Error)]
#[error("{failed} of {total} documents could not be analysed")]
pub struct AnalysisFailed {
    pub failed: usize,
    pub total: usize,
    /// Stage of the first failure, which decides the exit code.
    pub stage: Stage,
}

/// Process exit code for a failure in `stage`.
pub fn stage_exit_code(stage: Stage) -> u8 {
    match stage {
        Stage::Configuration => 2,
        Stage::Extraction => 3,
        Stage::Index => 4,
        Stage::Retrieval => 5,
        Stage::Generation => 6,
    }
}

/// Process exit code for an error returned by [`run`].
///
/// Errors that did not come from the pipeline exit with 1.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(failed) = err.downcast_ref::<AnalysisFailed>() {
        return stage_exit_code(failed.stage);
    }
    err.downcast_ref::<RagError>().map(|e| stage_exit_code(e.stage())).unwrap_or(1)
}

/// Split a newline-delimited corpus into passages, skipping blank lines.
pub fn parse_corpus(text: &str) -> Vec<String> {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect()
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.analyzer_config()?;
    let analyzer = build_analyzer(&cli, config).await?;

    match cli.command {
        Command::Analyze { paths, json, bootstrap } => {
            analyze(&analyzer, &paths, json, bootstrap).await
        }
        Command::BuildIndex { corpus } => build_index(&analyzer, corpus.as_deref()).await,
        Command::Interactive => interactive(&analyzer).await,
    }
}

async fn build_analyzer(cli: &Cli, config: AnalyzerConfig) -> Result<DocumentAnalyzer> {
    let api_key = cli.api_key.clone().unwrap_or_default();
    let api_base = cli.api_base.clone().unwrap_or_else(|| OPENAI_API_BASE.to_string());

    let embedder = OpenAIEmbeddingProvider::compatible(api_key.clone(), api_base.clone())
        .with_model(config.embedding_model.clone())
        .detect_dimensions()
        .await?;
    let loader = OpenAIModelLoader::compatible(api_key, api_base);

    Ok(DocumentAnalyzer::builder()
        .config(config)
        .embedding_provider(Arc::new(embedder))
        .model_loader(Arc::new(loader))
        .build()?)
}

async fn analyze(
    analyzer: &DocumentAnalyzer,
    paths: &[PathBuf],
    json: bool,
    bootstrap: bool,
) -> Result<()> {
    if bootstrap && !VectorIndex::exists(&analyzer.config().index_location).await {
        info!("no index found, building from the sample corpus");
        analyzer.build_index(&SAMPLE_CORPUS).await?;
    }

    // the model loads on the first document that reaches generation
    let mut first_stage = None;
    let mut failed = 0;
    for path in paths {
        if let Err(e) = analyze_one(analyzer, path, json).await {
            eprintln!("{}: {} failed: {e}", path.display(), e.stage());
            first_stage.get_or_insert(e.stage());
            failed += 1;
        }
    }
    analyzer.shutdown().await;

    match first_stage {
        Some(stage) => Err(AnalysisFailed { failed, total: paths.len(), stage }.into()),
        None => Ok(()),
    }
}

async fn analyze_one(analyzer: &DocumentAnalyzer, path: &Path, json: bool) -> docsense_rag::Result<()> {
    if json {
        let analysis = analyzer.analyze_path_detailed(path).await?;
        match serde_json::to_string_pretty(&analysis) {
            Ok(out) => println!("{out}"),
            Err(e) => warn!(error = %e, "failed to serialize analysis"),
        }
    } else {
        let answer = analyzer.analyze_path(path).await?;
        println!("{}: {answer}", path.display());
    }
    Ok(())
}

async fn build_index(analyzer: &DocumentAnalyzer, corpus: Option<&Path>) -> Result<()> {
    let passages = match corpus {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read corpus {}", path.display()))?;
            parse_corpus(&text)
        }
        None => SAMPLE_CORPUS.iter().map(|s| s.to_string()).collect(),
    };

    let index = analyzer.build_index(&passages).await?;
    println!(
        "Indexed {} passages with {} into {}",
        index.len(),
        index.embedding_model(),
        index.location().display()
    );
    Ok(())
}

async fn interactive(analyzer: &DocumentAnalyzer) -> Result<()> {
    if let Err(e) = analyzer.start().await {
        warn!(stage = %e.stage(), error = %e, "warm-up failed, retrying on first document");
    }
    let mut editor = DefaultEditor::new().context("failed to open the line editor")?;
    println!("Enter a document path to analyse, or 'exit' to quit.");

    loop {
        let line = match tokio::task::block_in_place(|| editor.readline(PROMPT)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                analyzer.shutdown().await;
                return Err(e.into());
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }
        if let Err(e) = editor.add_history_entry(input) {
            debug!(error = %e, "failed to record history entry");
        }

        match analyzer.analyze_path(input).await {
            Ok(answer) => println!("{answer}"),
            Err(e) => eprintln!("{} failed: {e}", e.stage()),
        }
    }

    analyzer.shutdown().await;
    Ok(())
}
