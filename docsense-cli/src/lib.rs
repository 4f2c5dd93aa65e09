//! # docsense-cli
//!
//! The `docsense` command-line launcher.
//!
//! ```bash
//! # Build the index from the sample corpus (or --corpus passages.txt)
//! docsense build-index
//!
//! # Analyse documents against a local OpenAI-compatible server
//! docsense --api-base http://localhost:11434/v1 --generation-model llama3.2 analyze report.pdf
//!
//! # Keep the model loaded and analyse paths as they are entered
//! docsense interactive
//! ```

pub mod cli;
pub mod commands;
pub mod telemetry;

pub use cli::{Cli, Command};
pub use commands::{exit_code, run};
