//! Generative model lifecycle and inference.
//!
//! A [`ModelLoader`] turns a model identifier into a [`GenerativeModel`]. The
//! [`GenerationEngine`] loads that model once into a [`ModelHandle`] and
//! reuses it for every request until it is explicitly reloaded or shut down.
//!
//! # Example
//!
//! ```rust,ignore
//! use docsense_rag::{GenerationEngine, PromptTemplate};
//!
//! let engine = GenerationEngine::new(Arc::new(loader), "tiiuae/falcon-7b-instruct")
//!     .with_attempts(2);
//! engine.load().await?;
//! let answer = engine.generate(&PromptTemplate::default().render("text", "question")).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::error::{RagError, Result};
use crate::prompt::Prompt;

/// The raw text produced by a generative model.
///
/// No post-processing is applied; callers interpret the free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer(String);

impl Answer {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A loaded generative model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Run the model against a prompt and return its raw output.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    /// Whether concurrent calls to [`generate`](GenerativeModel::generate)
    /// are safe. Non-reentrant models are serialised by their [`ModelHandle`].
    fn is_reentrant(&self) -> bool {
        true
    }
}

/// Locates and initialises generative models. Loading may take seconds.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the model identified by `model_id`.
    ///
    /// Implementations should return [`RagError::ModelLoad`] when the model
    /// cannot be located or initialised.
    async fn load_model(&self, model_id: &str) -> Result<Arc<dyn GenerativeModel>>;
}

/// A loaded model together with its identity.
///
/// If the model is not reentrant every call holds an exclusive guard for
/// its duration.
pub struct ModelHandle {
    model_id: String,
    model: Arc<dyn GenerativeModel>,
    loaded_at: DateTime<Utc>,
    exclusive: Option<Mutex<()>>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_id", &self.model_id)
            .field("loaded_at", &self.loaded_at)
            .field("exclusive", &self.exclusive.is_some())
            .finish()
    }
}

impl ModelHandle {
    pub fn new(model_id: impl Into<String>, model: Arc<dyn GenerativeModel>) -> Self {
        let exclusive = if model.is_reentrant() { None } else { Some(Mutex::new(())) };
        Self { model_id: model_id.into(), model, loaded_at: Utc::now(), exclusive }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Run the model once.
    ///
    /// Failures other than [`RagError::Generation`] are reported as one.
    pub async fn generate(&self, prompt: &Prompt) -> Result<Answer> {
        let _guard = match &self.exclusive {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        self.model.generate(prompt).await.map(Answer).map_err(|e| match e {
            RagError::Generation(_) => e,
            other => RagError::Generation(other.to_string()),
        })
    }
}

/// Owns the process-wide model handle and the generation failure policy.
pub struct GenerationEngine {
    loader: Arc<dyn ModelLoader>,
    model_id: String,
    attempts: u32,
    timeout: Option<Duration>,
    handle: RwLock<Option<Arc<ModelHandle>>>,
}

impl GenerationEngine {
    /// Create an engine for `model_id`. The model is not loaded yet.
    pub fn new(loader: Arc<dyn ModelLoader>, model_id: impl Into<String>) -> Self {
        Self {
            loader,
            model_id: model_id.into(),
            attempts: 1,
            timeout: None,
            handle: RwLock::new(None),
        }
    }

    /// Total attempts for loading and generation. Values below 1 are treated as 1.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Bound each generation call. An elapsed timeout is a [`RagError::Generation`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Whether a model handle is currently held.
    pub async fn is_loaded(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Load the model if it is not loaded yet and return the handle.
    ///
    /// Retries [`RagError::ModelLoad`] up to the configured attempt count.
    pub async fn load(&self) -> Result<Arc<ModelHandle>> {
        self.with_retry("load", || self.handle()).await
    }

    /// Replace the current handle with a freshly loaded model.
    ///
    /// On failure the previous handle is kept.
    pub async fn reload(&self) -> Result<Arc<ModelHandle>> {
        let mut slot = self.handle.write().await;
        let handle = self.with_retry("reload", || self.load_fresh()).await?;
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Release the model handle. The next call loads it again.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.handle.write().await.take() {
            info!(model = handle.model_id(), "model handle released");
        }
    }

    /// Generate an answer for `prompt`, loading the model on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] or [`RagError::Generation`] once the
    /// configured attempts are exhausted.
    #[instrument(skip_all, fields(model = %self.model_id, prompt_len = prompt.as_str().len()))]
    pub async fn generate(&self, prompt: &Prompt) -> Result<Answer> {
        self.with_retry("generate", || async {
            match self.handle().await {
                Ok(handle) => self.generate_once(&handle, prompt).await,
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn generate_once(&self, handle: &ModelHandle, prompt: &Prompt) -> Result<Answer> {
        let answer = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, handle.generate(prompt))
                .await
                .map_err(|_| {
                    RagError::Generation(format!("generation timed out after {timeout:?}"))
                })??,
            None => handle.generate(prompt).await?,
        };
        debug!(answer_len = answer.as_str().len(), "generation completed");
        Ok(answer)
    }

    /// Return the cached handle or load it, at most once across concurrent callers.
    async fn handle(&self) -> Result<Arc<ModelHandle>> {
        if let Some(handle) = self.handle.read().await.as_ref() {
            return Ok(handle.clone());
        }
        let mut slot = self.handle.write().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }
        let handle = self.load_fresh().await?;
        *slot = Some(handle.clone());
        Ok(handle)
    }

    async fn load_fresh(&self) -> Result<Arc<ModelHandle>> {
        info!(model = %self.model_id, "loading generative model");
        let model = self.loader.load_model(&self.model_id).await.map_err(|e| match e {
            RagError::ModelLoad { .. } => e,
            other => RagError::ModelLoad { model: self.model_id.clone(), message: other.to_string() },
        })?;
        info!(model = %self.model_id, "generative model loaded");
        Ok(Arc::new(ModelHandle::new(self.model_id.clone(), model)))
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    warn!(operation, attempt, max_attempts = self.attempts, error = %e, "retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::prompt::PromptTemplate;

    struct Echo;

    #[async_trait]
    impl GenerativeModel for Echo {
        async fn generate(&self, prompt: &Prompt) -> Result<String> {
            Ok(prompt.as_str().to_string())
        }
    }

    struct Flaky {
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl GenerativeModel for Flaky {
        async fn generate(&self, prompt: &Prompt) -> Result<String> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(RagError::Generation("out of memory".into()));
            }
            Ok(prompt.as_str().len().to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl GenerativeModel for Slow {
        async fn generate(&self, _prompt: &Prompt) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }

        fn is_reentrant(&self) -> bool {
            false
        }
    }

    /// Records the peak number of overlapping `generate` calls.
    struct InFlight {
        reentrant: bool,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlight {
        fn new(reentrant: bool) -> Self {
            Self { reentrant, current: AtomicUsize::new(0), peak: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl GenerativeModel for InFlight {
        async fn generate(&self, _prompt: &Prompt) -> Result<String> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(String::new())
        }

        fn is_reentrant(&self) -> bool {
            self.reentrant
        }
    }

    /// Takes a while to load, so concurrent first calls overlap.
    #[derive(Default)]
    struct DelayedLoader {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ModelLoader for DelayedLoader {
        async fn load_model(&self, _model_id: &str) -> Result<Arc<dyn GenerativeModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Arc::new(Echo))
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
        fail_first: usize,
        flaky_failures: usize,
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load_model(&self, model_id: &str) -> Result<Arc<dyn GenerativeModel>> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(RagError::ModelLoad {
                    model: model_id.to_string(),
                    message: "weights not found".into(),
                });
            }
            match model_id {
                "slow" => Ok(Arc::new(Slow)),
                "flaky" => Ok(Arc::new(Flaky { failures_left: AtomicUsize::new(self.flaky_failures) })),
                _ => Ok(Arc::new(Echo)),
            }
        }
    }

    fn prompt() -> Prompt {
        PromptTemplate::default().render("ctx", "q")
    }

    #[tokio::test]
    async fn loads_model_once_across_calls() {
        let loader = Arc::new(CountingLoader::default());
        let engine = GenerationEngine::new(loader.clone(), "echo");

        let first = engine.generate(&prompt()).await.unwrap();
        let second = engine.generate(&prompt()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_str(), prompt().as_str());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reload_and_shutdown_manage_the_handle() {
        let loader = Arc::new(CountingLoader::default());
        let engine = GenerationEngine::new(loader.clone(), "echo");

        engine.load().await.unwrap();
        engine.reload().await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);

        engine.shutdown().await;
        assert!(!engine.is_loaded().await);
        engine.generate(&prompt()).await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn load_failure_is_not_retried_by_default() {
        let loader = Arc::new(CountingLoader { fail_first: 1, ..Default::default() });
        let engine = GenerationEngine::new(loader.clone(), "echo");

        let err = engine.generate(&prompt()).await.unwrap_err();
        assert!(matches!(err, RagError::ModelLoad { .. }));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        // the failure is terminal for the request, not for the engine
        assert!(engine.generate(&prompt()).await.is_ok());
    }

    #[tokio::test]
    async fn retries_are_bounded_by_attempts() {
        let loader = Arc::new(CountingLoader { fail_first: 5, ..Default::default() });
        let engine = GenerationEngine::new(loader.clone(), "echo").with_attempts(3);

        assert!(engine.load().await.is_err());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn generation_errors_are_retried() {
        let loader = Arc::new(CountingLoader { flaky_failures: 2, ..Default::default() });
        let engine = GenerationEngine::new(loader.clone(), "flaky").with_attempts(3);

        let answer = engine.generate(&prompt()).await.unwrap();
        assert_eq!(answer.as_str(), prompt().as_str().len().to_string());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_bounds_generation() {
        let loader = Arc::new(CountingLoader::default());
        let engine =
            GenerationEngine::new(loader, "slow").with_timeout(Duration::from_millis(50));

        let err = engine.generate(&prompt()).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(ref m) if m.contains("timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn non_reentrant_model_runs_one_call_at_a_time() {
        let model = Arc::new(InFlight::new(false));
        let handle = ModelHandle::new("exclusive", model.clone());
        let p = prompt();

        let (a, b, c) = tokio::join!(handle.generate(&p), handle.generate(&p), handle.generate(&p));
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(model.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reentrant_model_calls_overlap() {
        let model = Arc::new(InFlight::new(true));
        let handle = ModelHandle::new("shared", model.clone());
        let p = prompt();

        let _ = tokio::join!(handle.generate(&p), handle.generate(&p));
        assert_eq!(model.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_first_calls_load_once() {
        let loader = Arc::new(DelayedLoader::default());
        let engine = GenerationEngine::new(loader.clone(), "echo");
        let p = prompt();

        let (a, b, c) = tokio::join!(engine.generate(&p), engine.generate(&p), engine.generate(&p));
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(engine.is_loaded().await);
    }
}
