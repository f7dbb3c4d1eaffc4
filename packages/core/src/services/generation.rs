//! Generation Provider Seam
//!
//! Arbor consumes token streams, it does not produce them. A `GenerationProvider`
//! turns a conversation context into a `TokenStream`: an ordered, cancellable
//! sequence of text fragments. Dropping the stream cancels generation.
//!
//! Two providers ship with the core:
//!
//! - [`EchoProvider`] repeats the latest non-system message back word by word
//!   (offline default for the server)
//! - [`ScriptedProvider`] emits fixed fragments with optional delay and failure

use crate::models::NodeRole;
use crate::services::context_builder::ContextMessage;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fragments produced by a provider, ending with `None` on success
pub type TokenStream = BoxStream<'static, Result<String, GenerationError>>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// The provider refused or failed to open a stream
    #[error("Provider {provider} failed to start generation: {message}")]
    StartFailed { provider: String, message: String },

    /// The stream broke after it started
    #[error("Provider {provider} stream failed: {message}")]
    StreamFailed { provider: String, message: String },
}

impl GenerationError {
    pub fn start_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StartFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn stream_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StreamFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// What a provider is asked to continue
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<ContextMessage>,
    pub model: Option<String>,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Registry key, also recorded in the assistant node's metadata
    fn name(&self) -> &str;

    /// Model used when the request names none
    fn default_model(&self) -> Option<&str> {
        None
    }

    /// Open a token stream for `request`
    async fn stream(&self, request: GenerationRequest) -> Result<TokenStream, GenerationError>;
}

/// Turn a prepared list of items into a stream, sleeping `delay` before each one
fn paced(items: Vec<Result<String, GenerationError>>, delay: Option<Duration>) -> TokenStream {
    Box::pin(async_stream::stream! {
        for item in items {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            yield item;
        }
    })
}

/// Repeats the latest non-system message, one word per fragment
#[derive(Debug, Clone, Default)]
pub struct EchoProvider {
    delay: Option<Duration>,
}

impl EchoProvider {
    pub const NAME: &'static str = "echo";

    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between fragments, to make streaming observable
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl GenerationProvider for EchoProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_model(&self) -> Option<&str> {
        Some("echo-1")
    }

    async fn stream(&self, request: GenerationRequest) -> Result<TokenStream, GenerationError> {
        let source = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role != NodeRole::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let items = source
            .split_inclusive(char::is_whitespace)
            .map(|word| Ok(word.to_string()))
            .collect();

        Ok(paced(items, self.delay))
    }
}

/// Emits a fixed list of fragments
///
/// Optionally fails to start, or fails mid-stream after a number of fragments.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    name: String,
    fragments: Vec<String>,
    delay: Option<Duration>,
    fail_after: Option<usize>,
    fail_to_start: bool,
}

impl ScriptedProvider {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "scripted".to_string(),
            fragments: fragments.into_iter().map(Into::into).collect(),
            delay: None,
            fail_after: None,
            fail_to_start: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Emit `count` fragments, then an error
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Refuse to open a stream at all
    pub fn failing_to_start(mut self) -> Self {
        self.fail_to_start = true;
        self
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, _request: GenerationRequest) -> Result<TokenStream, GenerationError> {
        if self.fail_to_start {
            return Err(GenerationError::start_failed(&self.name, "scripted start failure"));
        }

        let mut items: Vec<Result<String, GenerationError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if let Some(count) = self.fail_after {
            items.truncate(count);
            items.push(Err(GenerationError::stream_failed(
                &self.name,
                "scripted stream failure",
            )));
        }

        Ok(paced(items, self.delay))
    }
}

/// Providers by name, with one default
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
    default_provider: String,
}

impl ProviderRegistry {
    /// Registry whose default is `provider`
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        let default_provider = provider.name().to_string();
        let mut providers: HashMap<String, Arc<dyn GenerationProvider>> = HashMap::new();
        providers.insert(default_provider.clone(), provider);
        Self {
            providers,
            default_provider,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn GenerationProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Look up `name`, or the default provider when `name` is `None`
    pub fn resolve(&self, name: Option<&str>) -> Option<Arc<dyn GenerationProvider>> {
        self.providers
            .get(name.unwrap_or(self.default_provider.as_str()))
            .cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(Arc::new(EchoProvider::new()))
    }
}
