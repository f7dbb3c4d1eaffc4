//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `NodeService` - project/node CRUD, forest invariants, forks, auto-layout, tree view
//! - `ContextBuilder` - root-to-target thread reconstruction with token estimates
//! - `StreamingSynchronizer` - token stream to caller and to node content
//! - `ChangeNotifier` / `PollingNotifier` - events as a node's content converges
//! - `ConversationService` - one chat turn end to end
//! - generation provider seam (`GenerationProvider`, `ProviderRegistry`)
//!
//! Services coordinate between the database layer and the HTTP surface,
//! implementing business rules and orchestrating multi-step operations.

mod content_writer;

pub mod change_notifier;
pub mod context_builder;
pub mod conversation_service;
pub mod error;
pub mod generation;
pub mod node_service;
pub mod streaming;

pub use change_notifier::{
    ChangeNotifier, NodeChangeEvent, NodeEventStream, NotifierConfig, PollingNotifier,
};
pub use context_builder::{estimate_tokens, ContextBuilder, ContextMessage, ConversationContext};
pub use conversation_service::{ChatError, ChatRequest, ChatTurn, ConversationService};
pub use error::NodeServiceError;
pub use generation::{
    EchoProvider, GenerationError, GenerationProvider, GenerationRequest, ProviderRegistry,
    ScriptedProvider, TokenStream,
};
pub use node_service::{ConversationTree, NodeService};
pub use streaming::{
    AssistantNodeParams, StreamingConfig, StreamingSession, StreamingSynchronizer, SyncError,
    SyncOutcome,
};
