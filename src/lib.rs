//! Quill — AI provider orchestration core for a terminal writing assistant.
//!
//! Normalizes several incompatible LLM wire protocols (Anthropic Messages,
//! OpenAI-compatible Chat Completions, DeepSeek function calling) into one
//! streaming interface, runs bounded multi-turn tool-calling conversations,
//! gates mutating tool calls behind permission checks, and reassembles
//! streamed text into renderable content blocks.
//!
//! # Quick Start
//!
//! ```no_run
//! use quill::config::Config;
//! use quill::coordinator::Coordinator;
//! use quill::session::SessionContext;
//! use quill::tools::ToolRegistry;
//! use quill::types::AIRequest;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = Config::from_env();
//! let coordinator = Coordinator::new(config, Arc::new(ToolRegistry::new()));
//! let session = SessionContext::new("demo");
//! let request = AIRequest::new("Draft an opening paragraph.", "deepseek-chat");
//! let response = coordinator.process_request(&request, &session).await;
//! println!("{}", response.content);
//! # }
//! ```

pub mod config;
pub mod content;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod permission;
pub mod prelude;
pub mod provider;
pub mod session;
pub mod stream;
pub mod tools;
pub mod types;
