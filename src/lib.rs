//! # RAG Chat
//!
//! A local chat server in front of an Ollama model. Each turn's prompt can be
//! enriched with text from uploaded documents and with results scraped from
//! Google and DuckDuckGo.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Upload  │──▶│  Extractor  │──▶│ ContextStore │──┐
//! └──────────┘   └─────────────┘   └──────────────┘  │
//!                                                    ▼
//! ┌──────────┐   ┌─────────────┐               ┌──────────┐   ┌──────────┐
//! │  /chat   │──▶│  WebSearch  │──────────────▶│  Prompt  │──▶│  Ollama  │
//! └──────────┘   │ Google, DDG │               └──────────┘   └──────────┘
//!                └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction from uploaded documents |
//! | [`store`] | In-memory registry of uploaded documents |
//! | [`search`] | Provider trait and result aggregation |
//! | [`search_google`] | Google results page scraper |
//! | [`search_ddg`] | DuckDuckGo HTML scraper |
//! | [`prompt`] | Prompt assembly |
//! | [`ollama`] | Generation backend and model registry |
//! | [`service`] | Request-level operations over shared state |
//! | [`server`] | HTTP server |

pub mod config;
pub mod extract;
pub mod models;
pub mod ollama;
pub mod prompt;
pub mod search;
pub mod search_ddg;
pub mod search_google;
pub mod server;
pub mod service;
pub mod store;
