//! # Histify
//!
//! Upload a photo, find out whether it shows something historically
//! significant, and get a short and a long summary plus tags.
//!
//! The work is a chain of structured model calls:
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────────┐   ┌─────────┐
//! │  Image   │──▶│ Tag step     │──▶│ Summary step    │──▶│ History │
//! │ (data URI│   │ (≤ 4 tags)   │   │ (+ self-review) │   │ (≤ 5)   │
//! └──────────┘   └──────────────┘   └────────┬────────┘   └─────────┘
//!                                            ▼ optional
//!                                   ┌─────────────────┐
//!                                   │ Validation step │
//!                                   └─────────────────┘
//! ```
//!
//! Every model call goes through the [`completion::StructuredCompletion`]
//! trait, so the pipeline runs against OpenAI, Ollama, or a test fake
//! without changes.
//!
//! ## Quick Start
//!
//! ```bash
//! histify analyze ./colosseum.jpg
//! histify describe "A round stone amphitheatre with arches"
//! histify validate --summary "A lovely sunny day" --historical
//! histify history --tag tower
//! histify serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`image`] | Image payloads and data URIs |
//! | [`completion`] | Structured prompt calls and the backend trait |
//! | [`backend`] | OpenAI / Ollama / disabled backends |
//! | [`flows`] | Tag, summary, extended summary, and validation steps |
//! | [`history`] | Bounded recent-history log |
//! | [`analyze`] | The orchestrator |
//! | [`server`] | JSON HTTP API |
//! | [`logging`] | Tracing setup |

pub mod analyze;
pub mod backend;
pub mod completion;
pub mod config;
pub mod error;
pub mod flows;
pub mod history;
pub mod image;
pub mod logging;
pub mod models;
pub mod server;
