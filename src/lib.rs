//! # RagSphere
//!
//! A multi-source retrieval-augmented context assembly engine for
//! document Q&A.
//!
//! RagSphere ingests extracted document text (segmentation, embedding,
//! vector indexing) and answers questions by fusing up to four
//! independently-fallible context sources — document chunks,
//! conversation history, live web search, and a growing knowledge graph
//! of past conversation entities — into one bounded prompt for a
//! text-completion provider.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Segmenter │──▶│  Embedding    │──▶│ Vector Index  │
//! │ (windows) │   │ (single-load) │   │ + Graph Store │
//! └───────────┘   └──────────────┘   └──────┬────────┘
//!                                           │
//!              ┌────────────┬───────────────┤
//!              ▼            ▼               ▼
//!        ┌──────────┐ ┌───────────┐  ┌────────────┐
//!        │   Web    │ │ Knowledge │  │  History   │
//!        │  Search  │ │   Graph   │  │  (turns)   │
//!        └────┬─────┘ └─────┬─────┘  └─────┬──────┘
//!             └──────┬──────┴──────────────┘
//!                    ▼
//!             ┌─────────────┐      ┌────────────┐
//!             │  Assembler  │─────▶│ Completion │
//!             │  (fusion)   │      │  provider  │
//!             └─────────────┘      └────────────┘
//! ```
//!
//! Every retrieval source is scoped to the querying user — tenant
//! isolation is enforced in the filters sent to the backends, not by
//! post-filtering — and every source degrades independently: a down
//! backend costs its context section, never the answer.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`segment`] | Sliding-window text segmentation |
//! | [`embedding`] | Embedding generation (single-flight model load) |
//! | [`vector`] | Vector index client |
//! | [`graph`] | Graph store client |
//! | [`websearch`] | Web search client |
//! | [`completion`] | Completion provider client |
//! | [`entities`] | Best-effort entity extraction |
//! | [`assemble`] | Context fusion orchestrator |
//! | [`persist`] | Background turn persistence |
//! | [`ingest`] | Ingestion pipeline |
//! | [`documents`] | Listing and cascade delete |

pub mod assemble;
pub mod completion;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod entities;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod models;
pub mod persist;
pub mod segment;
pub mod vector;
pub mod websearch;
