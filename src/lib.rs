//! # SunuPeche
//!
//! Conversational assistant for small-scale fishing in Senegal. Each question
//! is answered from live weather, static tide tables, local reference
//! documents (CSV, PDF, JSON), and one completion call, with the conversation
//! persisted per user in SQLite.
//!
//! ## Architecture
//!
//! ```text
//!  question
//!     │
//!     ▼
//! ┌────────────┐   ┌───────────────────────┐
//! │ classify   │──▶│ context               │◀── loader (CSV/PDF/JSON, cached)
//! │ (keywords) │   │ (bounded text blocks) │◀── weather + tides
//! └────────────┘   └──────────┬────────────┘
//!                             ▼
//!                  ┌───────────────────────┐    ┌──────────┐
//!                  │ conversation          │───▶│  SQLite  │
//!                  │ prompt + completion   │    │ sessions │
//!                  └───────────────────────┘    └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction and text decoding |
//! | [`loader`] | Reference data loading and caching |
//! | [`tides`] | Static tide schedules and tide phase |
//! | [`weather`] | Weather fetcher and environment source |
//! | [`classify`] | Keyword question classifier |
//! | [`context`] | Context payload assembly |
//! | [`prompt`] | Instruction prompt template |
//! | [`completion`] | Completion provider abstraction |
//! | [`conversation`] | Per-user pipeline and orchestration |
//! | [`store`] | Session and message persistence |
//! | [`sources`] | `sources` command output |
//! | [`stats`] | History inspection commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod classify;
pub mod completion;
pub mod config;
pub mod context;
pub mod conversation;
pub mod db;
pub mod extract;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod sources;
pub mod stats;
pub mod store;
pub mod tides;
pub mod weather;
