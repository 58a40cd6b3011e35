//! # Reminder
//!
//! Semantic search over the Quran, Hadith and the 99 Names, with
//! LLM-generated answers and a rotating daily reminder.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌─────────────┐
//! │  Corpus  │──▶│ ContentIndexer │──▶│ VectorIndex │◀── snapshot (bincode+zstd)
//! │  (JSON)  │   │  checkpointed  │   │  in-memory  │
//! └────┬─────┘   └────────────────┘   └──────┬──────┘
//!      │                                     │ query
//!      ▼                                     ▼
//! ┌──────────────┐                   ┌──────────────┐   ┌─────┐
//! │ DailyRotator │──▶ DailyBoard     │ search       │──▶│ LLM │
//! │   (timer)    │──▶ push fan-out   │ + sessions   │   └─────┘
//! └──────────────┘                   └──────────────┘
//!                         ▲                  ▲
//!                         └──── HTTP (axum) ─┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | Typed corpus loaders |
//! | [`embedding`] | Embedding provider backends |
//! | [`index`] | Vector index: store, query, export, import, load |
//! | [`indexer`] | Checkpointed corpus indexing |
//! | [`checkpoint`] | Indexer resume cursor |
//! | [`llm`] | Prompt building and LLM backends |
//! | [`search`] | Question answering pipeline |
//! | [`daily`] | Daily rotation and shared daily state |
//! | [`hijri`] | Hijri calendar conversion |
//! | [`push`] | Push subscriptions and delivery |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |

pub mod checkpoint;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod daily;
pub mod embedding;
pub mod error;
pub mod hijri;
pub mod index;
pub mod indexer;
pub mod llm;
pub mod progress;
pub mod push;
pub mod search;
pub mod server;
pub mod state;
