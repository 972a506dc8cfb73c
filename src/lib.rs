//! # MediCoz
//!
//! A retrieval-grounded medical chat service.
//!
//! Registered users hold conversations in persisted chat sessions. Every
//! user turn is answered by retrieving passages from a vector index of
//! verified medical documents and asking a hosted language model to answer
//! strictly from them. When nothing relevant is found the service refuses instead of
//! guessing, and remote failures become a polite apology rather than an
//! error.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ HTTP (axum)│──▶│ ChatService  │──▶│ SessionStore  │
//! │  + JWT     │   │  per-session │   │ SQLite / mem  │
//! └────────────┘   │     lock     │   └───────────────┘
//!                  └──────┬───────┘
//!                         ▼
//!        ┌─────────── RagPipeline ────────────┐
//!        │ Embedder → VectorIndex → Completer │
//!        │ (HF)       (Pinecone)    (HF)      │
//!        └────────────────────────────────────┘
//! ```
//!
//! Admins feed the index by uploading PDFs ([`ingest`]). The [`client`]
//! module is the front-end state machine that keeps a session list and
//! message thread in sync with the server.
//!
//! ## Quick Start
//!
//! ```bash
//! medicoz init                          # create database
//! medicoz ingest ./medical_data/book.pdf
//! medicoz token --user alice            # bearer token for testing
//! medicoz serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`models`] | Sessions, messages, turn targets |
//! | [`error`] | Error taxonomy |
//! | [`store`] | Session persistence |
//! | [`embedding`] | Remote embedding client |
//! | [`vector_store`] | Remote vector index client |
//! | [`completion`] | Remote completion client |
//! | [`retrieval`] | Context retrieval |
//! | [`generation`] | Grounded response generation |
//! | [`chat`] | Turn orchestration |
//! | [`accounts`] | Registration and password login |
//! | [`auth`] | Bearer JWT issuing and checking |
//! | [`server`] | HTTP API |
//! | [`ingest`] | PDF ingestion into the vector index |
//! | [`client`] | Client-side synchronization |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod accounts;
pub mod auth;
pub mod chat;
pub mod chunk;
pub mod client;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod vector_store;
