//! Client Follow-up API Library
//!
//! Scores coworking clients from their reservation history, picks an outreach
//! strategy, renders the message and dispatches it by email, SMS or push.
//!
//! # Modules
//!
//! - `api`: API-layer namespace (handlers, auth).
//! - `core`: Domain-layer namespace (insights, strategies, content, workflow).
//! - `integrations`: External collaborators (channel senders, storage).
//! - `auth`: Admin API key validation.
//! - `channels`: Email, SMS and push senders.
//! - `circuit_breaker`: Circuit breaker for channel providers.
//! - `config`: Configuration management.
//! - `content`: Message templates per strategy.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Reservation history source and follow-up store.
//! - `dispatch`: Contact gate and channel choice.
//! - `errors`: Error handling types.
//! - `followup`: Follow-up workflow (single client, batch, send, stats).
//! - `handlers`: HTTP request handlers.
//! - `insights`: Risk / engagement metric calculation.
//! - `models`: Core data models.
//! - `strategies`: Strategy catalog and selection rules.
//! - `validation`: Email and phone validation.

pub mod api;
pub mod core;
pub mod integrations;

pub mod auth;
pub mod channels;
pub mod circuit_breaker;
pub mod config;
pub mod content;
pub mod db;
pub mod db_storage;
pub mod dispatch;
pub mod errors;
pub mod followup;
pub mod handlers;
pub mod insights;
pub mod models;
pub mod strategies;
pub mod validation;
