//! # aisquare-learning
//!
//! Scenario lifecycle services for three learning modes: problem-based
//! learning, career discovery, and assessment.
//!
//! A scenario is one user's engagement with a piece of source content. It
//! holds ordered programs of ordered tasks; every submission is scored into
//! an evaluation and completion cascades from tasks to programs to the
//! scenario. Storage sits behind repository traits (in-memory or Postgres
//! via sqlx), AI scoring behind [`ai::AiService`] (rig-core), and
//! observability goes through tracing and OpenTelemetry.

pub mod ai;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod llm;
pub mod model;
pub mod repository;
pub mod service;
pub mod telemetry;
