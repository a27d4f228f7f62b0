//! # trial-analysis: Repeated-Measures Study Analysis
//!
//! **Version**: 0.2.0
//!
//! Analysis pipeline for a within-subject user study with three conditions:
//! per-trial JSON logs are assembled into a tidy table, joined with the
//! counterbalancing schedule, and run through non-parametric repeated-measures
//! statistics, normality diagnostics and a mixed-effects learning-curve model.
//! Results land in a multi-sheet workbook and annotated figures.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: integrity checks run over the raw files before any statistics
//! - **Poka-Yoke**: a degenerate test fails alone as a labeled `TestFailure`;
//!   sibling tests and measures still complete
//! - **Genchi Genbutsu**: every data-quality issue is logged and returned,
//!   never silently dropped
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trial_analysis::config::AnalysisConfig;
//! use trial_analysis::pipeline;
//!
//! let config = AnalysisConfig::builder("./data").build()?;
//! let summary = pipeline::run(&config)?;
//! println!(
//!     "{} of {} participants complete",
//!     summary.integrity.valid_participants, summary.integrity.total_participants
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod annotate;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod plot;
pub mod report;
pub mod stats;
pub mod trial;

pub use error::{Error, Result, TestFailure};
