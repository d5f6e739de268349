//! # PhDApply Core
//!
//! Everything behind an application run: the stage pipeline, the adaptive
//! paper gatherer, the writing stages and the tools they call.
//!
//! ## Architecture
//!
//! - `swarm/` - Coordinator, run context, stage contract and status events
//! - `gather/` - Budgeted, oracle-guided paper gathering
//! - `skills/` - The eight stages, their prompts and external tools
//! - `models/` - Centralized LLM provider configuration
//! - `config` - Budgets, timeouts and model selection
//! - `tools/` - Deterministic text and title helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use phdapply_core::config::CoordinatorConfig;
//! use phdapply_core::swarm::{ApplicationRequest, Coordinator};
//!
//! let coordinator = Coordinator::new(CoordinatorConfig::from_env());
//! let result = coordinator.run(request.validate()?).await;
//! ```

pub mod config;
pub mod error;
pub mod gather;
pub mod models;
pub mod skills;
pub mod swarm;
pub mod tools;
