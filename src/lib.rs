//! # idsgame
//!
//! An attacker/defender intrusion game on a layered network graph, with
//! multi-agent PPO self-play training via the Burn ML framework.
//!
//! ## Modules
//!
//! - [`game`]: network topology, game state, actions, the two-player environment
//! - [`ai`]: policy traits, scripted baselines, the actor-critic network and PPO
//! - [`training`]: rollouts, opponent pools, schedules, metrics and the trainer
//! - [`checkpoint`]: versioned checkpoints with opponent pools and resume state
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: structured error types

#![recursion_limit = "256"]

pub mod ai;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod game;
pub mod training;
