//! Remedy engine - the diagnose, confirm, fix and verify pipeline.
//!
//! Components are wired by `orchestrator::Engine`; each one is usable on
//! its own for testing.

pub mod config;
pub mod executor;
pub mod gatekeeper;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod policy_gate;
pub mod proposer;
pub mod recipes;
pub mod research;
pub mod runner;
pub mod session_store;
pub mod stage_manager;
pub mod summary;
pub mod verifier;

pub use config::Config;
pub use executor::{ActionExecutor, Confirmation};
pub use gatekeeper::Gatekeeper;
pub use orchestrator::{Decision, Engine, PendingRound, Phase, Session, Step};
pub use planner::{PlanBuilder, PlanOutcome, PlanRequest};
pub use policy_gate::PolicyGate;
pub use proposer::{PlanProposer, Proposal, ProposalRequest, ProposedCommand};
pub use research::ResearchProvider;
pub use runner::{CommandRunner, RunOutcome};
pub use session_store::{SessionState, SessionStore};
pub use stage_manager::StageManager;
pub use verifier::Verifier;
