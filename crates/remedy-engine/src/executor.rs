//! Action Executor - runs a confirmed plan, one command at a time

use remedy_shared::{ExecutionResult, Plan, PlanKind, RemedyError, Result};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::policy_gate::PolicyGate;
use crate::runner::{CommandRunner, RunOutcome};

/// Proof that the user approved one specific plan.
///
/// Only the interactive driver creates these, and only after a yes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    plan_id: String,
}

impl Confirmation {
    pub fn grant(plan: &Plan) -> Self {
        info!("User confirmed plan {}", plan.id());
        Self {
            plan_id: plan.id().to_string(),
        }
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn covers(&self, plan: &Plan) -> bool {
        self.plan_id == plan.id()
    }
}

/// Executes confirmed plans against a runner
pub struct ActionExecutor<'a> {
    gate: &'a PolicyGate,
    runner: &'a dyn CommandRunner,
    timeout: Duration,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(gate: &'a PolicyGate, runner: &'a dyn CommandRunner, timeout: Duration) -> Self {
        Self {
            gate,
            runner,
            timeout,
        }
    }

    /// Run every command in plan order, verification last.
    ///
    /// Stops at the first command that does not succeed. Results cover
    /// exactly the commands that were attempted or refused.
    pub async fn execute(
        &self,
        plan: &Plan,
        confirmation: &Confirmation,
    ) -> Result<Vec<ExecutionResult>> {
        if !confirmation.covers(plan) {
            error!(
                "Confirmation for {} presented for plan {}",
                confirmation.plan_id(),
                plan.id()
            );
            return Err(RemedyError::ConfirmationMissing {
                plan_id: plan.id().to_string(),
            });
        }

        if plan.kind() == PlanKind::Answer {
            return Ok(Vec::new());
        }

        info!(
            "Executing {} plan {} ({} commands)",
            plan.kind(),
            plan.id(),
            plan.commands().len()
        );

        let mut results = Vec::new();

        for (index, command) in plan.all_commands().enumerate() {
            let is_check = index >= plan.commands().len();

            let decision = self.gate.evaluate(&command.text);
            if !decision.permits_execution() {
                warn!("BLOCKED: {} ({})", command.text, decision.reason());
                results.push(ExecutionResult::blocked(&command.text, &decision.reason()));
                break;
            }

            let result = match self.runner.run(&command.text, self.timeout).await {
                RunOutcome::Completed(output) => ExecutionResult::from_output(&command.text, output),
                RunOutcome::TimedOut { elapsed_ms } => {
                    ExecutionResult::timed_out(&command.text, elapsed_ms)
                }
                RunOutcome::SpawnFailed(e) => ExecutionResult::spawn_failed(&command.text, &e),
            };
            let result = if is_check {
                result.as_verification()
            } else {
                result
            };

            let halt = result.halt_error();
            results.push(result);
            if let Some(err) = halt {
                warn!("{} (halting plan)", err);
                break;
            }
        }

        Ok(results)
    }
}
