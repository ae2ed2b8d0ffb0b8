//! Round orchestrator.
//!
//! A fixed state machine driven by the caller:
//!
//! ```text
//! submit ─► plan ─► gate ─► [Confirm] ─► resolve ─► execute ─► verify ─► stage
//!                                │                                         │
//!                             decline                  next tier ◄─────────┤
//!                                ▼                                         ▼
//!                              Done                          Done / ManualCheck
//! ```
//!
//! Each call performs at most one execution and returns at the next
//! point that needs the user. Nothing runs without a `Confirmation`
//! built from the pending plan the user just approved.

use anyhow::Context;
use chrono::Utc;
use remedy_shared::{
    AttemptRecord, ExecutionOutcome, ExecutionResult, Plan, PlanKind, PolicyDecision,
    RemedyError, ResearchHints, Response, Result, Transition,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::executor::{ActionExecutor, Confirmation};
use crate::gatekeeper::{sources_from_hints, Draft, Gatekeeper};
use crate::llm::ChatProposer;
use crate::planner::{PlanBuilder, PlanOutcome, PlanRequest, PriorRound};
use crate::policy_gate::PolicyGate;
use crate::proposer::{classify_by_keywords, normalize_category, PlanProposer};
use crate::recipes::RecipeProposer;
use crate::research::{extract_keywords, web_query, NoResearch, ResearchProvider, StaticResearch};
use crate::runner::{CommandRunner, ShellRunner};
use crate::session_store::SessionState;
use crate::stage_manager::StageManager;
use crate::summary::{diagnosis_summary, fix_summary};
use crate::verifier::Verifier;

/// Where a session is in the round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingConfirmation { plan_id: String },
    AwaitingManualCheck { category: String },
}

/// User's answer at the confirmation checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Decline,
}

/// A plan waiting for the user's decision
#[derive(Debug, Clone)]
pub struct PendingRound {
    plan: Plan,
    blocked: Vec<PolicyDecision>,
    response: Response,
}

impl PendingRound {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn blocked(&self) -> &[PolicyDecision] {
        &self.blocked
    }

    pub fn response(&self) -> &Response {
        &self.response
    }
}

/// What the caller must do next
#[derive(Debug, Clone)]
pub enum Step {
    /// Show the plan and ask yes/no
    Confirm(PendingRound),
    /// Verification was inconclusive; ask whether the problem is gone
    ManualCheck(Response),
    /// Round finished
    Done(Response),
}

impl Step {
    pub fn response(&self) -> &Response {
        match self {
            Step::Confirm(pending) => pending.response(),
            Step::ManualCheck(response) | Step::Done(response) => response,
        }
    }
}

/// Per-user session: stage state plus the current round's context
pub struct Session {
    id: String,
    policy: Arc<PolicyGate>,
    stages: StageManager,
    phase: Phase,
    issue: String,
    category: String,
    hints: ResearchHints,
    diagnosis: Option<PriorRound>,
    /// Set once a blocked fix attempt has been re-planned
    policy_retry_used: bool,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn stages(&self) -> &StageManager {
        &self.stages
    }

    pub fn category(&self) -> Option<&str> {
        if self.category.is_empty() {
            None
        } else {
            Some(&self.category)
        }
    }

    /// Explicit user reset of one category
    pub fn reset_category(&mut self, category: &str) -> bool {
        if self.category == category {
            self.phase = Phase::Idle;
        }
        self.stages.reset(category)
    }

    pub fn snapshot(&self) -> SessionState {
        SessionState {
            session_id: self.id.clone(),
            categories: self.stages.categories().clone(),
            updated_at: Utc::now(),
        }
    }
}

/// The pipeline with its collaborators
pub struct Engine {
    config: Config,
    policy: Arc<PolicyGate>,
    proposer: Box<dyn PlanProposer>,
    research: Box<dyn ResearchProvider>,
    runner: Box<dyn CommandRunner>,
    verifier: Verifier,
    gatekeeper: Gatekeeper,
}

impl Engine {
    pub fn new(
        config: Config,
        policy: Arc<PolicyGate>,
        proposer: Box<dyn PlanProposer>,
        research: Box<dyn ResearchProvider>,
        runner: Box<dyn CommandRunner>,
    ) -> anyhow::Result<Self> {
        let verifier = Verifier::new(&config.verification)?;
        let gatekeeper = Gatekeeper::new(&config.gatekeeper);
        Ok(Self {
            config,
            policy,
            proposer,
            research,
            runner,
            verifier,
            gatekeeper,
        })
    }

    /// Wire default collaborators from config: chat proposer when an API
    /// key is set (recipes otherwise), hints file research, shell runner.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let policy = Arc::new(PolicyGate::from_config(&config.policy)?);

        let proposer: Box<dyn PlanProposer> = match ChatProposer::from_config(&config.llm) {
            Some(chat) => Box::new(chat),
            None => {
                info!("No LLM API key, using built-in recipes");
                Box::new(RecipeProposer::new())
            }
        };

        let research: Box<dyn ResearchProvider> = match &config.research.hints_file {
            Some(path) => Box::new(
                StaticResearch::from_file(path).context("Failed to load research hints")?,
            ),
            None => Box::new(NoResearch),
        };

        let runner = Box::new(ShellRunner::from_config(&config.execution));
        Self::new(config, policy, proposer, research, runner)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self) -> &PolicyGate {
        &self.policy
    }

    pub fn start_session(&self) -> Session {
        let id = uuid::Uuid::new_v4().to_string();
        info!("Session {} started", id);
        let stages = StageManager::new(&id, self.config.stages.clone());
        self.session_with(id, stages)
    }

    pub fn resume_session(&self, state: SessionState) -> Session {
        let stages = StageManager::restore(
            &state.session_id,
            self.config.stages.clone(),
            state.categories,
        );
        self.session_with(state.session_id, stages)
    }

    fn session_with(&self, id: String, stages: StageManager) -> Session {
        Session {
            id,
            policy: Arc::clone(&self.policy),
            stages,
            phase: Phase::Idle,
            issue: String::new(),
            category: String::new(),
            hints: ResearchHints::default(),
            diagnosis: None,
            policy_retry_used: false,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.execution.command_timeout_secs)
    }

    fn sop_threshold(&self) -> f32 {
        self.config.research.sop_score_threshold
    }

    fn finalize(&self, session: &Session, draft: Draft) -> Response {
        self.gatekeeper
            .finalize(draft, sources_from_hints(&session.hints, self.sop_threshold()))
    }

    fn done(&self, session: &mut Session, text: impl Into<String>) -> Step {
        session.phase = Phase::Idle;
        let tier = session.stages.state(&session.category).tier();
        let category = session.category().map(|c| c.to_string());
        Step::Done(self.finalize(session, Draft::message(text, category, tier)))
    }

    fn pending(
        &self,
        session: &mut Session,
        plan: Plan,
        blocked: Vec<PolicyDecision>,
        text: String,
    ) -> Step {
        session.phase = Phase::AwaitingConfirmation {
            plan_id: plan.id().to_string(),
        };
        let response = self.finalize(session, Draft::proposal(&plan, text));
        Step::Confirm(PendingRound {
            plan,
            blocked,
            response,
        })
    }

    /// Start a round for a new complaint
    pub async fn submit(&self, session: &mut Session, query: &str) -> Result<Step> {
        if let Phase::AwaitingConfirmation { plan_id } = &session.phase {
            info!("New query while plan {} was pending; dropping it", plan_id);
        }
        session.phase = Phase::Idle;

        let category = match self.proposer.classify(query).await {
            Some(label) => normalize_category(&label),
            None => classify_by_keywords(query),
        };
        info!("Query classified as '{}'", category);

        session.issue = query.trim().to_string();
        session.category = category.clone();
        session.diagnosis = None;
        session.policy_retry_used = false;

        if let Some(ticket) = session.stages.state(&category).ticket() {
            info!("Category '{}' already escalated ({})", category, ticket.ticket_id);
            session.hints = ResearchHints::default();
            let draft = Draft::escalation(
                ticket,
                Some("This problem was already handed to a technician in this session."),
            );
            return Ok(Step::Done(self.finalize(session, draft)));
        }

        let keywords = extract_keywords(query);
        let query_for_web = web_query(query, &self.config.research.web_query_suffix);
        session.hints = self
            .research
            .lookup(&session.issue, &query_for_web, &keywords)
            .await;

        let tier = session.stages.state(&category).tier();
        let builder = PlanBuilder::new(
            self.proposer.as_ref(),
            &session.policy,
            &self.config.verification,
            self.sop_threshold(),
        );
        let request = PlanRequest {
            issue: &session.issue,
            category: &category,
            stage: tier,
            hints: &session.hints,
            prior: None,
            avoid: Vec::new(),
        };

        let outcome = builder.build_plan(&request).await?;

        match outcome {
            PlanOutcome::Ready { plan, blocked, .. } => {
                if plan.kind() == PlanKind::Answer {
                    let text = blocked_note(plan.summary(), &blocked);
                    return Ok(self.done(session, text));
                }
                let text = blocked_note(
                    &format!("Diagnostic checks: {}", plan.summary()),
                    &blocked,
                );
                Ok(self.pending(session, plan, blocked, text))
            }
            PlanOutcome::NoAllowedCommands { blocked } => {
                // Diagnostic rounds always come back Ready; keep the gate's
                // answer if a proposer ever changes that.
                Ok(self.done(
                    session,
                    blocked_note("No diagnostic checks could be planned.", &blocked),
                ))
            }
        }
    }

    /// Apply the user's decision on the pending plan
    pub async fn resolve(
        &self,
        session: &mut Session,
        pending: PendingRound,
        decision: Decision,
    ) -> Result<Step> {
        match &session.phase {
            Phase::AwaitingConfirmation { plan_id } if plan_id == pending.plan.id() => {}
            _ => {
                warn!("Plan {} is not awaiting confirmation", pending.plan.id());
                return Err(RemedyError::ConfirmationMissing {
                    plan_id: pending.plan.id().to_string(),
                });
            }
        }

        if decision == Decision::Decline {
            info!("User declined plan {}", pending.plan.id());
            return Ok(self.done(session, "Cancelled. Nothing was run."));
        }

        let confirmation = Confirmation::grant(&pending.plan);
        let executor = ActionExecutor::new(&session.policy, self.runner.as_ref(), self.timeout());
        let results = executor.execute(&pending.plan, &confirmation).await?;
        session.phase = Phase::Idle;

        match pending.plan.kind() {
            PlanKind::Diagnostic => {
                let summary = diagnosis_summary(
                    &session.category,
                    &results,
                    &session.hints,
                    self.sop_threshold(),
                );
                let category = session.category.clone();
                session
                    .stages
                    .note_blocked(&category, summary.blocked_commands.iter().cloned());
                let preface = format!("{}\n{}", summary.findings, summary.steps.join("\n"));
                session.diagnosis = Some(PriorRound {
                    results,
                    findings: summary.findings,
                });
                self.plan_fix(session, preface).await
            }
            PlanKind::Fix => self.after_fix(session, &pending.plan, results).await,
            PlanKind::Answer => Ok(self.done(session, pending.plan.summary().to_string())),
        }
    }

    /// The user's answer after an inconclusive verification
    pub async fn report_manual_outcome(&self, session: &mut Session, fixed: bool) -> Result<Step> {
        let category = match &session.phase {
            Phase::AwaitingManualCheck { category } => category.clone(),
            _ => return Ok(self.done(session, "Nothing is waiting for your confirmation.")),
        };
        session.phase = Phase::Idle;
        info!("User reports '{}' {}", category, if fixed { "fixed" } else { "still broken" });

        let transition = session.stages.apply_manual(&category, fixed);
        let text = if fixed {
            "Thanks for confirming the problem is resolved.".to_string()
        } else {
            "Understood, the problem persists.".to_string()
        };
        self.handle_transition(session, transition, text).await
    }

    async fn after_fix(
        &self,
        session: &mut Session,
        plan: &Plan,
        results: Vec<ExecutionResult>,
    ) -> Result<Step> {
        let category = session.category.clone();
        let verdict = self.verifier.verify(&category, &results);

        let blocked: Vec<String> = results
            .iter()
            .filter(|r| r.outcome == ExecutionOutcome::Blocked)
            .map(|r| r.command.clone())
            .collect();
        session.stages.note_blocked(&category, blocked.iter().cloned());
        let halted = results
            .iter()
            .filter(|r| r.outcome != ExecutionOutcome::Blocked)
            .find_map(ExecutionResult::halt_error);

        let summary = fix_summary(&category, plan.stage(), &verdict, &results);
        let attempt = AttemptRecord {
            stage: plan.stage(),
            plan_id: plan.id().to_string(),
            commands: plan.all_commands().map(|c| c.text.clone()).collect(),
            results,
            verdict: verdict.kind,
        };
        let transition = session.stages.apply(&category, attempt, &verdict);
        let mut text = format!("{}\n{}", summary.text, summary.steps.join("\n"));
        if let Some(err) = halted {
            warn!("Fix round for '{}' stopped early: {}", category, err);
            text.push_str(&format!("\nStopped early: {}", err));
        }

        // The planner screens with this same gate, so a refusal here means
        // the plan and the gate disagree. Re-plan once, then stop.
        if verdict.blocked {
            let violation = RemedyError::PolicyViolation {
                command: blocked.join(", "),
                verdict: "denied".to_string(),
            };
            warn!("{}", violation);
            if session.policy_retry_used {
                return Ok(self.done(session, format!("{}\n\n{}", text, violation)));
            }
            session.policy_retry_used = true;
            return self.plan_fix(session, text).await;
        }
        session.policy_retry_used = false;

        self.handle_transition(session, transition, text).await
    }

    async fn handle_transition(
        &self,
        session: &mut Session,
        transition: Transition,
        text: String,
    ) -> Result<Step> {
        match transition {
            Transition::Resolved { tier } => {
                info!("'{}' resolved at stage {}", session.category, tier);
                Ok(self.done(session, text))
            }
            Transition::Advanced { from, to } => {
                info!("'{}' advanced from stage {} to {}", session.category, from, to);
                self.plan_fix(session, text).await
            }
            Transition::Escalated { ticket } => {
                warn!("'{}' escalated: {}", session.category, ticket.ticket_id);
                session.phase = Phase::Idle;
                Ok(Step::Done(
                    self.finalize(session, Draft::escalation(&ticket, Some(&text))),
                ))
            }
            Transition::Unchanged { tier } => {
                let err = RemedyError::VerificationInconclusive {
                    category: session.category.clone(),
                    reason: format!("stage {} needs manual confirmation", tier),
                };
                info!("{}", err);
                session.phase = Phase::AwaitingManualCheck {
                    category: session.category.clone(),
                };
                let category = session.category().map(|c| c.to_string());
                Ok(Step::ManualCheck(
                    self.finalize(session, Draft::message(text, category, tier)),
                ))
            }
        }
    }

    /// Build the fix plan for the session's category at its current tier
    async fn plan_fix(&self, session: &mut Session, preface: String) -> Result<Step> {
        let category = session.category.clone();
        let Some(prior) = session.diagnosis.clone() else {
            return Ok(self.done(session, preface));
        };

        let tier = session.stages.state(&category).tier();
        let avoid = session
            .stages
            .record(&category)
            .map(|r| {
                let mut avoid = r.attempted_commands();
                avoid.extend(r.blocked_commands.iter().cloned());
                avoid
            })
            .unwrap_or_default();

        let builder = PlanBuilder::new(
            self.proposer.as_ref(),
            &session.policy,
            &self.config.verification,
            self.sop_threshold(),
        );
        let request = PlanRequest {
            issue: &session.issue,
            category: &category,
            stage: tier,
            hints: &session.hints,
            prior: Some(&prior),
            avoid,
        };
        let outcome = builder.build_plan(&request).await?;

        match outcome {
            PlanOutcome::NoAllowedCommands { blocked } => {
                session
                    .stages
                    .note_blocked(&category, blocked.iter().map(|d| d.command.clone()));
                let transition = session.stages.escalate_no_commands(&category);
                let err = RemedyError::EscalationRequired {
                    category: category.clone(),
                    reason: "no allowed fix commands".to_string(),
                };
                warn!("{}", err);
                match transition {
                    Transition::Escalated { ticket } => {
                        session.phase = Phase::Idle;
                        Ok(Step::Done(self.finalize(
                            session,
                            Draft::escalation(&ticket, Some(&blocked_note(&preface, &blocked))),
                        )))
                    }
                    _ => Ok(self.done(session, preface)),
                }
            }
            PlanOutcome::Ready { plan, blocked, .. } => {
                session
                    .stages
                    .note_blocked(&category, blocked.iter().map(|d| d.command.clone()));
                if plan.kind() == PlanKind::Answer {
                    let text = format!("{}\n\n{}", preface, plan.summary());
                    return Ok(self.done(session, blocked_note(&text, &blocked)));
                }
                let text = blocked_note(
                    &format!(
                        "{}\n\nProposed fix (stage {}): {}",
                        preface,
                        plan.stage(),
                        plan.summary()
                    ),
                    &blocked,
                );
                Ok(self.pending(session, plan, blocked, text))
            }
        }
    }
}

/// Append the refused commands to a message
fn blocked_note(text: &str, blocked: &[PolicyDecision]) -> String {
    if blocked.is_empty() {
        return text.to_string();
    }
    let lines: Vec<String> = blocked
        .iter()
        .map(|d| format!("- {} ({})", d.command, d.reason()))
        .collect();
    format!("{}\n\nSkipped by policy:\n{}", text, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunOutcome;
    use async_trait::async_trait;
    use remedy_shared::{Command, RawOutput};

    struct QuietRunner;

    #[async_trait]
    impl CommandRunner for QuietRunner {
        async fn run(&self, _command: &str, _timeout: Duration) -> RunOutcome {
            RunOutcome::Completed(RawOutput::default())
        }
    }

    fn engine() -> Engine {
        let gate = PolicyGate::from_rules(
            &["get-*", "format-list *", "disable-netadapter *", "enable-netadapter *"],
            &[],
        )
        .unwrap();
        Engine::new(
            Config::default(),
            Arc::new(gate),
            Box::new(RecipeProposer::new()),
            Box::new(NoResearch),
            Box::new(QuietRunner),
        )
        .unwrap()
    }

    fn wifi_session(engine: &Engine) -> Session {
        let mut session = engine.start_session();
        session.issue = "wifi drops".into();
        session.category = "wifi".into();
        session.diagnosis = Some(PriorRound {
            results: Vec::new(),
            findings: String::new(),
        });
        session
    }

    #[tokio::test]
    async fn test_refused_fix_replans_once_then_stops() {
        let engine = engine();
        let mut session = wifi_session(&engine);
        let plan = Plan::new(
            PlanKind::Fix,
            "Restart the adapter",
            vec![Command::new("Restart-NetAdapter -Name Wi-Fi")],
            Some("wifi".into()),
            0,
        );
        let refused =
            || vec![ExecutionResult::blocked("Restart-NetAdapter -Name Wi-Fi", "not on the allowlist")];

        let step = engine.after_fix(&mut session, &plan, refused()).await.unwrap();
        let Step::Confirm(pending) = step else {
            panic!("expected a re-planned round");
        };
        assert!(pending
            .plan()
            .commands()
            .iter()
            .all(|c| !c.text.starts_with("Restart-NetAdapter")));
        assert_eq!(session.stages.state("wifi").tier(), 0);
        assert!(session.policy_retry_used);

        let step = engine.after_fix(&mut session, &plan, refused()).await.unwrap();
        let Step::Done(response) = step else {
            panic!("expected the round to stop");
        };
        assert!(response.diagnosis_or_fix.contains("Policy violation"));
        assert_eq!(session.phase, Phase::Idle);
        assert_eq!(session.stages.state("wifi").tier(), 0);
    }
}
