//! Plan Builder - turns a complaint plus research hints into a plan.
//!
//! The first round is diagnostic and read-only. Later rounds either
//! answer from the diagnostic output or build a fix plan for the active
//! category and tier. Every candidate goes through the policy gate here;
//! refused candidates are reported, never planned.

use remedy_shared::{
    Command, ExecutionResult, Plan, PlanKind, PolicyDecision, ResearchHints, Result,
};
use tracing::{debug, info, warn};

use crate::config::VerificationCheck;
use crate::policy_gate::PolicyGate;
use crate::proposer::{
    is_system_info_query, PlanProposer, Proposal, ProposalRequest, CHITCHAT_CATEGORY,
    SYSTEM_INFO_CATEGORY,
};
use crate::summary::{extract_answer, format_kb_steps};

/// Output of the diagnostic round that a fix round builds on
#[derive(Debug, Clone)]
pub struct PriorRound {
    pub results: Vec<ExecutionResult>,
    pub findings: String,
}

/// Inputs for one planning round
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub issue: &'a str,
    pub category: &'a str,
    pub stage: u8,
    pub hints: &'a ResearchHints,
    pub prior: Option<&'a PriorRound>,
    /// Commands already attempted or refused for this category
    pub avoid: Vec<String>,
}

/// What the builder produced
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Ready {
        plan: Plan,
        /// Candidates the gate refused
        blocked: Vec<PolicyDecision>,
        /// Mutating candidates dropped from a diagnostic round
        dropped: Vec<String>,
        /// Whether the one alternative regeneration was used
        regenerated: bool,
    },
    /// Every mutating candidate was refused, even after regeneration
    NoAllowedCommands { blocked: Vec<PolicyDecision> },
}

/// Gate-filtered candidates
struct Screened {
    allowed: Vec<Command>,
    blocked: Vec<PolicyDecision>,
}

fn screen(gate: &PolicyGate, commands: Vec<Command>) -> Screened {
    let mut allowed = Vec::new();
    let mut blocked = Vec::new();
    for command in commands {
        let decision = gate.evaluate(&command.text);
        if decision.permits_execution() {
            allowed.push(command);
        } else {
            info!("Plan candidate refused: {} ({})", command.text, decision.reason());
            blocked.push(decision);
        }
    }
    Screened { allowed, blocked }
}

fn to_commands(proposal: &Proposal, category: Option<&str>) -> Vec<Command> {
    proposal
        .commands
        .iter()
        .map(|p| {
            let command = Command::new(&p.command).with_description(&p.description);
            match category {
                Some(c) => command.with_category(c),
                None => command,
            }
        })
        .filter(|c| !c.is_empty())
        .collect()
}

pub struct PlanBuilder<'a> {
    proposer: &'a dyn PlanProposer,
    gate: &'a PolicyGate,
    verification: &'a [VerificationCheck],
    sop_threshold: f32,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(
        proposer: &'a dyn PlanProposer,
        gate: &'a PolicyGate,
        verification: &'a [VerificationCheck],
        sop_threshold: f32,
    ) -> Self {
        Self {
            proposer,
            gate,
            verification,
            sop_threshold,
        }
    }

    pub async fn build_plan(&self, request: &PlanRequest<'_>) -> Result<PlanOutcome> {
        match request.prior {
            None => self.build_diagnostic(request).await,
            Some(prior) => self.build_fix(request, prior).await,
        }
    }

    fn proposal_request(&self, request: &PlanRequest<'_>, kind: PlanKind) -> ProposalRequest {
        let base = match (kind, request.prior) {
            (PlanKind::Fix, Some(prior)) => ProposalRequest::fix(
                request.issue,
                request.category,
                request.stage,
                &prior.findings,
            ),
            _ => ProposalRequest::diagnostic(request.issue, request.category),
        };
        base.with_research(
            request.hints.sop(self.sop_threshold).cloned(),
            request.hints.web_hints.clone(),
        )
        .with_avoid(request.avoid.clone())
    }

    async fn build_diagnostic(&self, request: &PlanRequest<'_>) -> Result<PlanOutcome> {
        let proposal = self
            .proposer
            .propose(&self.proposal_request(request, PlanKind::Diagnostic))
            .await?;

        let category = Some(request.category.to_string());
        let mut dropped = Vec::new();
        let commands: Vec<Command> = to_commands(&proposal, None)
            .into_iter()
            .filter(|c| {
                if c.is_mutating() {
                    warn!("Dropping mutating command from diagnostic round: {}", c.text);
                    dropped.push(c.text.clone());
                    false
                } else {
                    true
                }
            })
            .collect();

        if commands.is_empty() {
            let text = if proposal.summary.is_empty() {
                if request.category == CHITCHAT_CATEGORY {
                    "Hi! How can I help you with your Windows issue today?".to_string()
                } else {
                    "No diagnostic checks apply to this request.".to_string()
                }
            } else {
                proposal.summary.clone()
            };
            return Ok(PlanOutcome::Ready {
                plan: Plan::answer(text, category, request.stage),
                blocked: Vec::new(),
                dropped,
                regenerated: false,
            });
        }

        let screened = screen(self.gate, commands);
        if screened.allowed.is_empty() {
            warn!("Every diagnostic command was refused by policy");
            let plan = Plan::answer(
                "None of the diagnostic checks for this issue are permitted by the command policy.",
                category,
                request.stage,
            );
            return Ok(PlanOutcome::Ready {
                plan,
                blocked: screened.blocked,
                dropped,
                regenerated: false,
            });
        }

        let summary = if proposal.summary.is_empty() {
            "Generated read-only diagnostic checks.".to_string()
        } else {
            proposal.summary
        };
        let plan = Plan::new(
            PlanKind::Diagnostic,
            summary,
            screened.allowed,
            category,
            request.stage,
        );
        info!(
            "Diagnostic plan {} with {} commands ({} refused)",
            plan.id(),
            plan.commands().len(),
            screened.blocked.len()
        );
        Ok(PlanOutcome::Ready {
            plan,
            blocked: screened.blocked,
            dropped,
            regenerated: false,
        })
    }

    /// Textual answer for a fix round with no commands
    fn answer_text(&self, request: &PlanRequest<'_>, proposal: &Proposal) -> String {
        if let Some(sop) = request.hints.sop(self.sop_threshold) {
            let steps = format_kb_steps(sop);
            if proposal.summary.is_empty() {
                return steps;
            }
            return format!("{}\n\n{}", proposal.summary, steps);
        }
        if !proposal.summary.is_empty() {
            return proposal.summary.clone();
        }
        "No automatic fix is known for this issue.".to_string()
    }

    /// Candidates for this tier with earlier mutating attempts removed
    fn fix_candidates(&self, request: &PlanRequest<'_>, proposal: &Proposal) -> Vec<Command> {
        to_commands(proposal, Some(request.category))
            .into_iter()
            .filter(|c| {
                let repeat = c.is_mutating()
                    && request
                        .avoid
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(&c.text));
                if repeat {
                    debug!("Skipping repeated fix command: {}", c.text);
                }
                !repeat
            })
            .collect()
    }

    async fn build_fix(&self, request: &PlanRequest<'_>, prior: &PriorRound) -> Result<PlanOutcome> {
        let category = Some(request.category.to_string());

        if request.category == SYSTEM_INFO_CATEGORY || is_system_info_query(request.issue) {
            if let Some(answer) = extract_answer(request.issue, &prior.results) {
                info!("Answered from diagnostics");
                return Ok(PlanOutcome::Ready {
                    plan: Plan::answer(answer, category, request.stage),
                    blocked: Vec::new(),
                    dropped: Vec::new(),
                    regenerated: false,
                });
            }
        }

        let proposal = self
            .proposer
            .propose(&self.proposal_request(request, PlanKind::Fix))
            .await?;

        if proposal.commands.is_empty() {
            if request.stage > 0 {
                info!(
                    "No further fix commands for '{}' at stage {}",
                    request.category, request.stage
                );
                return Ok(PlanOutcome::NoAllowedCommands {
                    blocked: Vec::new(),
                });
            }
            return Ok(PlanOutcome::Ready {
                plan: Plan::answer(self.answer_text(request, &proposal), category, request.stage),
                blocked: Vec::new(),
                dropped: Vec::new(),
                regenerated: false,
            });
        }

        let mut screened = screen(self.gate, self.fix_candidates(request, &proposal));
        let mut summary = proposal.summary;
        let mut regenerated = false;

        if !screened.allowed.iter().any(|c| c.is_mutating()) {
            regenerated = true;
            let mut avoid = request.avoid.clone();
            avoid.extend(screened.blocked.iter().map(|d| d.command.clone()));
            info!(
                "No allowed fix command for '{}', requesting alternatives (avoiding {})",
                request.category,
                avoid.len()
            );
            let retry_request = PlanRequest {
                avoid,
                ..request.clone()
            };
            let retry = self
                .proposer
                .propose(&self.proposal_request(&retry_request, PlanKind::Fix))
                .await?;
            let retry_screened = screen(self.gate, self.fix_candidates(&retry_request, &retry));

            let mut blocked = screened.blocked;
            blocked.extend(retry_screened.blocked);

            if !retry_screened.allowed.iter().any(|c| c.is_mutating()) {
                warn!("No allowed fix commands for '{}'", request.category);
                return Ok(PlanOutcome::NoAllowedCommands { blocked });
            }
            screened = Screened {
                allowed: retry_screened.allowed,
                blocked,
            };
            summary = retry.summary;
        }

        if summary.is_empty() {
            summary = "Proposed fix script ready.".to_string();
        }

        let mut plan = Plan::new(
            PlanKind::Fix,
            summary,
            screened.allowed,
            category,
            request.stage,
        );

        if let Some(check) = self.verification.iter().find(|v| v.category == request.category) {
            let verify_cmd = Command::new(&check.command)
                .with_category(request.category)
                .with_description("Verify the fix");
            let decision = self.gate.evaluate(&verify_cmd.text);
            if decision.permits_execution() {
                plan = plan.with_verification(verify_cmd);
            } else {
                warn!("Verification command refused by policy: {}", verify_cmd.text);
                screened.blocked.push(decision);
            }
        }

        info!(
            "Fix plan {} for '{}' stage {}: {} commands{}",
            plan.id(),
            request.category,
            request.stage,
            plan.commands().len(),
            if plan.verification().is_some() {
                " + check"
            } else {
                ""
            }
        );

        Ok(PlanOutcome::Ready {
            plan,
            blocked: screened.blocked,
            dropped: Vec::new(),
            regenerated,
        })
    }
}
