//! Per-category stage ladder.
//!
//! Tiers only move forward. A still-broken attempt advances one tier, a
//! still-broken attempt at the last tier escalates, and an escalated
//! category accepts no further attempts until the user resets it.

use remedy_shared::{
    AttemptRecord, EscalationReason, EscalationTicket, StageState, Transition, Verdict,
    VerdictKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::StageConfig;

/// Decision for one verdict, before any ticket is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStep {
    Resolve,
    Advance(u8),
    Stay,
    Escalate,
}

/// Pure transition rule.
///
/// Blocked attempts never advance: the fix was not actually tried.
pub fn next_step(tier: u8, max_tier: u8, verdict: &Verdict) -> StageStep {
    if verdict.blocked {
        return StageStep::Stay;
    }
    match verdict.kind {
        VerdictKind::Fixed => StageStep::Resolve,
        VerdictKind::Inconclusive => StageStep::Stay,
        VerdictKind::StillBroken => {
            if tier >= max_tier {
                StageStep::Escalate
            } else {
                StageStep::Advance(tier + 1)
            }
        }
    }
}

/// Everything known about one category in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub state: StageState,
    #[serde(default)]
    pub history: Vec<AttemptRecord>,
    /// Commands refused by policy while working this category
    #[serde(default)]
    pub blocked_commands: Vec<String>,
    #[serde(default)]
    pub resolved: bool,
}

impl CategoryRecord {
    fn new() -> Self {
        Self {
            state: StageState::initial(),
            history: Vec::new(),
            blocked_commands: Vec::new(),
            resolved: false,
        }
    }

    /// Every command text attempted so far
    pub fn attempted_commands(&self) -> Vec<String> {
        self.history
            .iter()
            .flat_map(|a| a.commands.iter().cloned())
            .collect()
    }
}

/// Apply a step to a record that is not escalated
fn advance(
    record: &mut CategoryRecord,
    session_id: &str,
    category: &str,
    tier: u8,
    step: StageStep,
) -> Transition {
    match step {
        StageStep::Resolve => {
            record.resolved = true;
            Transition::Resolved { tier }
        }
        StageStep::Stay => Transition::Unchanged { tier },
        StageStep::Advance(to) => {
            record.state = StageState::Stage { tier: to };
            Transition::Advanced { from: tier, to }
        }
        StageStep::Escalate => {
            let ticket = Box::new(EscalationTicket::new(
                session_id,
                category,
                EscalationReason::TiersExhausted,
                tier,
                record.history.clone(),
                record.blocked_commands.clone(),
            ));
            record.state = StageState::Escalated {
                ticket: ticket.clone(),
            };
            Transition::Escalated { ticket }
        }
    }
}

/// Owns the stage state for every category in one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageManager {
    session_id: String,
    #[serde(skip)]
    config: StageConfig,
    categories: BTreeMap<String, CategoryRecord>,
}

impl StageManager {
    pub fn new(session_id: &str, config: StageConfig) -> Self {
        Self {
            session_id: session_id.to_string(),
            config,
            categories: BTreeMap::new(),
        }
    }

    /// Rebuild from persisted records
    pub fn restore(
        session_id: &str,
        config: StageConfig,
        categories: BTreeMap<String, CategoryRecord>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            config,
            categories,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn categories(&self) -> &BTreeMap<String, CategoryRecord> {
        &self.categories
    }

    pub fn record(&self, category: &str) -> Option<&CategoryRecord> {
        self.categories.get(category)
    }

    /// Current state; categories never seen start at tier 0
    pub fn state(&self, category: &str) -> StageState {
        self.categories
            .get(category)
            .map(|r| r.state.clone())
            .unwrap_or_else(StageState::initial)
    }

    pub fn is_escalated(&self, category: &str) -> bool {
        self.categories
            .get(category)
            .map(|r| r.state.is_escalated())
            .unwrap_or(false)
    }

    pub fn max_tier(&self, category: &str) -> u8 {
        self.config.max_tier_for(category)
    }

    fn entry(&mut self, category: &str) -> &mut CategoryRecord {
        self.categories
            .entry(category.to_string())
            .or_insert_with(CategoryRecord::new)
    }

    pub fn note_blocked(&mut self, category: &str, commands: impl IntoIterator<Item = String>) {
        let record = self.entry(category);
        for command in commands {
            if !record.blocked_commands.contains(&command) {
                record.blocked_commands.push(command);
            }
        }
    }

    /// Record an executed attempt and apply its verdict
    pub fn apply(&mut self, category: &str, attempt: AttemptRecord, verdict: &Verdict) -> Transition {
        let max_tier = self.max_tier(category);
        let session_id = self.session_id.clone();
        let record = self.entry(category);

        let tier = match &record.state {
            StageState::Stage { tier } => *tier,
            StageState::Escalated { ticket } => {
                warn!("Attempt recorded for escalated category '{}'", category);
                return Transition::Escalated {
                    ticket: ticket.clone(),
                };
            }
        };

        record.history.push(attempt);

        let transition = advance(record, &session_id, category, tier, next_step(tier, max_tier, verdict));
        info!("Stage '{}': {:?}", category, transition);
        transition
    }

    /// User's own answer to an inconclusive attempt. The attempt is
    /// already in the history, so only the state moves.
    pub fn apply_manual(&mut self, category: &str, fixed: bool) -> Transition {
        let max_tier = self.max_tier(category);
        let session_id = self.session_id.clone();
        let record = self.entry(category);

        let tier = match &record.state {
            StageState::Stage { tier } => *tier,
            StageState::Escalated { ticket } => {
                return Transition::Escalated {
                    ticket: ticket.clone(),
                }
            }
        };

        if let Some(last) = record.history.last_mut() {
            last.verdict = if fixed {
                VerdictKind::Fixed
            } else {
                VerdictKind::StillBroken
            };
        }

        let verdict = if fixed {
            Verdict::fixed("confirmed by user")
        } else {
            Verdict::still_broken("reported by user")
        };

        advance(record, &session_id, category, tier, next_step(tier, max_tier, &verdict))
    }

    /// Escalate because no allowed fix command could be planned
    pub fn escalate_no_commands(&mut self, category: &str) -> Transition {
        let session_id = self.session_id.clone();
        let record = self.entry(category);
        if let StageState::Escalated { ticket } = &record.state {
            return Transition::Escalated {
                ticket: ticket.clone(),
            };
        }
        let ticket = Box::new(EscalationTicket::new(
            &session_id,
            category,
            EscalationReason::NoAllowedCommands,
            record.state.tier(),
            record.history.clone(),
            record.blocked_commands.clone(),
        ));
        record.state = StageState::Escalated {
            ticket: ticket.clone(),
        };
        info!("Stage '{}': escalated, no allowed commands", category);
        Transition::Escalated { ticket }
    }

    /// Explicit user reset of a category. Returns false if it was unknown.
    pub fn reset(&mut self, category: &str) -> bool {
        let removed = self.categories.remove(category).is_some();
        if removed {
            info!("Stage '{}' reset by user", category);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(stage: u8, verdict: VerdictKind) -> AttemptRecord {
        AttemptRecord {
            stage,
            plan_id: format!("plan-{}", stage),
            commands: vec![format!("fix-{}", stage)],
            results: vec![],
            verdict,
        }
    }

    fn manager() -> StageManager {
        StageManager::new("session-1", StageConfig::default())
    }

    #[test]
    fn test_next_step_rules() {
        assert_eq!(next_step(0, 2, &Verdict::fixed("ok")), StageStep::Resolve);
        assert_eq!(next_step(0, 2, &Verdict::still_broken("x")), StageStep::Advance(1));
        assert_eq!(next_step(2, 2, &Verdict::still_broken("x")), StageStep::Escalate);
        assert_eq!(next_step(1, 2, &Verdict::inconclusive("x")), StageStep::Stay);
        assert_eq!(
            next_step(1, 2, &Verdict::still_broken("x").with_blocked(true)),
            StageStep::Stay
        );
    }

    #[test]
    fn test_ladder_escalates_after_max_tier() {
        let mut stages = manager();
        let broken = Verdict::still_broken("check failed");
        assert_eq!(
            stages.apply("wifi", attempt(0, VerdictKind::StillBroken), &broken),
            Transition::Advanced { from: 0, to: 1 }
        );
        assert_eq!(
            stages.apply("wifi", attempt(1, VerdictKind::StillBroken), &broken),
            Transition::Advanced { from: 1, to: 2 }
        );
        let last = stages.apply("wifi", attempt(2, VerdictKind::StillBroken), &broken);
        match last {
            Transition::Escalated { ticket } => {
                assert_eq!(ticket.final_stage, 2);
                assert_eq!(ticket.history.len(), 3);
                assert_eq!(ticket.reason, EscalationReason::TiersExhausted);
            }
            other => panic!("expected escalation, got {:?}", other),
        }
        assert!(stages.is_escalated("wifi"));
        assert!(!stages.is_escalated("bluetooth"));
    }

    #[test]
    fn test_escalated_accepts_no_attempts() {
        let mut stages = manager();
        stages.escalate_no_commands("printer");
        let transition = stages.apply(
            "printer",
            attempt(0, VerdictKind::Fixed),
            &Verdict::fixed("ok"),
        );
        assert!(matches!(transition, Transition::Escalated { .. }));
        assert!(stages.record("printer").unwrap().history.is_empty());
    }

    #[test]
    fn test_fixed_keeps_tier() {
        let mut stages = manager();
        stages.apply("wifi", attempt(0, VerdictKind::StillBroken), &Verdict::still_broken("x"));
        let t = stages.apply("wifi", attempt(1, VerdictKind::Fixed), &Verdict::fixed("ok"));
        assert_eq!(t, Transition::Resolved { tier: 1 });
        assert_eq!(stages.state("wifi").tier(), 1);
        assert!(stages.record("wifi").unwrap().resolved);
    }

    #[test]
    fn test_manual_outcome_updates_last_attempt() {
        let mut stages = manager();
        let t = stages.apply(
            "bluetooth",
            attempt(0, VerdictKind::Inconclusive),
            &Verdict::inconclusive("no check"),
        );
        assert_eq!(t, Transition::Unchanged { tier: 0 });
        let t = stages.apply_manual("bluetooth", false);
        assert_eq!(t, Transition::Advanced { from: 0, to: 1 });
        assert_eq!(
            stages.record("bluetooth").unwrap().history[0].verdict,
            VerdictKind::StillBroken
        );
    }

    #[test]
    fn test_per_category_max_tier() {
        let mut config = StageConfig::default();
        config.max_tier.insert("printer".into(), 0);
        let mut stages = StageManager::new("s", config);
        let t = stages.apply("printer", attempt(0, VerdictKind::StillBroken), &Verdict::still_broken("x"));
        assert!(matches!(t, Transition::Escalated { .. }));
    }

    #[test]
    fn test_reset_clears_category() {
        let mut stages = manager();
        stages.note_blocked("wifi", vec!["netsh winsock reset".to_string()]);
        stages.escalate_no_commands("wifi");
        assert!(stages.reset("wifi"));
        assert!(!stages.is_escalated("wifi"));
        assert_eq!(stages.state("wifi").tier(), 0);
        assert!(!stages.reset("wifi"));
    }

    #[test]
    fn test_no_commands_ticket_lists_blocked() {
        let mut stages = manager();
        stages.note_blocked("wifi", vec!["netsh winsock reset".to_string()]);
        stages.note_blocked("wifi", vec!["netsh winsock reset".to_string()]);
        match stages.escalate_no_commands("wifi") {
            Transition::Escalated { ticket } => {
                assert_eq!(ticket.reason, EscalationReason::NoAllowedCommands);
                assert_eq!(ticket.blocked_commands, vec!["netsh winsock reset"]);
            }
            other => panic!("expected escalation, got {:?}", other),
        }
    }
}
