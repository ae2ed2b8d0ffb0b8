//! End-to-end pipeline tests
//!
//! Drives `Engine` through full rounds with a scripted proposer and a
//! recording runner. Nothing touches a real shell.

use async_trait::async_trait;
use remedy_engine::config::{Config, VerificationCheck};
use remedy_engine::proposer::{PlanProposer, Proposal, ProposalRequest, ProposedCommand};
use remedy_engine::research::{NoResearch, ResearchProvider};
use remedy_engine::runner::{CommandRunner, RunOutcome};
use remedy_engine::{Decision, Engine, PendingRound, Phase, PolicyGate, Step};
use remedy_shared::{
    EscalationReason, KbMatch, PlanKind, RawOutput, RemedyError, ResearchHints, SourceKind,
    StageState, VerdictKind,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const VERIFY_CMD: &str = "Get-NetConnectionProfile";
const HEALTHY: &str = "IPv4Connectivity : Internet";
const BROKEN: &str = "IPv4Connectivity : Disconnected";

// ============================================================================
// Test doubles
// ============================================================================

/// Proposer with a fixed diagnostic set and one fix set per stage
struct ScriptedProposer {
    diagnostics: Vec<&'static str>,
    fixes: Vec<Vec<&'static str>>,
}

#[async_trait]
impl PlanProposer for ScriptedProposer {
    async fn classify(&self, _issue: &str) -> Option<String> {
        None
    }

    async fn propose(&self, request: &ProposalRequest) -> remedy_shared::Result<Proposal> {
        let commands = match request.kind {
            PlanKind::Diagnostic => self.diagnostics.clone(),
            _ => self
                .fixes
                .get(request.stage as usize)
                .cloned()
                .unwrap_or_default(),
        };
        Ok(Proposal {
            summary: format!("{} round, stage {}", request.kind, request.stage),
            commands: commands
                .into_iter()
                .map(|c| ProposedCommand::new(c, "scripted"))
                .collect(),
        })
    }
}

/// Runner that records every command; the verification command answers from a queue
#[derive(Clone, Default)]
struct RecordingRunner {
    calls: Arc<Mutex<Vec<String>>>,
    check_outputs: Arc<Mutex<VecDeque<&'static str>>>,
    hangs_on: Vec<&'static str>,
    fails_on: Vec<&'static str>,
}

impl RecordingRunner {
    fn with_checks(outputs: &[&'static str]) -> Self {
        let runner = Self::default();
        runner.check_outputs.lock().unwrap().extend(outputs.iter().copied());
        runner
    }

    /// `command` runs past its time bound
    fn hanging_on(mut self, command: &'static str) -> Self {
        self.hangs_on.push(command);
        self
    }

    /// `command` exits 1
    fn failing_on(mut self, command: &'static str) -> Self {
        self.fails_on.push(command);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &str, _timeout: Duration) -> RunOutcome {
        self.calls.lock().unwrap().push(command.to_string());
        if self.hangs_on.iter().any(|c| *c == command) {
            return RunOutcome::TimedOut { elapsed_ms: 60_000 };
        }
        if self.fails_on.iter().any(|c| *c == command) {
            return RunOutcome::Completed(RawOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "Access is denied.".into(),
                duration_ms: 1,
            });
        }
        let stdout = if command == VERIFY_CMD {
            self.check_outputs.lock().unwrap().pop_front().unwrap_or(BROKEN)
        } else {
            "ok"
        };
        RunOutcome::Completed(RawOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration_ms: 1,
        })
    }
}

fn config(max_tier: u8) -> Config {
    let mut config = Config::default();
    config.stages.default_max_tier = max_tier;
    config.verification = vec![VerificationCheck {
        category: "wifi".into(),
        command: VERIFY_CMD.into(),
        healthy_pattern: Some("connectivity : internet".into()),
        broken_pattern: Some("disconnected|notraffic".into()),
    }];
    config
}

fn gate() -> PolicyGate {
    PolicyGate::from_rules(
        &[
            "get-*",
            "restart-*",
            "ipconfig *",
            "netsh wlan show *",
            "contains:winsock",
        ],
        &["*winsock*", "remove-item*"],
    )
    .unwrap()
}

fn engine(proposer: ScriptedProposer, runner: RecordingRunner, max_tier: u8) -> Engine {
    engine_with_research(proposer, runner, max_tier, Box::new(NoResearch))
}

fn engine_with_research(
    proposer: ScriptedProposer,
    runner: RecordingRunner,
    max_tier: u8,
    research: Box<dyn ResearchProvider>,
) -> Engine {
    Engine::new(
        config(max_tier),
        Arc::new(gate()),
        Box::new(proposer),
        research,
        Box::new(runner),
    )
    .unwrap()
}

/// Research that always finds one strong SOP entry
struct SopResearch;

#[async_trait]
impl ResearchProvider for SopResearch {
    async fn lookup(&self, _issue: &str, web_query: &str, _keywords: &[String]) -> ResearchHints {
        ResearchHints {
            kb_matches: vec![KbMatch {
                id: "TS-104".into(),
                issue_text: "Wi-Fi keeps dropping".into(),
                response: "Forget the network; Reconnect with the saved password.".into(),
                score: 0.8,
                link: Some("https://kb.contoso.test/TS-104".into()),
            }],
            web_hints: Vec::new(),
            query_used: web_query.to_string(),
        }
    }
}

fn wifi_proposer() -> ScriptedProposer {
    ScriptedProposer {
        diagnostics: vec!["Get-NetAdapter", "netsh wlan show interfaces"],
        fixes: vec![
            vec!["Restart-NetAdapter -Name Wi-Fi"],
            vec!["ipconfig /renew"],
            vec!["Restart-Service WlanSvc"],
        ],
    }
}

fn expect_confirm(step: Step) -> PendingRound {
    match step {
        Step::Confirm(pending) => pending,
        other => panic!("expected a confirmation step, got {:?}", other.response()),
    }
}

fn expect_done(step: Step) -> remedy_shared::Response {
    match step {
        Step::Done(response) => response,
        other => panic!("expected a finished round, got {:?}", other),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_fixed_at_first_stage() {
    let runner = RecordingRunner::with_checks(&[HEALTHY]);
    let engine = engine(wifi_proposer(), runner.clone(), 2);
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "My wifi keeps dropping").await.unwrap());
    assert_eq!(diagnostic.plan().kind(), PlanKind::Diagnostic);
    assert!(diagnostic.response().requires_confirmation);
    assert!(diagnostic.plan().commands().iter().all(|c| !c.is_mutating()));
    assert!(runner.calls().is_empty(), "nothing runs before confirmation");

    let fix = expect_confirm(
        engine
            .resolve(&mut session, diagnostic, Decision::Approve)
            .await
            .unwrap(),
    );
    assert_eq!(fix.plan().kind(), PlanKind::Fix);
    assert_eq!(fix.plan().stage(), 0);
    assert_eq!(fix.plan().verification().map(|c| c.text.as_str()), Some(VERIFY_CMD));
    assert!(fix.response().diagnosis_or_fix.contains("Diagnostics complete"));

    let response = expect_done(engine.resolve(&mut session, fix, Decision::Approve).await.unwrap());
    assert!(!response.escalated);
    assert_eq!(response.stage, 0);

    let record = session.stages().record("wifi").unwrap();
    assert!(record.resolved);
    assert_eq!(record.history.len(), 1);
    assert_eq!(record.history[0].verdict, VerdictKind::Fixed);
    assert_eq!(
        runner.calls(),
        vec![
            "Get-NetAdapter",
            "netsh wlan show interfaces",
            "Restart-NetAdapter -Name Wi-Fi",
            VERIFY_CMD
        ]
    );
}

#[tokio::test]
async fn test_still_broken_advances_to_next_stage() {
    let runner = RecordingRunner::with_checks(&[BROKEN, HEALTHY]);
    let engine = engine(wifi_proposer(), runner.clone(), 2);
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "wifi not working").await.unwrap());
    let first = expect_confirm(
        engine
            .resolve(&mut session, diagnostic, Decision::Approve)
            .await
            .unwrap(),
    );
    let second = expect_confirm(
        engine
            .resolve(&mut session, first, Decision::Approve)
            .await
            .unwrap(),
    );
    assert_eq!(second.plan().stage(), 1);
    assert_eq!(second.plan().commands()[0].text, "ipconfig /renew");
    assert_eq!(session.stages().state("wifi"), StageState::Stage { tier: 1 });

    let response = expect_done(engine.resolve(&mut session, second, Decision::Approve).await.unwrap());
    assert!(!response.escalated);
    assert_eq!(response.stage, 1);

    let history = &session.stages().record("wifi").unwrap().history;
    let verdicts: Vec<VerdictKind> = history.iter().map(|a| a.verdict).collect();
    assert_eq!(verdicts, vec![VerdictKind::StillBroken, VerdictKind::Fixed]);
}

#[tokio::test]
async fn test_timed_out_and_failed_fixes_advance() {
    let runner = RecordingRunner::with_checks(&[HEALTHY])
        .hanging_on("Restart-NetAdapter -Name Wi-Fi")
        .failing_on("ipconfig /renew");
    let engine = engine(wifi_proposer(), runner.clone(), 2);
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "wifi not working").await.unwrap());
    let first = expect_confirm(
        engine
            .resolve(&mut session, diagnostic, Decision::Approve)
            .await
            .unwrap(),
    );

    // Stage 0 hangs: the verification never runs and the ladder moves up
    let second = expect_confirm(
        engine
            .resolve(&mut session, first, Decision::Approve)
            .await
            .unwrap(),
    );
    assert_eq!(second.plan().stage(), 1);
    assert_eq!(second.plan().commands()[0].text, "ipconfig /renew");
    assert!(second.response().diagnosis_or_fix.contains("timed out"));
    assert_eq!(runner.calls().last().map(String::as_str), Some("Restart-NetAdapter -Name Wi-Fi"));

    // Stage 1 exits non-zero: same treatment
    let third = expect_confirm(
        engine
            .resolve(&mut session, second, Decision::Approve)
            .await
            .unwrap(),
    );
    assert_eq!(third.plan().stage(), 2);
    assert_eq!(third.plan().commands()[0].text, "Restart-Service WlanSvc");
    assert!(third.response().diagnosis_or_fix.contains("exit code 1"));
    assert_eq!(session.stages().state("wifi"), StageState::Stage { tier: 2 });

    let response = expect_done(engine.resolve(&mut session, third, Decision::Approve).await.unwrap());
    assert!(!response.escalated);

    let history = &session.stages().record("wifi").unwrap().history;
    let verdicts: Vec<VerdictKind> = history.iter().map(|a| a.verdict).collect();
    assert_eq!(
        verdicts,
        vec![VerdictKind::StillBroken, VerdictKind::StillBroken, VerdictKind::Fixed]
    );
    assert_eq!(runner.calls().iter().filter(|c| c.as_str() == VERIFY_CMD).count(), 1);
}

#[tokio::test]
async fn test_stage_zero_answer_from_sop() {
    let proposer = ScriptedProposer {
        diagnostics: vec!["Get-NetAdapter"],
        fixes: vec![],
    };
    let runner = RecordingRunner::default();
    let engine = engine_with_research(proposer, runner.clone(), 2, Box::new(SopResearch));
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "My wifi keeps dropping").await.unwrap());
    let response = expect_done(
        engine
            .resolve(&mut session, diagnostic, Decision::Approve)
            .await
            .unwrap(),
    );
    assert!(response
        .diagnosis_or_fix
        .contains("Recommended steps (from TS-104):\n- Forget the network\n- Reconnect with the saved password"));
    assert!(response.commands.is_empty());
    assert!(!response.requires_confirmation);
    assert!(response
        .sources
        .iter()
        .any(|s| s.kind == SourceKind::Kb
            && s.label == "TS-104"
            && s.link == "https://kb.contoso.test/TS-104"));
    assert_eq!(runner.calls(), vec!["Get-NetAdapter"]);
}

#[tokio::test]
async fn test_exhausted_tiers_escalate() {
    let runner = RecordingRunner::with_checks(&[BROKEN, BROKEN]);
    let engine = engine(wifi_proposer(), runner.clone(), 1);
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "wifi drops").await.unwrap());
    let first = expect_confirm(
        engine
            .resolve(&mut session, diagnostic, Decision::Approve)
            .await
            .unwrap(),
    );
    let second = expect_confirm(
        engine
            .resolve(&mut session, first, Decision::Approve)
            .await
            .unwrap(),
    );
    let response = expect_done(engine.resolve(&mut session, second, Decision::Approve).await.unwrap());

    assert!(response.escalated);
    assert!(response.commands.is_empty());
    assert!(!response.requires_confirmation);
    assert!(session.stages().is_escalated("wifi"));
    let ticket = session.stages().state("wifi").ticket().cloned().unwrap();
    assert_eq!(ticket.reason, EscalationReason::TiersExhausted);
    assert_eq!(ticket.history.len(), 2);
    assert!(response.diagnosis_or_fix.contains(&ticket.ticket_id));

    // Same category again: no more automatic attempts
    let calls_before = runner.calls().len();
    let again = expect_done(engine.submit(&mut session, "wifi is still down").await.unwrap());
    assert!(again.escalated);
    assert_eq!(runner.calls().len(), calls_before);
}

#[tokio::test]
async fn test_denied_fix_escalates_without_running() {
    let proposer = ScriptedProposer {
        diagnostics: vec!["Get-NetAdapter"],
        fixes: vec![vec!["netsh winsock reset"]],
    };
    let runner = RecordingRunner::default();
    let engine = engine(proposer, runner.clone(), 2);
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "internet is broken").await.unwrap());
    let response = expect_done(
        engine
            .resolve(&mut session, diagnostic, Decision::Approve)
            .await
            .unwrap(),
    );

    assert!(response.escalated);
    assert!(response.diagnosis_or_fix.contains("netsh winsock reset"));
    assert!(runner.calls().iter().all(|c| !c.contains("winsock")));

    let record = session.stages().record("wifi").unwrap();
    assert!(record.blocked_commands.contains(&"netsh winsock reset".to_string()));
    let ticket = record.state.ticket().unwrap();
    assert_eq!(ticket.reason, EscalationReason::NoAllowedCommands);
}

#[tokio::test]
async fn test_decline_runs_nothing() {
    let runner = RecordingRunner::default();
    let engine = engine(wifi_proposer(), runner.clone(), 2);
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "wifi slow to connect").await.unwrap());
    let response = expect_done(
        engine
            .resolve(&mut session, diagnostic, Decision::Decline)
            .await
            .unwrap(),
    );

    assert_eq!(response.diagnosis_or_fix, "Cancelled. Nothing was run.");
    assert!(runner.calls().is_empty());
    assert_eq!(session.phase(), &Phase::Idle);
    assert_eq!(session.stages().state("wifi"), StageState::Stage { tier: 0 });
}

#[tokio::test]
async fn test_stale_confirmation_is_rejected() {
    let runner = RecordingRunner::default();
    let engine = engine(wifi_proposer(), runner.clone(), 2);
    let mut session = engine.start_session();

    let stale = expect_confirm(engine.submit(&mut session, "wifi drops").await.unwrap());
    let current = expect_confirm(engine.submit(&mut session, "wifi drops again").await.unwrap());

    let err = engine
        .resolve(&mut session, stale, Decision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, RemedyError::ConfirmationMissing { .. }));
    assert!(runner.calls().is_empty());

    expect_done(
        engine
            .resolve(&mut session, current, Decision::Decline)
            .await
            .unwrap(),
    );
}

#[tokio::test]
async fn test_pending_round_from_another_session_is_rejected() {
    let runner = RecordingRunner::default();
    let engine = engine(wifi_proposer(), runner.clone(), 2);
    let mut first = engine.start_session();
    let mut second = engine.start_session();

    let pending = expect_confirm(engine.submit(&mut first, "wifi drops").await.unwrap());
    expect_confirm(engine.submit(&mut second, "wifi drops").await.unwrap());

    assert!(engine
        .resolve(&mut second, pending, Decision::Approve)
        .await
        .is_err());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_inconclusive_asks_user() {
    let proposer = ScriptedProposer {
        diagnostics: vec!["Get-Printer"],
        fixes: vec![vec!["Restart-Service Spooler"]],
    };
    let runner = RecordingRunner::default();
    let engine = engine(proposer, runner.clone(), 2);
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "my printer is stuck").await.unwrap());
    let fix = expect_confirm(
        engine
            .resolve(&mut session, diagnostic, Decision::Approve)
            .await
            .unwrap(),
    );
    assert!(fix.plan().verification().is_none());

    let step = engine.resolve(&mut session, fix, Decision::Approve).await.unwrap();
    assert!(matches!(step, Step::ManualCheck(_)));
    assert_eq!(
        session.phase(),
        &Phase::AwaitingManualCheck {
            category: "printer".into()
        }
    );
    assert_eq!(session.stages().state("printer"), StageState::Stage { tier: 0 });

    let response = expect_done(engine.report_manual_outcome(&mut session, true).await.unwrap());
    assert!(!response.escalated);
    let record = session.stages().record("printer").unwrap();
    assert!(record.resolved);
    assert_eq!(record.history[0].verdict, VerdictKind::Fixed);
}

#[tokio::test]
async fn test_greeting_gets_answer_without_commands() {
    let proposer = ScriptedProposer {
        diagnostics: vec![],
        fixes: vec![],
    };
    let runner = RecordingRunner::default();
    let engine = engine(proposer, runner.clone(), 2);
    let mut session = engine.start_session();

    let response = expect_done(engine.submit(&mut session, "hello").await.unwrap());
    assert_eq!(response.category.as_deref(), Some("chitchat"));
    assert!(response.commands.is_empty());
    assert!(!response.requires_confirmation);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_snapshot_resumes_stage_state() {
    let runner = RecordingRunner::with_checks(&[BROKEN]);
    let engine = engine(wifi_proposer(), runner.clone(), 2);
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "wifi drops").await.unwrap());
    let first = expect_confirm(
        engine
            .resolve(&mut session, diagnostic, Decision::Approve)
            .await
            .unwrap(),
    );
    expect_confirm(
        engine
            .resolve(&mut session, first, Decision::Approve)
            .await
            .unwrap(),
    );

    let snapshot = session.snapshot();
    let resumed = engine.resume_session(snapshot);
    assert_eq!(resumed.id(), session.id());
    assert_eq!(resumed.stages().state("wifi"), StageState::Stage { tier: 1 });
    assert_eq!(resumed.phase(), &Phase::Idle);
}

#[tokio::test]
async fn test_reset_starts_category_over() {
    let runner = RecordingRunner::with_checks(&[BROKEN]);
    let engine = engine(wifi_proposer(), runner.clone(), 2);
    let mut session = engine.start_session();

    let diagnostic = expect_confirm(engine.submit(&mut session, "wifi drops").await.unwrap());
    let first = expect_confirm(
        engine
            .resolve(&mut session, diagnostic, Decision::Approve)
            .await
            .unwrap(),
    );
    expect_confirm(
        engine
            .resolve(&mut session, first, Decision::Approve)
            .await
            .unwrap(),
    );

    assert!(session.reset_category("wifi"));
    assert_eq!(session.stages().state("wifi"), StageState::Stage { tier: 0 });
    assert!(!session.reset_category("wifi"));
}
