//! Terminal output - ASCII only, colored tags

use owo_colors::OwoColorize;
use remedy_engine::stage_manager::CategoryRecord;
use remedy_shared::{PolicyDecision, PolicyVerdict, Response, RiskClass};

/// Print a response
pub fn display_response(response: &Response) {
    println!();
    let header = match (&response.category, response.escalated) {
        (Some(category), true) => format!("[ESCALATED] {}", category).bright_red().to_string(),
        (Some(category), false) => format!("[{} | stage {}]", category, response.stage)
            .cyan()
            .to_string(),
        (None, _) => "[remedy]".cyan().to_string(),
    };
    println!("{}", header);
    println!();
    println!("{}", response.diagnosis_or_fix);

    if !response.commands.is_empty() {
        println!();
        println!("[COMMANDS]");
        for (idx, command) in response.commands.iter().enumerate() {
            let tag = match command.risk {
                RiskClass::ReadOnly => "[read]".green().to_string(),
                RiskClass::Mutating => "[change]".yellow().to_string(),
            };
            if command.description.is_empty() {
                println!("  {}. {} {}", idx + 1, tag, command.text);
            } else {
                println!("  {}. {} {} - {}", idx + 1, tag, command.text, command.description);
            }
        }
    }

    if !response.sources.is_empty() {
        println!();
        println!("[SOURCES]");
        for source in &response.sources {
            println!("  * {}", source.attribution().cyan());
        }
    }
    println!();
}

/// Print a single policy decision
pub fn display_decision(decision: &PolicyDecision) {
    let tag = match decision.verdict {
        PolicyVerdict::Allowed => "[ALLOWED]".bright_green().to_string(),
        PolicyVerdict::Denied => "[DENIED]".bright_red().to_string(),
        PolicyVerdict::Unmatched => "[UNMATCHED]".yellow().to_string(),
    };
    println!("{} {}", tag, decision.command);
    println!("  {}", decision.reason());
}

/// Print one category's stage record
pub fn display_record(category: &str, record: &CategoryRecord) {
    let state = if let Some(ticket) = record.state.ticket() {
        format!("escalated ({})", ticket.ticket_id).bright_red().to_string()
    } else if record.resolved {
        format!("resolved at stage {}", record.state.tier())
            .bright_green()
            .to_string()
    } else {
        format!("stage {}", record.state.tier()).yellow().to_string()
    };
    println!("  {:<14} {}", category, state);
    for attempt in &record.history {
        println!(
            "    - stage {}: {} ({} commands)",
            attempt.stage,
            attempt.verdict,
            attempt.commands.len()
        );
    }
    if !record.blocked_commands.is_empty() {
        println!("    blocked: {}", record.blocked_commands.join(", "));
    }
}
