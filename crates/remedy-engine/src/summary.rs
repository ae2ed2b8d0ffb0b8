//! Round summaries and answers derived from diagnostic output

use remedy_shared::summary::step_lines;
use remedy_shared::{
    DiagnosisSummary, ExecutionOutcome, ExecutionResult, FixSummary, KbMatch, ResearchHints,
    Verdict, VerdictKind,
};

/// Lines of command output kept per result in the findings text
const FINDINGS_LINES_PER_COMMAND: usize = 20;

/// Findings for a diagnostic round
pub fn diagnosis_summary(
    category: &str,
    results: &[ExecutionResult],
    hints: &ResearchHints,
    sop_threshold: f32,
) -> DiagnosisSummary {
    let ran = results
        .iter()
        .filter(|r| r.outcome != ExecutionOutcome::Blocked)
        .count();
    let ok = results.iter().filter(|r| r.succeeded()).count();

    let mut findings = format!(
        "Diagnostics complete: {} of {} checks succeeded.",
        ok,
        results.len()
    );
    if ran < results.len() {
        findings.push_str(&format!(" {} were refused by policy.", results.len() - ran));
    }

    for result in results {
        if result.outcome == ExecutionOutcome::Blocked {
            continue;
        }
        let output: Vec<&str> = result
            .display_output()
            .lines()
            .take(FINDINGS_LINES_PER_COMMAND)
            .collect();
        findings.push_str(&format!("\n\n{}\n{}", result.command, output.join("\n")));
    }

    if let Some(sop) = hints.sop(sop_threshold) {
        findings.push_str(&format!(
            "\n\nRelated SOP: {} -> {}",
            sop.issue_text, sop.response
        ));
    }
    if let Some(web) = hints.top_web() {
        findings.push_str(&format!("\nWeb hint: {} | {}", web.title, web.url));
    }

    DiagnosisSummary {
        category: Some(category.to_string()),
        findings,
        steps: step_lines(results),
        blocked_commands: results
            .iter()
            .filter(|r| r.outcome == ExecutionOutcome::Blocked)
            .map(|r| r.command.clone())
            .collect(),
    }
}

/// Outcome text for a fix round
pub fn fix_summary(
    category: &str,
    stage: u8,
    verdict: &Verdict,
    results: &[ExecutionResult],
) -> FixSummary {
    let text = match verdict.kind {
        VerdictKind::Fixed => format!(
            "The {} issue appears fixed after stage {}: {}.",
            category, stage, verdict.reason
        ),
        VerdictKind::StillBroken => format!(
            "The {} issue is still present after stage {}: {}.",
            category, stage, verdict.reason
        ),
        VerdictKind::Inconclusive => format!(
            "Stage {} for {} could not be verified automatically ({}). \
             Please check whether the problem is resolved.",
            stage, category, verdict.reason
        ),
    };
    FixSummary {
        category: category.to_string(),
        stage,
        verdict: verdict.clone(),
        text,
        steps: step_lines(results),
    }
}

/// "Recommended steps (from TS-104):" followed by one bullet per sentence
pub fn format_kb_steps(kb: &KbMatch) -> String {
    let steps: Vec<String> = kb
        .response
        .replace(';', ".")
        .split('.')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| format!("- {}", s))
        .collect();
    if steps.is_empty() {
        return format!("Recommended steps (from {}): none listed", kb.id);
    }
    format!("Recommended steps (from {}):\n{}", kb.id, steps.join("\n"))
}

/// Value of a `Key : Value` line whose key matches one of `keys`
fn find_value(text: &str, keys: &[&str]) -> Option<String> {
    for key in keys {
        for line in text.lines() {
            let Some((k, v)) = line.split_once(':') else {
                continue;
            };
            let k: String = k.chars().filter(|c| !c.is_whitespace()).collect();
            let v = v.trim();
            if k.eq_ignore_ascii_case(key) && !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }
    None
}

fn kb_to_gb(value: &str) -> Option<String> {
    let kb: u64 = value.trim().parse().ok()?;
    Some(format!("{:.1} GB", kb as f64 / 1024.0 / 1024.0))
}

fn is_loopback_or_link_local(ip: &str) -> bool {
    ip.starts_with("127.") || ip.starts_with("169.254.")
}

/// Every routable `IPAddress : …` value, in output order
fn ipv4_addresses(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let (k, v) = line.split_once(':')?;
            let k: String = k.chars().filter(|c| !c.is_whitespace()).collect();
            k.eq_ignore_ascii_case("ipaddress").then(|| v.trim().to_string())
        })
        .filter(|ip| !ip.is_empty() && !is_loopback_or_link_local(ip))
        .collect()
}

fn is_drive_listing(result: &ExecutionResult) -> bool {
    result.command.to_lowercase().contains("get-psdrive")
}

fn asks_disk_space(q: &str) -> bool {
    ["disk space", "free space", "storage", "disk usage", "drive space", "hard drive", "how full"]
        .iter()
        .any(|m| q.contains(m))
}

/// Broad "tell me about this machine" requests
pub fn asks_system_overview(text: &str) -> bool {
    let q = text.to_lowercase();
    let phrases = [
        "system info",
        "system information",
        "computer info",
        "about my system",
        "about my computer",
        "details about my",
    ];
    if phrases.iter().any(|p| q.contains(p)) {
        return true;
    }
    q.contains("detail")
        && q
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| matches!(w, "computer" | "pc" | "system" | "machine" | "laptop"))
}

fn bytes_to_gb(bytes: u64) -> String {
    format!("{:.1} GB", bytes as f64 / 1024.0 / 1024.0 / 1024.0)
}

/// One drive block from `Get-PSDrive` output
#[derive(Default)]
struct DriveUsage {
    name: Option<String>,
    used: Option<u64>,
    free: Option<u64>,
}

impl DriveUsage {
    /// Format and reset; nothing when the block lacks sizes
    fn take_line(&mut self, fallback: Option<&str>) -> Option<String> {
        let block = std::mem::take(self);
        let (used, free) = (block.used?, block.free?);
        let drive = block.name.as_deref().or(fallback).unwrap_or("?");
        Some(format!(
            "Disk {}: Used {}, Free {}",
            drive,
            bytes_to_gb(used),
            bytes_to_gb(free)
        ))
    }
}

/// `Disk C: Used 120.0 GB, Free 350.5 GB` per drive in `Get-PSDrive` output.
///
/// Blocks are separated by a new `Name` key or a blank line. When the
/// listing has no `Name` column the drive comes from the command itself.
fn disk_lines(results: &[ExecutionResult]) -> Vec<String> {
    let mut lines = Vec::new();
    for result in results.iter().filter(|r| r.succeeded() && is_drive_listing(r)) {
        let fallback = result
            .command
            .split_whitespace()
            .nth(1)
            .filter(|arg| !arg.starts_with('-') && *arg != "|")
            .map(|arg| arg.trim_end_matches(':').to_uppercase());

        let mut block = DriveUsage::default();
        for line in result.stdout.lines() {
            let Some((k, v)) = line.split_once(':') else {
                if line.trim().is_empty() {
                    lines.extend(block.take_line(fallback.as_deref()));
                }
                continue;
            };
            let key: String = k.chars().filter(|c| !c.is_whitespace()).collect();
            let value = v.trim();
            match key.to_lowercase().as_str() {
                "name" => {
                    lines.extend(block.take_line(fallback.as_deref()));
                    block.name = Some(value.to_string());
                }
                "used" => block.used = value.parse().ok(),
                "free" => block.free = value.parse().ok(),
                _ => {}
            }
        }
        lines.extend(block.take_line(fallback.as_deref()));
    }
    lines
}

/// Answer a system-information question from diagnostic output.
///
/// Returns `None` when the question is not one we know how to answer.
pub fn extract_answer(question: &str, results: &[ExecutionResult]) -> Option<String> {
    let q = question.to_lowercase();
    // Drive listings carry their own `Name` keys; keep them apart
    let combined: String = results
        .iter()
        .filter(|r| r.succeeded() && !is_drive_listing(r))
        .map(|r| r.stdout.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let disks = disk_lines(results);

    if asks_disk_space(&q) {
        if disks.is_empty() {
            return Some("Disk usage was not found in the diagnostics.".to_string());
        }
        return Some(disks.join("\n"));
    }

    if q.contains("os build") || q.contains("build version") || q.contains("build number") {
        return Some(
            find_value(&combined, &["osbuildnumber", "buildnumber"])
                .map(|b| format!("Your OS build is {}.", b))
                .unwrap_or_else(|| "The OS build was not found in the diagnostics.".to_string()),
        );
    }

    if q.contains("ip address") || q.contains("my ip") {
        return Some(match ipv4_addresses(&combined).into_iter().next() {
            Some(ip) => format!("Your IPv4 address is {}.", ip),
            None => "No IPv4 address was found in the diagnostics.".to_string(),
        });
    }

    if q.contains("os version") || q.contains("windows version") || q.contains("which version") {
        let name = find_value(&combined, &["osname", "caption"]);
        let version = find_value(&combined, &["osversion", "version"]);
        return Some(match (name, version) {
            (Some(n), Some(v)) => format!("You are running {} (version {}).", n, v),
            (None, Some(v)) => format!("Your OS version is {}.", v),
            (Some(n), None) => format!("You are running {}.", n),
            (None, None) => "The OS version was not found in the diagnostics.".to_string(),
        });
    }

    if q.contains("cpu") || q.contains("processor") {
        return Some(
            find_value(&combined, &["name"])
                .map(|n| format!("Your processor is {}.", n))
                .unwrap_or_else(|| "The processor was not found in the diagnostics.".to_string()),
        );
    }

    if q.contains("ram") || q.contains("memory") {
        let total = find_value(&combined, &["totalvisiblememorysize"]).and_then(|v| kb_to_gb(&v));
        let free = find_value(&combined, &["freephysicalmemory"]).and_then(|v| kb_to_gb(&v));
        let wants_free = q.contains("free") || q.contains("available");
        return Some(match (wants_free, total, free) {
            (true, _, Some(free)) => format!("{} of memory is free.", free),
            (_, Some(total), Some(free)) => {
                format!("You have {} of RAM ({} free).", total, free)
            }
            (_, Some(total), None) => format!("You have {} of RAM.", total),
            _ => "Memory size was not found in the diagnostics.".to_string(),
        });
    }

    if asks_system_overview(&q) {
        let mut lines = Vec::new();
        if let Some(name) = find_value(&combined, &["osname", "caption"]) {
            lines.push(format!("OS: {}", name));
        }
        if let Some(version) = find_value(&combined, &["osversion", "version"]) {
            lines.push(format!("OS Version: {}", version));
        }
        if let Some(build) = find_value(&combined, &["osbuildnumber", "buildnumber"]) {
            lines.push(format!("OS Build: {}", build));
        }
        if let Some(cpu) = find_value(&combined, &["name"]) {
            lines.push(format!("CPU: {}", cpu));
        }
        if let Some(total) =
            find_value(&combined, &["totalvisiblememorysize"]).and_then(|v| kb_to_gb(&v))
        {
            lines.push(format!("RAM Total: {}", total));
        }
        if let Some(free) =
            find_value(&combined, &["freephysicalmemory"]).and_then(|v| kb_to_gb(&v))
        {
            lines.push(format!("RAM Free: {}", free));
        }
        let ips = ipv4_addresses(&combined);
        if !ips.is_empty() {
            lines.push(format!("IP: {}", ips.join(", ")));
        }
        lines.extend(disks);
        if lines.is_empty() {
            return Some("System details were not found in the diagnostics.".to_string());
        }
        return Some(lines.join("\n"));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_shared::{RawOutput, WebHint};

    fn ok(command: &str, stdout: &str) -> ExecutionResult {
        ExecutionResult::from_output(
            command,
            RawOutput {
                exit_code: 0,
                stdout: stdout.into(),
                stderr: String::new(),
                duration_ms: 5,
            },
        )
    }

    fn system_results() -> Vec<ExecutionResult> {
        vec![
            ok(
                "Get-CimInstance Win32_OperatingSystem",
                "Caption                : Microsoft Windows 11 Pro\n\
                 Version                : 10.0.22631\n\
                 BuildNumber            : 22631\n\
                 TotalVisibleMemorySize : 16777216\n\
                 FreePhysicalMemory     : 8388608",
            ),
            ok(
                "Get-CimInstance Win32_Processor",
                "Name           : Intel(R) Core(TM) i7-1185G7\nLoadPercentage : 7",
            ),
            ok(
                "Get-NetIPAddress -AddressFamily IPv4",
                "InterfaceAlias : Loopback\nIPAddress      : 127.0.0.1\n\n\
                 InterfaceAlias : Wi-Fi\nIPAddress      : 192.168.1.42",
            ),
            ok(
                "Get-PSDrive -PSProvider FileSystem | Format-List Name, Used, Free",
                "Name : C\nUsed : 128849018880\nFree : 375809638400\n\n\
                 Name : D\nUsed : 1073741824\nFree : 52613349376",
            ),
        ]
    }

    #[test]
    fn test_extract_os_build() {
        let answer = extract_answer("What is my OS build?", &system_results()).unwrap();
        assert_eq!(answer, "Your OS build is 22631.");
    }

    #[test]
    fn test_extract_ip_skips_loopback() {
        let answer = extract_answer("what's my ip address", &system_results()).unwrap();
        assert_eq!(answer, "Your IPv4 address is 192.168.1.42.");
    }

    #[test]
    fn test_extract_memory_in_gb() {
        let answer = extract_answer("how much ram do I have?", &system_results()).unwrap();
        assert_eq!(answer, "You have 16.0 GB of RAM (8.0 GB free).");
        let free = extract_answer("how much free memory?", &system_results()).unwrap();
        assert_eq!(free, "8.0 GB of memory is free.");
    }

    #[test]
    fn test_extract_system_info() {
        let answer = extract_answer("show me system info", &system_results()).unwrap();
        assert!(answer.contains("OS: Microsoft Windows 11 Pro"));
        assert!(answer.contains("CPU: Intel(R) Core(TM) i7-1185G7"));
        assert!(answer.contains("RAM Total: 16.0 GB"));
        assert!(answer.contains("RAM Free: 8.0 GB"));
        assert!(answer.contains("IP: 192.168.1.42"));
        assert!(!answer.contains("127.0.0.1"));
        assert!(answer.contains("Disk C: Used 120.0 GB, Free 350.0 GB"));
    }

    #[test]
    fn test_extract_disk_space() {
        let answer = extract_answer("How much disk space do I have left?", &system_results()).unwrap();
        assert_eq!(
            answer,
            "Disk C: Used 120.0 GB, Free 350.0 GB\nDisk D: Used 1.0 GB, Free 49.0 GB"
        );
    }

    #[test]
    fn test_disk_name_from_command_when_listing_has_none() {
        let results = vec![ok(
            "Get-PSDrive C | Format-List Used, Free",
            "Used : 53687091200\nFree : 10737418240",
        )];
        let answer = extract_answer("is my storage full?", &results).unwrap();
        assert_eq!(answer, "Disk C: Used 50.0 GB, Free 10.0 GB");
    }

    #[test]
    fn test_drive_names_do_not_shadow_cpu() {
        let mut results = system_results();
        results.rotate_right(1);
        let answer = extract_answer("which processor do I have?", &results).unwrap();
        assert_eq!(answer, "Your processor is Intel(R) Core(TM) i7-1185G7.");
    }

    #[test]
    fn test_detail_phrasings_get_overview() {
        for question in [
            "give me details about my computer",
            "I need some detail on this pc",
            "detailed system report please",
        ] {
            assert!(asks_system_overview(question), "{}", question);
            let answer = extract_answer(question, &system_results()).unwrap();
            assert!(answer.starts_with("OS: Microsoft Windows 11 Pro"), "{}", question);
        }
        assert!(!asks_system_overview("my epcot ticket"));
    }

    #[test]
    fn test_unknown_question_has_no_answer() {
        assert!(extract_answer("my printer jams", &system_results()).is_none());
    }

    #[test]
    fn test_format_kb_steps() {
        let kb = KbMatch {
            id: "TS-104".into(),
            issue_text: "Wi-Fi drops".into(),
            response: "Restart the adapter; Renew the DHCP lease.".into(),
            score: 0.5,
            link: None,
        };
        assert_eq!(
            format_kb_steps(&kb),
            "Recommended steps (from TS-104):\n- Restart the adapter\n- Renew the DHCP lease"
        );
    }

    #[test]
    fn test_diagnosis_summary_mentions_hints_and_blocked() {
        let results = vec![
            ok("netsh wlan show interfaces", "State : disconnected"),
            ExecutionResult::blocked("Get-WinEvent -LogName System", "not on the allowlist"),
        ];
        let hints = ResearchHints {
            kb_matches: vec![KbMatch {
                id: "TS-104".into(),
                issue_text: "Wi-Fi drops".into(),
                response: "Restart the adapter".into(),
                score: 0.4,
                link: None,
            }],
            web_hints: vec![WebHint {
                title: "Fix Wi-Fi".into(),
                url: "https://support.microsoft.com/wifi".into(),
                snippet: String::new(),
            }],
            query_used: "wifi".into(),
        };
        let summary = diagnosis_summary("wifi", &results, &hints, 0.2);
        assert!(summary.findings.starts_with("Diagnostics complete: 1 of 2 checks succeeded."));
        assert!(summary.findings.contains("State : disconnected"));
        assert!(summary.findings.contains("Related SOP: Wi-Fi drops -> Restart the adapter"));
        assert!(summary.findings.contains("Web hint: Fix Wi-Fi"));
        assert_eq!(summary.blocked_commands, vec!["Get-WinEvent -LogName System"]);
        assert_eq!(summary.steps.len(), 2);
    }

    #[test]
    fn test_fix_summary_text() {
        let summary = fix_summary("wifi", 1, &Verdict::still_broken("check reported disconnected"), &[]);
        assert!(summary.text.contains("still present after stage 1"));
    }
}
