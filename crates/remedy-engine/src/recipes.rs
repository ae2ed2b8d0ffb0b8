//! Built-in recipe proposer.
//!
//! Used when no chat endpoint is configured. Each known category has a
//! read-only diagnostic set and an ordered ladder of fix tiers; each tier
//! has a primary and an alternative command set so a refused or already
//! attempted set can be swapped once.

use async_trait::async_trait;
use remedy_shared::PlanKind;
use tracing::debug;

use crate::proposer::{
    classify_by_keywords, PlanProposer, Proposal, ProposalRequest, ProposedCommand,
    CHITCHAT_CATEGORY,
};

type Step = (&'static str, &'static str);

struct Tier {
    summary: &'static str,
    primary: &'static [Step],
    alternative: &'static [Step],
}

struct Recipe {
    category: &'static str,
    diagnostics: &'static [Step],
    tiers: &'static [Tier],
}

const GENERAL_DIAGNOSTICS: &[Step] = &[
    (
        "Get-CimInstance Win32_OperatingSystem | Format-List Caption, Version, BuildNumber, TotalVisibleMemorySize, FreePhysicalMemory",
        "Collect OS version and memory",
    ),
    (
        "Get-CimInstance Win32_Processor | Format-List Name, LoadPercentage",
        "Collect processor details",
    ),
    (
        "Get-NetIPAddress -AddressFamily IPv4 | Format-List InterfaceAlias, IPAddress",
        "List IPv4 addresses",
    ),
    (
        "Get-PSDrive -PSProvider FileSystem | Format-List Name, Used, Free",
        "Collect disk usage",
    ),
];

const RECIPES: &[Recipe] = &[
    Recipe {
        category: "wifi",
        diagnostics: &[
            ("Get-NetAdapter | Select-Object Name, Status, LinkSpeed", "List network adapters"),
            ("netsh wlan show interfaces", "Show wireless interface state"),
            ("ipconfig /all", "Show IP configuration"),
            ("Test-NetConnection 8.8.8.8", "Check internet reachability"),
        ],
        tiers: &[
            Tier {
                summary: "The Wi-Fi adapter will be restarted.",
                primary: &[
                    ("Disable-NetAdapter -Name \"Wi-Fi\" -Confirm:$false", "Disable the Wi-Fi adapter"),
                    ("Enable-NetAdapter -Name \"Wi-Fi\" -Confirm:$false", "Enable the Wi-Fi adapter"),
                ],
                alternative: &[(
                    "Restart-NetAdapter -Name \"Wi-Fi\" -Confirm:$false",
                    "Restart the Wi-Fi adapter",
                )],
            },
            Tier {
                summary: "The IP lease will be renewed and the DNS cache flushed.",
                primary: &[
                    ("ipconfig /release", "Release the IP lease"),
                    ("ipconfig /renew", "Renew the IP lease"),
                    ("ipconfig /flushdns", "Flush the DNS cache"),
                ],
                alternative: &[("Restart-Service WlanSvc -Force", "Restart the WLAN service")],
            },
            Tier {
                summary: "The network stack will be reset. A restart may be required.",
                primary: &[
                    ("netsh winsock reset", "Reset Winsock"),
                    ("netsh int ip reset", "Reset the TCP/IP stack"),
                ],
                alternative: &[("Restart-Service Dhcp -Force", "Restart the DHCP client")],
            },
        ],
    },
    Recipe {
        category: "bluetooth",
        diagnostics: &[
            ("Get-Service bthserv | Select-Object Name, Status", "Check the Bluetooth service"),
            (
                "Get-PnpDevice -Class Bluetooth | Select-Object FriendlyName, Status",
                "List Bluetooth devices",
            ),
        ],
        tiers: &[
            Tier {
                summary: "The Bluetooth support service will be restarted.",
                primary: &[("Restart-Service bthserv -Force", "Restart the Bluetooth service")],
                alternative: &[
                    ("Stop-Service bthserv -Force", "Stop the Bluetooth service"),
                    ("Start-Service bthserv", "Start the Bluetooth service"),
                ],
            },
            Tier {
                summary: "The Bluetooth radio will be disabled and re-enabled.",
                primary: &[
                    (
                        "Get-PnpDevice -Class Bluetooth | Disable-PnpDevice -Confirm:$false",
                        "Disable Bluetooth devices",
                    ),
                    (
                        "Get-PnpDevice -Class Bluetooth | Enable-PnpDevice -Confirm:$false",
                        "Enable Bluetooth devices",
                    ),
                ],
                alternative: &[("pnputil /restart-device \"BTH*\"", "Restart Bluetooth devices")],
            },
            Tier {
                summary: "Hardware will be rescanned so the driver reloads.",
                primary: &[("pnputil /scan-devices", "Rescan for hardware changes")],
                alternative: &[("Restart-Service DeviceAssociationService -Force", "Restart device association")],
            },
        ],
    },
    Recipe {
        category: "printer",
        diagnostics: &[
            ("Get-Printer | Select-Object Name, PrinterStatus", "List printers"),
            ("Get-Service Spooler | Select-Object Name, Status", "Check the print spooler"),
            ("Get-PrintJob -PrinterName (Get-Printer | Select-Object -First 1).Name", "List queued jobs"),
        ],
        tiers: &[
            Tier {
                summary: "The print spooler will be restarted.",
                primary: &[("Restart-Service Spooler -Force", "Restart the print spooler")],
                alternative: &[
                    ("Stop-Service Spooler -Force", "Stop the print spooler"),
                    ("Start-Service Spooler", "Start the print spooler"),
                ],
            },
            Tier {
                summary: "Stuck print jobs will be cleared.",
                primary: &[
                    ("Stop-Service Spooler -Force", "Stop the print spooler"),
                    ("Remove-Item \"$env:SystemRoot\\System32\\spool\\PRINTERS\\*\" -Force", "Clear the print queue"),
                    ("Start-Service Spooler", "Start the print spooler"),
                ],
                alternative: &[(
                    "Get-Printer | ForEach-Object { Get-PrintJob -PrinterName $_.Name | Remove-PrintJob }",
                    "Remove queued jobs",
                )],
            },
        ],
    },
    Recipe {
        category: "performance",
        diagnostics: &[
            (
                "Get-Process | Sort-Object CPU -Descending | Select-Object -First 10 Name, CPU, WorkingSet",
                "Top processes by CPU",
            ),
            (
                "Get-CimInstance Win32_OperatingSystem | Format-List TotalVisibleMemorySize, FreePhysicalMemory",
                "Memory usage",
            ),
            ("Get-PSDrive C | Format-List Used, Free", "Free disk space"),
        ],
        tiers: &[
            Tier {
                summary: "Temporary files will be removed.",
                primary: &[(
                    "Remove-Item \"$env:TEMP\\*\" -Recurse -Force -ErrorAction SilentlyContinue",
                    "Clear temporary files",
                )],
                alternative: &[("Clear-RecycleBin -Force", "Empty the recycle bin")],
            },
            Tier {
                summary: "Windows Search indexing will be restarted.",
                primary: &[("Restart-Service WSearch -Force", "Restart Windows Search")],
                alternative: &[("Restart-Service SysMain -Force", "Restart SysMain")],
            },
        ],
    },
];

/// Deterministic proposer backed by the recipe table
#[derive(Debug, Default, Clone)]
pub struct RecipeProposer;

impl RecipeProposer {
    pub fn new() -> Self {
        Self
    }

    fn recipe(category: &str) -> Option<&'static Recipe> {
        RECIPES.iter().find(|r| r.category == category)
    }
}

fn to_commands(steps: &[Step]) -> Vec<ProposedCommand> {
    steps
        .iter()
        .map(|(command, description)| ProposedCommand::new(command, description))
        .collect()
}

fn overlaps(steps: &[Step], avoid: &[String]) -> bool {
    steps
        .iter()
        .any(|(command, _)| avoid.iter().any(|a| a.eq_ignore_ascii_case(command)))
}

#[async_trait]
impl PlanProposer for RecipeProposer {
    async fn classify(&self, issue: &str) -> Option<String> {
        Some(classify_by_keywords(issue))
    }

    async fn propose(&self, request: &ProposalRequest) -> remedy_shared::Result<Proposal> {
        if request.category == CHITCHAT_CATEGORY {
            return Ok(Proposal {
                summary: "Hi! How can I help you with your Windows issue today?".to_string(),
                commands: Vec::new(),
            });
        }

        let recipe = Self::recipe(&request.category);

        match request.kind {
            PlanKind::Diagnostic => {
                let steps = recipe.map(|r| r.diagnostics).unwrap_or(GENERAL_DIAGNOSTICS);
                Ok(Proposal {
                    summary: format!("Read-only checks for the {} issue.", request.category),
                    commands: to_commands(steps),
                })
            }
            PlanKind::Fix => {
                let Some(tier) = recipe.and_then(|r| r.tiers.get(request.stage as usize)) else {
                    debug!(
                        "No recipe tier {} for '{}'",
                        request.stage, request.category
                    );
                    return Ok(Proposal::default());
                };
                let steps = if overlaps(tier.primary, &request.avoid) {
                    tier.alternative
                } else {
                    tier.primary
                };
                let commands: Vec<ProposedCommand> = to_commands(steps)
                    .into_iter()
                    .filter(|c| {
                        !request
                            .avoid
                            .iter()
                            .any(|a| a.eq_ignore_ascii_case(&c.command))
                    })
                    .collect();
                Ok(Proposal {
                    summary: tier.summary.to_string(),
                    commands,
                })
            }
            PlanKind::Answer => Ok(Proposal::default()),
        }
    }
}
