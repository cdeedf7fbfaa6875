//! CUSTODIA — Audit Engine Demo CLI
//!
//! Seeds an audit service with a GDPR rule set, logs a short scenario of
//! user, security and system events, runs a compliance assessment and prints
//! the resulting report and metrics.
//!
//! Usage:
//!   cargo run -p demo -- scenario
//!   cargo run -p demo -- assess
//!   cargo run -p demo -- verify

use std::collections::BTreeMap;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use custodia_compliance::{
    AlertThresholds, ApplicabilityCondition, AutomatedCheck, CheckOutcome, CheckSchedule,
    CheckType, ComplianceFramework, ComplianceRule, ConditionOperator, ReportFormat, RuleSet,
};
use custodia_contracts::{
    error::AuditResult,
    event::{AuditActor, AuditEventType, AuditResource, EventDetails, Outcome, Severity},
    trail::SearchFilters,
};
use custodia_engine::{AuditService, LogOptions};

// ── CLI definition ────────────────────────────────────────────────────────────

/// CUSTODIA — tamper-evident audit trail and compliance engine demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "CUSTODIA audit engine demo",
    long_about = "Runs CUSTODIA demo flows showing hash-chained audit logging,\n\
                  rule-driven derived events, automated checks, and scored\n\
                  compliance assessments."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log a scenario of events and show the derived compliance events.
    Scenario,
    /// Run a GDPR assessment and print the rendered report.
    Assess,
    /// Log events, then verify the trail's hash chain end to end.
    Verify,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Structured logging. Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Scenario => run_scenario(),
        Command::Assess => run_assessment(),
        Command::Verify => run_verification(),
    };

    if let Err(e) = result {
        eprintln!("Demo error: {e}");
        std::process::exit(1);
    }
}

// ── Service setup ─────────────────────────────────────────────────────────────

/// Build and start a service with one GDPR rule: every privacy-related user
/// action produces a derived compliance event, and a failing DPIA check
/// feeds the assessment.
fn seeded_service() -> AuditResult<AuditService> {
    let rules = RuleSet {
        rules: vec![ComplianceRule {
            id: "gdpr-consent-trail".to_string(),
            framework: ComplianceFramework::Gdpr,
            section: "Art. 7".to_string(),
            requirement: "Privacy preference changes are tracked".to_string(),
            priority: Severity::High,
            applicability: vec![ApplicabilityCondition {
                field: "action".to_string(),
                operator: ConditionOperator::Contains,
                value: "privacy".to_string(),
            }],
            automated_checks: vec![AutomatedCheck {
                id: "dpia-freshness".to_string(),
                name: "DPIA is current".to_string(),
                check_type: CheckType::Script,
                implementation: "dpia_current".to_string(),
                parameters: BTreeMap::new(),
                schedule: CheckSchedule::default(),
                timeout_secs: 10,
                alert_thresholds: AlertThresholds {
                    critical: Some(1.0),
                    ..Default::default()
                },
                enabled: true,
                last_executed: None,
                next_execution: chrono_epoch(),
                success_count: 0,
                failure_count: 0,
            }],
            manual_checks: Vec::new(),
            enabled: true,
        }],
    };

    let service = AuditService::builder()
        .with_rules(rules)
        .register_check_handler("dpia_current", |_| {
            Ok(CheckOutcome::fail("DPIA last reviewed 14 months ago"))
        })
        .build()?;
    service.start()?;
    Ok(service)
}

fn chrono_epoch() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::<chrono::Utc>::MIN_UTC
}

/// Log the shared demo event sequence.
fn log_scenario_events(service: &AuditService) -> AuditResult<()> {
    service.log_event(
        AuditEventType::UserAction,
        "privacy_setting_changed",
        AuditActor::user("u-1001"),
        AuditResource::internal("privacy/ads", "privacy_setting"),
        Outcome::Success,
        EventDetails::UserAction {
            description: "disabled personalized ads".to_string(),
            changes: BTreeMap::from([("ads_personalization".to_string(), "off".to_string())]),
        },
        LogOptions::default(),
    )?;

    service.log_event(
        AuditEventType::Security,
        "threat_detected",
        AuditActor::system("risk-scorer"),
        AuditResource::internal("session-88", "session"),
        Outcome::Failure,
        EventDetails::Security {
            risk_score: 91,
            indicators: vec!["token_reuse".to_string(), "geo_velocity".to_string()],
            description: "session flagged by the risk scorer".to_string(),
        },
        LogOptions::default(),
    )?;

    service.log_event(
        AuditEventType::System,
        "retention_sweep_completed",
        AuditActor::system("custodia"),
        AuditResource::internal("default", "audit_trail"),
        Outcome::Success,
        EventDetails::System {
            component: "retention".to_string(),
            message: "nightly sweep".to_string(),
        },
        LogOptions::default(),
    )?;

    service.flush_now()
}

// ── Demo flows ────────────────────────────────────────────────────────────────

fn run_scenario() -> AuditResult<()> {
    let service = seeded_service()?;
    log_scenario_events(&service)?;

    let all = service.search_events("", &SearchFilters::default())?;
    println!("Logged {} events (including derived compliance events):\n", all.len());
    for event in &all {
        println!(
            "  [{:<10}] {:<28} severity={:<8} synthetic={}",
            event.event_type.name(),
            event.action,
            event.severity.name(),
            event.synthetic,
        );
    }

    let metrics = service.metrics()?;
    println!("\nMetrics: {} events total, {:?} by type", metrics.total_events, metrics.events_by_type);

    service.shutdown()
}

fn run_assessment() -> AuditResult<()> {
    let service = seeded_service()?;
    log_scenario_events(&service)?;

    let assessment_id =
        service.run_compliance_assessment(ComplianceFramework::Gdpr, "demo-app", "alice")?;
    let assessment = service.assessment(&assessment_id)?;

    println!(
        "Assessment {}: score {} / 100, status {}, {} finding(s)",
        assessment_id,
        assessment.score,
        assessment.status.name(),
        assessment.findings.len(),
    );

    let report_key = service.generate_compliance_report(&assessment_id, ReportFormat::Html)?;
    println!("Report written to blob '{report_key}'");

    service.shutdown()
}

fn run_verification() -> AuditResult<()> {
    let service = seeded_service()?;
    log_scenario_events(&service)?;

    let intact = service.verify_audit_trail("default")?;
    println!(
        "Hash chain verification: {}",
        if intact { "INTACT" } else { "BROKEN" }
    );

    service.shutdown()
}
