//! Assessment report rendering.
//!
//! Reports carry an executive summary, the findings grouped by severity,
//! recommendations and next steps. JSON goes through serde, CSV through the
//! `csv` crate (one row per finding), HTML through an explicit writer, and
//! PDF through a minimal hand-assembled PDF 1.4 document (text only, with a
//! computed xref table) since nothing in the stack renders PDF.

use custodia_contracts::{
    error::{AuditError, AuditResult},
    event::Severity,
};

use crate::assessment::{ComplianceAssessment, ComplianceFinding};

/// Serialization format of a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
    Html,
    Pdf,
}

impl ReportFormat {
    /// File extension used for report blob keys.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }
}

/// Render `assessment` in the requested format.
pub fn render(assessment: &ComplianceAssessment, format: ReportFormat) -> AuditResult<Vec<u8>> {
    match format {
        ReportFormat::Json => serde_json::to_vec_pretty(assessment)
            .map_err(|e| AuditError::ExportFailed { reason: format!("json report: {e}") }),
        ReportFormat::Csv => render_csv(assessment),
        ReportFormat::Html => Ok(render_html(assessment).into_bytes()),
        ReportFormat::Pdf => Ok(render_pdf(&summary_lines(assessment))),
    }
}

/// Findings of one severity, most severe first.
fn findings_by_severity(assessment: &ComplianceAssessment) -> Vec<(Severity, Vec<&ComplianceFinding>)> {
    [Severity::Critical, Severity::High, Severity::Medium, Severity::Low, Severity::Info]
        .into_iter()
        .map(|severity| {
            let group: Vec<&ComplianceFinding> = assessment
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .collect();
            (severity, group)
        })
        .filter(|(_, group)| !group.is_empty())
        .collect()
}

/// Canned remediation guidance per severity band.
fn recommendation(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Remediate immediately; treat as a production incident.",
        Severity::High => "Remediate within the current remediation cycle.",
        Severity::Medium => "Schedule remediation within the next 30 days.",
        Severity::Low => "Track and bundle with routine maintenance.",
        Severity::Info => "No action required; recorded for completeness.",
    }
}

fn render_csv(assessment: &ComplianceAssessment) -> AuditResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);

    writer
        .write_record(["finding_id", "rule_id", "check_id", "severity", "status", "detected_at", "description"])
        .map_err(|e| AuditError::ExportFailed { reason: format!("csv report header: {e}") })?;

    for finding in &assessment.findings {
        writer
            .write_record([
                finding.id.clone(),
                finding.rule_id.clone(),
                finding.check_id.clone(),
                finding.severity.name().to_string(),
                format!("{:?}", finding.status).to_lowercase(),
                finding.detected_at.to_rfc3339(),
                finding.description.clone(),
            ])
            .map_err(|e| AuditError::ExportFailed { reason: format!("csv report row: {e}") })?;
    }

    writer
        .into_inner()
        .map_err(|e| AuditError::ExportFailed { reason: format!("csv report flush: {e}") })
}

fn render_html(assessment: &ComplianceAssessment) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    out.push_str(&format!(
        "  <title>{} Compliance Assessment</title>\n",
        assessment.framework.name()
    ));
    out.push_str("</head>\n<body>\n");

    // Executive summary.
    out.push_str(&format!("  <h1>{} Compliance Assessment</h1>\n", assessment.framework.name()));
    out.push_str("  <h2>Executive Summary</h2>\n  <ul>\n");
    out.push_str(&format!("    <li>Scope: {}</li>\n", html_escape(&assessment.scope)));
    out.push_str(&format!("    <li>Assessor: {}</li>\n", html_escape(&assessment.assessor)));
    out.push_str(&format!("    <li>Completed: {}</li>\n", assessment.completed_at.to_rfc3339()));
    out.push_str(&format!("    <li>Score: {} / 100</li>\n", assessment.score));
    out.push_str(&format!("    <li>Status: {}</li>\n", assessment.status.name()));
    out.push_str(&format!("    <li>Findings: {}</li>\n", assessment.findings.len()));
    out.push_str("  </ul>\n");

    // Findings grouped by severity.
    out.push_str("  <h2>Findings</h2>\n");
    if assessment.findings.is_empty() {
        out.push_str("  <p>No findings. All executed checks passed.</p>\n");
    }
    for (severity, group) in findings_by_severity(assessment) {
        out.push_str(&format!("  <h3>{} ({})</h3>\n  <ul>\n", severity.name(), group.len()));
        for finding in group {
            out.push_str(&format!(
                "    <li>[{}] {}</li>\n",
                html_escape(&finding.rule_id),
                html_escape(&finding.description)
            ));
        }
        out.push_str("  </ul>\n");
    }

    // Recommendations.
    out.push_str("  <h2>Recommendations</h2>\n  <ul>\n");
    for (severity, group) in findings_by_severity(assessment) {
        out.push_str(&format!(
            "    <li>{} findings ({}): {}</li>\n",
            severity.name(),
            group.len(),
            recommendation(severity)
        ));
    }
    out.push_str("  </ul>\n");

    // Next steps.
    out.push_str("  <h2>Next Steps</h2>\n  <ul>\n");
    for item in &assessment.action_plan {
        out.push_str(&format!(
            "    <li>{} (owner {}, due {})</li>\n",
            html_escape(&item.description),
            html_escape(&item.owner),
            item.due_date.format("%Y-%m-%d")
        ));
    }
    for task in &assessment.manual_tasks {
        out.push_str(&format!(
            "    <li>Manual check: {} (assigned to {}, due {})</li>\n",
            html_escape(&task.description),
            html_escape(&task.assigned_to),
            task.due_date.format("%Y-%m-%d")
        ));
    }
    out.push_str("  </ul>\n</body>\n</html>\n");
    out
}

/// The text lines used for the PDF rendering.
fn summary_lines(assessment: &ComplianceAssessment) -> Vec<String> {
    let mut lines = vec![
        format!("{} Compliance Assessment", assessment.framework.name()),
        String::new(),
        format!("Scope: {}", assessment.scope),
        format!("Assessor: {}", assessment.assessor),
        format!("Completed: {}", assessment.completed_at.to_rfc3339()),
        format!("Score: {} / 100   Status: {}", assessment.score, assessment.status.name()),
        String::new(),
        format!("Findings ({}):", assessment.findings.len()),
    ];

    for (severity, group) in findings_by_severity(assessment) {
        lines.push(format!("  {} ({}):", severity.name(), group.len()));
        for finding in group {
            lines.push(format!("    [{}] {}", finding.rule_id, finding.description));
        }
    }

    if !assessment.action_plan.is_empty() {
        lines.push(String::new());
        lines.push("Next steps:".to_string());
        for item in &assessment.action_plan {
            lines.push(format!(
                "  {} (due {})",
                item.description,
                item.due_date.format("%Y-%m-%d")
            ));
        }
    }

    lines
}

/// Assemble a minimal single-page PDF 1.4 document from text lines.
///
/// Object layout: 1 catalog, 2 page tree, 3 page, 4 font, 5 content stream.
/// The xref offsets are computed from the byte positions of each object.
fn render_pdf(lines: &[String]) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 11 Tf\n72 760 Td\n14 TL\n");
    for line in lines {
        content.push_str(&format!("({}) Tj\nT*\n", pdf_escape(line)));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}endstream", content.len(), content),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, object));
    }

    let xref_pos = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_pos}\n%%EOF\n",
        objects.len() + 1
    ));

    out.into_bytes()
}

/// Escape the characters PDF string literals reserve.
fn pdf_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
