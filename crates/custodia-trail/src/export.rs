//! Rendering of event batches for export and forwarding.
//!
//! JSON goes through serde; CSV through the `csv` crate with an explicit
//! header row; XML is written by hand with attribute escaping since exports
//! only need a flat element-per-event document.

use custodia_contracts::{
    error::{AuditError, AuditResult},
    event::AuditEvent,
    trail::ExportFormat,
};

/// Render `events` in the requested format.
pub fn render(events: &[AuditEvent], format: ExportFormat) -> AuditResult<Vec<u8>> {
    match format {
        ExportFormat::Json => serde_json::to_vec_pretty(events)
            .map_err(|e| AuditError::ExportFailed { reason: format!("json: {e}") }),
        ExportFormat::Csv => render_csv(events),
        ExportFormat::Xml => Ok(render_xml(events)),
    }
}

fn render_csv(events: &[AuditEvent]) -> AuditResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);

    writer
        .write_record([
            "id",
            "trail_id",
            "sequence",
            "timestamp",
            "event_type",
            "severity",
            "actor",
            "resource",
            "action",
            "outcome",
            "synthetic",
            "prev_hash",
            "hash",
        ])
        .map_err(|e| AuditError::ExportFailed { reason: format!("csv header: {e}") })?;

    for event in events {
        writer
            .write_record([
                event.id.to_string(),
                event.trail_id.clone(),
                event.sequence.to_string(),
                event.timestamp.to_rfc3339(),
                event.event_type.name().to_string(),
                event.severity.name().to_string(),
                event.actor.id.clone(),
                event.resource.id.clone(),
                event.action.clone(),
                format!("{:?}", event.outcome).to_lowercase(),
                event.synthetic.to_string(),
                event.prev_hash.clone(),
                event.this_hash.clone(),
            ])
            .map_err(|e| AuditError::ExportFailed { reason: format!("csv row: {e}") })?;
    }

    writer
        .into_inner()
        .map_err(|e| AuditError::ExportFailed { reason: format!("csv flush: {e}") })
}

fn render_xml(events: &[AuditEvent]) -> Vec<u8> {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<audit_events>\n");

    for event in events {
        out.push_str(&format!(
            "  <event id=\"{}\" trail=\"{}\" sequence=\"{}\" timestamp=\"{}\" \
             type=\"{}\" severity=\"{}\" outcome=\"{:?}\" synthetic=\"{}\">\n",
            event.id,
            xml_escape(&event.trail_id),
            event.sequence,
            event.timestamp.to_rfc3339(),
            event.event_type.name(),
            event.severity.name(),
            event.outcome,
            event.synthetic,
        ));
        out.push_str(&format!(
            "    <actor id=\"{}\" kind=\"{:?}\"/>\n",
            xml_escape(&event.actor.id),
            event.actor.kind,
        ));
        out.push_str(&format!(
            "    <resource id=\"{}\" kind=\"{}\"/>\n",
            xml_escape(&event.resource.id),
            xml_escape(&event.resource.kind),
        ));
        out.push_str(&format!("    <action>{}</action>\n", xml_escape(&event.action)));
        out.push_str(&format!("    <prev_hash>{}</prev_hash>\n", event.prev_hash));
        out.push_str(&format!("    <hash>{}</hash>\n", event.this_hash));
        out.push_str("  </event>\n");
    }

    out.push_str("</audit_events>\n");
    out.into_bytes()
}

/// Escape the five XML-reserved characters.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
