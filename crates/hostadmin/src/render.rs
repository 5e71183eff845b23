//! Text and JSON output

use anyhow::Result;
use clap::ValueEnum;
use comfy_table::{Cell, Color, Table};
use hostadmin_core::{
    BootstrapReport, Error, Journal, MainDomain, MigrationReport, PendingUpdates,
    PostinstallReport, UpgradeReport,
};
use serde_json::{Value, json};

use crate::messages;

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Messages and tables for a terminal
    Text,
    /// One JSON document with events and result
    Json,
}

/// Result of a command
pub enum Report {
    MainDomain(MainDomain),
    Postinstall(PostinstallReport),
    Updates(PendingUpdates),
    Upgrade(UpgradeReport),
    Bootstrap(BootstrapReport),
    Migration(MigrationReport),
    Nothing,
}

impl Report {
    fn to_json(&self) -> Result<Value> {
        Ok(match self {
            Self::MainDomain(r) => serde_json::to_value(r)?,
            Self::Postinstall(r) => serde_json::to_value(r)?,
            Self::Updates(r) => serde_json::to_value(r)?,
            Self::Upgrade(r) => serde_json::to_value(r)?,
            Self::Bootstrap(r) => serde_json::to_value(r)?,
            Self::Migration(r) => serde_json::to_value(r)?,
            Self::Nothing => Value::Null,
        })
    }

    fn to_text(&self) -> String {
        match self {
            Self::MainDomain(MainDomain::Current {
                current_main_domain,
            }) => current_main_domain.clone(),
            Self::MainDomain(MainDomain::Changed { old, new }) => {
                format!("Main domain: {} (was {})", new, old)
            }
            Self::Postinstall(r) => format!(
                "Main domain: {}\nDirectory entries: {} created, {} already present",
                r.domain,
                r.directory.created.len(),
                r.directory.skipped.len()
            ),
            Self::Updates(r) => updates_text(r),
            Self::Upgrade(r) => upgrade_text(r),
            Self::Bootstrap(r) => bootstrap_table(r).to_string(),
            Self::Migration(r) => migration_text(r),
            Self::Nothing => String::new(),
        }
    }
}

fn updates_text(updates: &PendingUpdates) -> String {
    let mut sections = Vec::new();
    if !updates.packages.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["PACKAGE", "FULL NAME"]);
        for package in &updates.packages {
            table.add_row(vec![Cell::new(&package.name), Cell::new(&package.fullname)]);
        }
        sections.push(table.to_string());
    }
    if !updates.apps.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["APP", "LABEL"]);
        for app in &updates.apps {
            table.add_row(vec![Cell::new(&app.id), Cell::new(&app.label)]);
        }
        sections.push(table.to_string());
    }
    sections.join("\n")
}

fn upgrade_text(report: &UpgradeReport) -> String {
    let mut lines = Vec::new();
    if !report.held_back.is_empty() {
        lines.push(format!("Held back: {}", report.held_back.join(", ")));
    }
    if let Some(job) = &report.deferred_job {
        lines.push(format!("Deferred job: {}", job.display()));
    }
    if let Some(log) = &report.log {
        lines.push("API log:".to_string());
        lines.extend(log.iter().map(|line| format!("  {}", line)));
    }
    lines.join("\n")
}

fn bootstrap_table(report: &BootstrapReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ENTRY", "STATUS"]);
    for rdn in &report.created {
        table.add_row(vec![Cell::new(rdn), Cell::new("created").fg(Color::Green)]);
    }
    for rdn in &report.skipped {
        table.add_row(vec![Cell::new(rdn), Cell::new("present").fg(Color::DarkGrey)]);
    }
    table
}

fn migration_text(report: &MigrationReport) -> String {
    if report.failures.is_empty() {
        return format!("{} steps completed", report.steps);
    }
    let mut table = Table::new();
    table.set_header(vec!["STEP", "COMMAND", "REASON"]);
    for failure in &report.failures {
        table.add_row(vec![
            Cell::new(failure.index),
            Cell::new(&failure.step),
            Cell::new(&failure.reason).fg(Color::Red),
        ]);
    }
    format!(
        "{} of {} steps failed\n{}",
        report.failures.len(),
        report.steps,
        table
    )
}

/// Print the journal and the result of a successful command
pub fn success(format: OutputFormat, journal: &Journal, report: &Report) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for event in journal.events() {
                println!("{}", messages::event_line(event));
            }
            let text = report.to_text();
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        OutputFormat::Json => {
            let doc = json!({"events": journal, "result": report.to_json()?});
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}

/// Human description of a failed command
pub fn describe(error: &anyhow::Error) -> String {
    match error.downcast_ref::<Error>() {
        Some(e) => match e.message_key() {
            Some(key) => format!("{} ({})", messages::template(key), e),
            None => e.to_string(),
        },
        None => format!("{:#}", error),
    }
}

/// Print the journal and the error of a failed command
pub fn failure(format: OutputFormat, journal: &Journal, error: &anyhow::Error) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for event in journal.events() {
                println!("{}", messages::event_line(event));
            }
            eprintln!("Error: {}", describe(error));
        }
        OutputFormat::Json => {
            let key = error
                .downcast_ref::<Error>()
                .and_then(Error::message_key)
                .map(|key| key.as_str());
            let doc = json!({
                "events": journal,
                "error": {"key": key, "message": describe(error)},
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostadmin_core::MessageKey;

    #[test]
    fn test_describe_uses_catalogue() {
        let error = anyhow::Error::new(Error::AlreadyInstalled);
        assert!(describe(&error).starts_with("YunoHost is already installed"));

        let other = anyhow::anyhow!("plain failure");
        assert_eq!(describe(&other), "plain failure");
    }

    #[test]
    fn test_main_domain_text() {
        let current = Report::MainDomain(MainDomain::Current {
            current_main_domain: "example.org".into(),
        });
        assert_eq!(current.to_text(), "example.org");
        assert_eq!(
            current.to_json().unwrap(),
            json!({"current_main_domain": "example.org"})
        );
    }

    #[test]
    fn test_migration_failures_table() {
        let report = MigrationReport {
            steps: 12,
            failures: vec![hostadmin_core::steps::StepFailure {
                index: 6,
                step: "run `apt-get dist-upgrade`".into(),
                reason: "exit code 100".into(),
            }],
        };
        let text = Report::Migration(report).to_text();
        assert!(text.starts_with("1 of 12 steps failed"));
        assert!(text.contains("apt-get dist-upgrade"));
    }

    #[test]
    fn test_journal_in_json() {
        let mut journal = Journal::new();
        journal.warning_with(MessageKey::DomainZoneNotFound, [("domain", "example.org")]);
        let doc = json!({"events": &journal});
        assert_eq!(doc["events"][0]["key"], "domain_zone_not_found");
        assert_eq!(doc["events"][0]["level"], "warning");
        assert_eq!(doc["events"][0]["params"]["domain"], "example.org");
    }
}
