use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::config::SyncConfig;
use crate::sync::{BatchResult, ChangeRecord, ChangeStatus, PushOutcome, SyncCursor, SyncStatus};

const MAX_ERROR_WIDTH: usize = 60;

fn age(since: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(since);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let head: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{head}...")
}

fn status_icon(status: ChangeStatus) -> String {
    match status {
        ChangeStatus::Pending => "○".yellow().to_string(),
        ChangeStatus::Syncing => "▶".cyan().to_string(),
        ChangeStatus::Synced => "✓".green().to_string(),
        ChangeStatus::Failed => "✗".red().to_string(),
    }
}

/// Format engine status as a summary block
pub fn format_status_pretty(status: &SyncStatus) -> String {
    let mut lines = Vec::new();

    lines.push("Sync Status".bold().to_string());
    lines.push("─".repeat(40));

    let state = if !status.enabled {
        "disabled".dimmed().to_string()
    } else if status.is_syncing {
        "syncing".cyan().to_string()
    } else {
        "idle".green().to_string()
    };
    lines.push(format!("  State:      {state}"));

    lines.push(format!(
        "  Pending:    {} {}",
        status.pending,
        if status.pending > 0 { "changes waiting".dimmed() } else { "".dimmed() }
    ));
    if status.syncing > 0 {
        lines.push(format!("  Syncing:    {}", status.syncing));
    }
    lines.push(format!(
        "  Failed:     {} {}",
        status.failed,
        if status.failed > 0 { "changes need attention".red() } else { "".normal() }
    ));
    lines.push(format!("  Synced:     {}", status.synced));
    lines.push(format!("  Total:      {}", status.total));

    if let Some(oldest) = status.oldest_pending {
        lines.push(format!("  Oldest:     {}", age(oldest).dimmed()));
    }

    if status.failed > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'bizsync list --status failed' to inspect, 'bizsync retry --all' to requeue"
                .dimmed()
                .to_string(),
        );
    } else if status.enabled && status.pending > 0 {
        lines.push(String::new());
        lines.push("Run 'bizsync run' to push pending changes".dimmed().to_string());
    }

    lines.join("\n")
}

/// Format the outcome of one batch
pub fn format_batch_pretty(result: &BatchResult) -> String {
    if result.total() == 0 {
        return "No pending changes to push.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!(
        "Pushed {}, failed {}, skipped {}",
        result.summary.pushed.to_string().green(),
        result.summary.failed.to_string().red(),
        result.summary.skipped
    ));
    lines.push("─".repeat(60));

    for item in &result.results {
        let label = format!("{} {}.{}", item.operation, item.table_name, item.record_id);
        match &item.outcome {
            PushOutcome::Pushed => lines.push(format!("{} {:<6} {label}", "✓".green(), item.id)),
            PushOutcome::Skipped => {
                lines.push(format!("{} {:<6} {}", "○".yellow(), item.id, label.dimmed()));
            }
            PushOutcome::Failed(error) => {
                lines.push(format!("{} {:<6} {label}", "✗".red(), item.id));
                lines.push(format!("         {}", truncate(error, MAX_ERROR_WIDTH).red()));
            }
        }
    }

    lines.join("\n")
}

/// Format captured changes as a table
pub fn format_records_pretty(records: &[ChangeRecord], title: &str) -> String {
    if records.is_empty() {
        return format!("{title} (0 changes)\n  No changes");
    }

    let mut output = format!("{title} ({} changes)\n", records.len());
    output.push_str(&format!(
        "{:<6} {:<3} {:<8} {:<28} {:<7} {}\n",
        "ID", "", "Op", "Record", "Tries", "Created"
    ));
    output.push_str(&"─".repeat(72));
    output.push('\n');

    for record in records {
        let target = format!("{}.{}", record.change.table_name, record.change.record_id);
        output.push_str(&format!(
            "{:<6} {:<3} {:<8} {:<28} {:<7} {}\n",
            record.id,
            status_icon(record.status),
            record.change.operation.as_str(),
            truncate(&target, 28),
            record.retry_count,
            record.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        ));

        if let Some(error) = &record.error_message {
            output.push_str(&format!("       {}\n", truncate(error, MAX_ERROR_WIDTH).red()));
        }
    }

    output
}

/// Format a single captured change with all fields
pub fn format_record_pretty(record: &ChangeRecord) -> String {
    let mut output = format!(
        "{} {} {}.{}\n",
        status_icon(record.status),
        record.change.operation.as_str().bold(),
        record.change.table_name,
        record.change.record_id
    );
    output.push_str(&format!("  {}: {}\n", "ID".dimmed(), record.id));
    output.push_str(&format!("  {}: {}\n", "Status".dimmed(), record.status));

    if record.retry_count > 0 {
        output.push_str(&format!("  {}: {}\n", "Failures".dimmed(), record.retry_count));
    }
    if let Some(error) = &record.error_message {
        output.push_str(&format!("  {}: {}\n", "Error".dimmed(), error.red()));
    }
    if let Some(payload) = &record.change.payload {
        output.push_str(&format!("  {}: {}\n", "Payload".dimmed(), payload));
    }

    output.push_str(&format!(
        "  {}: {}\n",
        "Created".dimmed(),
        record.created_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if let Some(synced) = record.synced_at {
        output.push_str(&format!(
            "  {}: {}\n",
            "Synced".dimmed(),
            synced.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    output
}

/// Format table cursors
pub fn format_cursors_pretty(cursors: &[SyncCursor]) -> String {
    if cursors.is_empty() {
        return "Tables (0)\n  No tables have been configured or pushed yet".to_string();
    }

    let mut output = format!("Tables ({})\n", cursors.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for cursor in cursors {
        let state = if cursor.sync_enabled { "on ".green() } else { "off".red() };
        let pushed = cursor
            .last_push_at
            .map_or_else(|| "never pushed".to_string(), |at| format!("pushed {}", age(at)));
        output.push_str(&format!(
            "{state} {:<30} {}  {}\n",
            cursor.table_name.bold(),
            pushed.dimmed(),
            cursor.conflict_policy.as_str().dimmed()
        ));
    }

    output
}

/// Format effective configuration with the API key masked
pub fn format_config_pretty(config: &SyncConfig) -> String {
    let mut lines = Vec::new();
    let flag = |on: bool| if on { "yes".green() } else { "no".dimmed() };

    lines.push("Sync Configuration".bold().to_string());
    lines.push("─".repeat(40));
    lines.push(format!("  Enabled:          {}", flag(config.enabled)));
    lines.push(format!(
        "  Remote URL:       {}",
        if config.remote.url.is_empty() { "(not set)".dimmed().to_string() } else { config.remote.url.clone() }
    ));
    lines.push(format!(
        "  API key:          {}",
        if config.remote.api_key.is_empty() {
            "(not set)".dimmed().to_string()
        } else {
            config.remote.masked_key()
        }
    ));
    if let Some(schema) = &config.remote.schema {
        lines.push(format!("  Schema:           {schema}"));
    }
    lines.push(format!("  Interval:         {}s", config.interval_secs));
    lines.push(format!("  Sync on startup:  {}", flag(config.sync_on_startup)));
    lines.push(format!("  Auto sync:        {}", flag(config.auto_sync)));
    lines.push(format!("  Startup delay:    {}s", config.startup_delay_secs));
    lines.push(format!("  Batch size:       {}", config.batch_size));
    lines.push(format!("  Request timeout:  {}s", config.request_timeout_secs));
    lines.push(format!("  Retention:        {} days", config.retention_days));

    lines.join("\n")
}
