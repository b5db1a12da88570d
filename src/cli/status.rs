use super::{bootstrap, short_id};
use crate::benchmark::AppliedVariant;
use crate::session::SessionStore;
use crate::Result;
use colored::Colorize;
use serde_json::json;

pub async fn run(session: &str, json: bool) -> Result<()> {
    let app = bootstrap()?;

    if app.sessions.get(session).is_err() {
        if json {
            println!("{}", json!({ "error": "session_not_found", "session": session }));
        } else {
            println!("{}", format!("Session '{}' not found", session).red());
        }
        return Ok(());
    }

    let Some((parent_id, record)) = app.bench.resolve_parent_record(session)? else {
        if json {
            println!("{}", json!({ "error": "no_benchmark", "session": session }));
        } else {
            println!(
                "{}",
                format!("No benchmark attached to session {}", short_id(session)).yellow()
            );
        }
        return Ok(());
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "parent": parent_id,
                "enabled": record.enabled,
                "created_at": record.created_at,
                "base_snapshot": record.base_snapshot,
                "applied": record.applied,
                "children": record.children,
            }))?
        );
        return Ok(());
    }

    println!("{}", format!("Benchmark on: {}", short_id(&parent_id)).cyan().bold());
    println!();
    println!("   Created:  {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("   Base:     {}", short_id(record.base_snapshot.as_str()));
    match &record.applied {
        AppliedVariant::None => println!("   Applied:  {}", "none".bright_black()),
        AppliedVariant::Applied { session_id, checkpoint } => println!(
            "   Applied:  {} (checkpoint {})",
            short_id(session_id).green(),
            short_id(checkpoint.as_str())
        ),
    }
    println!();

    for child in &record.children {
        let marker = if record.applied.session_id() == Some(child.session_id.as_str()) {
            "▶".green()
        } else {
            " ".normal()
        };
        let snapshot = child
            .last_snapshot
            .as_ref()
            .map(|s| short_id(s.as_str()).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            " {} {}  {:<40} snapshot: {}",
            marker,
            short_id(&child.session_id),
            child.model.to_string().bold(),
            snapshot
        );
        if let Some(error) = &child.error {
            println!("     {}", format!("error: {}", error).red());
        }
    }

    Ok(())
}
