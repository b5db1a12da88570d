use super::{bootstrap, short_id};
use crate::benchmark::{ApplyRequest, BenchmarkError};
use crate::Result;
use colored::Colorize;
use dialoguer::Confirm;

pub async fn run(session: &str, target: Option<String>, allow_dirty: bool) -> Result<()> {
    let app = bootstrap()?;

    let request = ApplyRequest {
        session_id: session.to_string(),
        target_session_id: target,
        allow_dirty,
    };

    match app.bench.apply(request.clone()).await {
        Ok(()) => {
            println!(
                "{}",
                format!("✅ Variant applied to the workspace ({})", short_id(session)).green()
            );
            Ok(())
        }
        Err(BenchmarkError::WorkingTreeDirty { message }) => {
            eprintln!("{}", format!("⚠ {}", message).yellow());
            let confirmed = Confirm::new()
                .with_prompt("Overwrite uncommitted changes in the workspace?")
                .default(false)
                .interact()?;
            if !confirmed {
                println!("Aborted; the workspace was left untouched.");
                return Ok(());
            }
            app.bench
                .apply(ApplyRequest {
                    allow_dirty: true,
                    ..request
                })
                .await?;
            println!(
                "{}",
                format!("✅ Variant applied to the workspace ({})", short_id(session)).green()
            );
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
