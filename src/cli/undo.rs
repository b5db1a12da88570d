use super::{bootstrap, short_id};
use crate::benchmark::{BenchmarkError, UndoRequest};
use crate::Result;
use colored::Colorize;
use dialoguer::Confirm;

pub async fn run(session: &str, allow_dirty: bool) -> Result<()> {
    let app = bootstrap()?;

    let request = UndoRequest {
        session_id: session.to_string(),
        allow_dirty,
    };

    match app.bench.undo(request.clone()).await {
        Ok(()) => {
            println!(
                "{}",
                format!("↩ Workspace restored to its pre-apply state ({})", short_id(session))
                    .green()
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
                .undo(UndoRequest {
                    allow_dirty: true,
                    ..request
                })
                .await?;
            println!(
                "{}",
                format!("↩ Workspace restored to its pre-apply state ({})", short_id(session))
                    .green()
            );
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
