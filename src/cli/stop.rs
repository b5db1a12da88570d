use super::{bootstrap, short_id};
use crate::Result;
use colored::Colorize;

pub async fn run(session: &str) -> Result<()> {
    let app = bootstrap()?;

    if app.bench.resolve_parent(session)?.is_none() {
        println!(
            "{}",
            format!("No active benchmark on session {}", short_id(session)).yellow()
        );
        return Ok(());
    }

    app.bench.stop(session).await?;
    println!(
        "{}",
        format!("🧹 Benchmark stopped and worktrees removed ({})", short_id(session)).green()
    );
    Ok(())
}
