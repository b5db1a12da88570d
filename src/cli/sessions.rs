use super::{bootstrap, short_id};
use crate::benchmark::SessionBenchmarkState;
use crate::session::SessionStore;
use crate::Result;
use colored::Colorize;

pub async fn run() -> Result<()> {
    let app = bootstrap()?;

    let sessions = app.sessions.list()?;
    if sessions.is_empty() {
        println!("{}", "No sessions yet. Create one with: benchd start".yellow());
        return Ok(());
    }

    for session in sessions {
        let role = match &session.benchmark {
            Some(SessionBenchmarkState::Parent(_)) => "parent".cyan(),
            Some(SessionBenchmarkState::Child(_)) => "child".green(),
            None => "-".bright_black(),
        };
        let title = session.title.as_deref().unwrap_or("(untitled)");
        println!(
            " {}  {:<8} {:<40} {}",
            short_id(&session.id),
            role,
            title,
            session.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
