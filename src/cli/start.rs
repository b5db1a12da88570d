use super::{bootstrap, short_id};
use crate::benchmark::StartOptions;
use crate::models::ModelRef;
use crate::session::{Session, SessionStore};
use crate::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

pub async fn run(
    session: Option<String>,
    count: Option<usize>,
    models: Vec<String>,
    allow_duplicates: bool,
) -> Result<()> {
    let app = bootstrap()?;

    let models = models
        .iter()
        .map(|s| s.parse())
        .collect::<Result<Vec<ModelRef>, _>>()?;

    let session = match session {
        Some(id) => match app.sessions.get(&id) {
            Ok(existing) => existing,
            Err(_) => app.sessions.create(Session::with_id(id))?,
        },
        None => app.sessions.create(Session::new())?,
    };

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    progress.set_message("Snapshotting workspace and seeding worktrees...");
    progress.enable_steady_tick(std::time::Duration::from_millis(100));

    let options = StartOptions {
        count: count.or(Some(app.config.default_children)),
        models,
        allow_duplicates,
    };
    let result = app.bench.start(&session.id, options).await;
    progress.finish_and_clear();
    let record = result?;

    println!(
        "{}",
        format!(
            "🏁 Benchmark started on session {} with {} variants",
            short_id(&session.id),
            record.children.len()
        )
        .cyan()
        .bold()
    );
    println!("   Base snapshot: {}", short_id(record.base_snapshot.as_str()));
    for child in &record.children {
        println!(
            "   {}  {}",
            short_id(&child.session_id).green(),
            child.model.to_string().bold()
        );
    }
    println!();
    println!(
        "   Apply a variant with: benchd apply --session {} --target <variant>",
        short_id(&session.id)
    );

    Ok(())
}
