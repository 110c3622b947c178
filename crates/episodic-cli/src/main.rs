mod cli;

use std::process::ExitCode;

use clap::Parser;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use episodic_core::config::AppConfig;
use episodic_runtime::{AddShowsOutcome, Runtime, RuntimeError, TaskEvent};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr and to a daily file in the data directory.
fn init_logging() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "episodic=info".into());
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let log_dir = AppConfig::data_dir();
    if std::fs::create_dir_all(&log_dir).is_err() {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .init();
        return None;
    }

    let (file, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "episodic.log"));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_ansi(false).with_writer(file))
        .init();
    Some(guard)
}

async fn run(command: Command) -> Result<(), RuntimeError> {
    let rt = Runtime::new()?;

    match command {
        Command::Login { token, expires_in } => {
            rt.login_trakt(token, expires_in).await?;
            println!("Saved trakt credentials.");
        }
        Command::Add {
            tvdb_ids,
            language,
            silent,
            merge,
        } => {
            let task = rt.add_show_task();
            task.add_shows(cli::search_results(&tvdb_ids, &language), silent, merge);
            cancel_on_ctrl_c(task.cancellation_token());

            let events = rt.events().subscribe();
            let outcome = with_events(events, task.spawn(), print_event).await?;
            match outcome {
                AddShowsOutcome::Finished {
                    added,
                    existing,
                    failed,
                    merge_completed,
                } => {
                    println!("Added {added}, already present {existing}, failed {failed}.");
                    if merge {
                        println!("Cloud merge completed: {merge_completed}");
                    }
                }
                other => println!("Shows not added: {other:?}"),
            }
        }
        Command::Flag { target } => {
            let request = target.into_request();
            let events = rt.events().subscribe();
            let outcome = with_events(events, rt.flag_task().spawn(request), print_event).await?;
            println!(
                "{} ({} episodes changed locally)",
                if outcome.success { "Done" } else { "Failed" },
                outcome.changed
            );
        }
        Command::Replay => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let summary = rt.replayer().run(&cancel).await?;
            println!(
                "Submitted {}, parked {}, still queued {}.",
                summary.submitted,
                summary.parked,
                rt.pending_outbound().await?
            );
        }
        Command::Search { query } => {
            let format = rt.config().display.number_format;
            for row in rt.search(&query).await? {
                let show = rt
                    .show(row.show_id)
                    .await?
                    .map_or_else(|| row.show_id.to_string(), |s| s.title);
                println!(
                    "{show} {} {}{}",
                    format.format(row.season, row.number),
                    row.title.as_deref().unwrap_or(""),
                    if row.watched { " [watched]" } else { "" }
                );
            }
        }
    }

    Ok(())
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}

/// Await a background task, handing bus events to `on_event` while it runs.
/// Subscribe before spawning the task so its first events are not missed.
async fn with_events<T>(
    mut rx: broadcast::Receiver<TaskEvent>,
    mut handle: JoinHandle<T>,
    mut on_event: impl FnMut(&TaskEvent),
) -> Result<T, RuntimeError> {
    loop {
        tokio::select! {
            result = &mut handle => {
                let value = result?;
                while let Ok(event) = rx.try_recv() {
                    on_event(&event);
                }
                return Ok(value);
            }
            event = rx.recv() => match event {
                Ok(event) => on_event(&event),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Missed events"),
                Err(RecvError::Closed) => return Ok(handle.await?),
            },
        }
    }
}

fn print_event(event: &TaskEvent) {
    match event {
        TaskEvent::FlagStatus { message, .. } => println!("{message}"),
        TaskEvent::ShowAdded {
            show_id,
            message,
            successful,
        } => match (message, show_id) {
            (Some(message), _) => println!("{message}"),
            (None, Some(show_id)) if *successful => println!("Added show {show_id}"),
            _ => {}
        },
        TaskEvent::FlagCompleted { .. }
        | TaskEvent::AddShowsFinished { .. }
        | TaskEvent::DataChanged { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use episodic_runtime::traits::EventSink;
    use episodic_runtime::EventBus;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_with_events_sees_events_published_at_spawn() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let publisher = bus.clone();
        let handle = tokio::spawn(async move {
            publisher.publish(TaskEvent::FlagStatus {
                message: "No connection".into(),
                success: false,
            });
            publisher.publish(TaskEvent::AddShowsFinished {
                added: 0,
                merge_completed: false,
            });
            7
        });

        let mut seen = Vec::new();
        let value = with_events(rx, handle, |event| seen.push(event.clone()))
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], TaskEvent::FlagStatus { .. }));
    }
}
