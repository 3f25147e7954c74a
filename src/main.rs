//! gamelib-demo - Bulk Update Walkthrough
//!
//! Builds an observable game library with a derived "top rated" view, then
//! runs a cancellable bulk update over it: a main sub-task scans the library,
//! independent sub-tasks update it in batches, and the result is committed to
//! the list as one buffered change.

use std::sync::Arc;
use std::time::Duration;

use gamelib_runtime::config::Config;
use gamelib_runtime::list::{ListError, ListView, ObservableList};
use gamelib_runtime::task::{Task, TaskContext, TaskHandle, TaskKind};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
struct Game {
    id: u32,
    title: String,
    rating: u8,
    metadata_synced: bool,
}

type Library = Arc<Mutex<ObservableList<Game>>>;

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamelib_runtime=debug,gamelib_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        games = config.games,
        step_ms = config.step.as_millis() as u64,
        timeout_secs = config.timeout.as_secs(),
        "Loaded configuration"
    );

    let ctx = TaskContext::new();
    let library: Library = Arc::new(Mutex::new(ObservableList::new(seed_games(config.games))));
    let top_rated = library
        .lock()
        .await
        .view()
        .filtering(&ctx, |game: &Game| game.rating >= 8)
        .sorting_by(&ctx, |game: &Game| std::cmp::Reverse(game.rating));
    info!(count = top_rated.len(), "Top-rated view ready");
    tokio::spawn(watch_top_rated(top_rated.clone()));

    let mut root = bulk_update(Arc::clone(&library), config.step).with_done_message(|ok| {
        if ok {
            "Library updated".to_string()
        } else {
            "Library update stopped".to_string()
        }
    });
    let handle = root.handle();
    tokio::spawn(report(handle.clone()));
    tokio::spawn(cancel_on_interrupt(ctx.clone(), config.timeout));

    match root.run(&ctx).await {
        Ok(count) => info!(updated = count, "Bulk update finished"),
        Err(e) if e.is_cancelled() => warn!("Bulk update cancelled"),
        Err(e) => return Err(e.into()),
    }
    info!(done = %handle.done_message().await, "Root task terminated");

    let top: Vec<String> = top_rated
        .snapshot()
        .iter()
        .take(3)
        .map(|game| format!("{} ({})", game.title, game.rating))
        .collect();
    info!(top = ?top, "Top rated after update");

    ctx.cancel();
    Ok(())
}

fn seed_games(count: usize) -> Vec<Game> {
    (0..count as u32)
        .map(|id| Game {
            id,
            title: format!("Game {:03}", id),
            rating: (id * 7 % 10) as u8,
            metadata_synced: false,
        })
        .collect()
}

fn bulk_update(library: Library, step: Duration) -> Task<usize> {
    Task::new("Bulk update", TaskKind::Long, move |scope| async move {
        let games = library.lock().await.items().to_vec();
        let scanned = scope.run_main_task(scan(games, step)).await?;

        scope.set_message1("Syncing metadata");
        let batches = scanned
            .chunks(BATCH_SIZE)
            .enumerate()
            .map(|(i, batch)| scope.run_sub_task(sync_batch(i + 1, batch.to_vec(), step)));
        let updated: Vec<Game> = futures::future::try_join_all(batches)
            .await?
            .into_iter()
            .flatten()
            .collect();

        let count = updated.len();
        library.lock().await.buffered(|list| {
            for game in updated {
                if let Some(index) = list.items().iter().position(|g| g.id == game.id) {
                    list.set(index, game)?;
                }
            }
            Ok::<_, ListError>(())
        })?;
        scope.set_message2(format!("{} games committed", count));
        Ok(count)
    })
}

fn scan(games: Vec<Game>, step: Duration) -> Task<Vec<Game>> {
    Task::new("Scanning library", TaskKind::Long, move |scope| async move {
        scope.set_message1(format!("Scanning {} games", games.len()));
        let scope = &scope;
        scope
            .try_map_with_progress(games, move |mut game| async move {
                scope.set_message2(game.title.clone());
                tokio::time::sleep(step).await;
                game.rating = (game.rating + 1).min(10);
                Ok(game)
            })
            .await
    })
}

fn sync_batch(batch: usize, games: Vec<Game>, step: Duration) -> Task<Vec<Game>> {
    Task::new(format!("Batch {}", batch), TaskKind::Quick, move |scope| async move {
        let scope = &scope;
        scope
            .try_map_with_progress(games, move |mut game| async move {
                tokio::time::sleep(step).await;
                game.metadata_synced = true;
                scope.set_message1(format!("Synced {}", game.title));
                Ok(game)
            })
            .await
    })
}

async fn report(handle: TaskHandle) {
    let mut progress = handle.progress_channel();
    let mut sub_tasks = handle.sub_tasks();
    loop {
        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = *progress.borrow_and_update();
                info!(
                    progress = %format!("{:.0}%", value * 100.0),
                    message = %handle.message1(),
                    detail = %handle.message2(),
                    "{}", handle.title()
                );
            }
            Some(child) = sub_tasks.recv() => {
                debug!(task_id = %child.id(), title = %child.title(), "Sub-task started");
            }
        }
    }
}

async fn watch_top_rated(view: ListView<Game>) {
    let mut changes = view.changes();
    while let Some(event) = changes.recv().await {
        info!(kind = event.kind(), count = view.len(), "Top-rated view changed");
    }
}

async fn cancel_on_interrupt(ctx: TaskContext, timeout: Duration) {
    tokio::select! {
        _ = ctx.cancelled() => return,
        _ = tokio::signal::ctrl_c() => warn!("Interrupted, cancelling"),
        _ = tokio::time::sleep(timeout) => warn!(timeout_secs = timeout.as_secs(), "Deadline reached, cancelling"),
    }
    ctx.cancel();
}
