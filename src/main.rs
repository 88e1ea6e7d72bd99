//! Read-aloud sync simulator.
//!
//! ```text
//! tts-sync [paragraph-file]
//! ```
//!
//! Plays one chapter through the [`SyncOrchestrator`] against a simulated
//! speech engine, with a screen-off/on cycle halfway through and a few
//! rejected refills, then prints the final position.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Read paragraphs (blank-line separated) or use the built-in text.
//! 4. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 5. Spawn the orchestrator and a notice printer.
//! 6. Drive the simulated engine until the chapter finishes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tts_sync::{
    config::AppConfig,
    engine::{EngineEvent, SimulatedEngine},
    pipeline::{PlaybackPhase, SharedState, SyncEvent, SyncNotice, SyncOrchestrator},
    session::ChapterId,
    store::{JsonFileStore, MemoryStore},
    view::RecordingView,
};

/// Pause between simulated engine callbacks.
const TICK: Duration = Duration::from_millis(15);

const BUILT_IN: &[&str] = &[
    "The lamps along the quay were already lit when the ferry came in.",
    "Nobody on board seemed to be in a hurry to leave.",
    "A boy with a basket of oranges worked his way along the rail.",
    "Somewhere below deck a dog had started barking and would not stop.",
    "The captain leaned out of the wheelhouse and shouted something lost to the wind.",
    "Ropes were thrown, caught, thrown again.",
    "At last the gangway came down with a clatter.",
    "She picked up her case and stepped onto the stones.",
    "The town smelled of tar, of bread, of rain that had not yet fallen.",
    "She had been told someone would meet her.",
    "No one did.",
    "She waited until the ferry had emptied and then began to walk.",
];

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

fn read_paragraphs(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read paragraphs from {}", path.display()))?;
    let paragraphs: Vec<String> = text
        .split("\n\n")
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect();
    anyhow::ensure!(!paragraphs.is_empty(), "{} has no paragraphs", path.display());
    Ok(paragraphs)
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

fn phase(state: &SharedState) -> PlaybackPhase {
    match state.lock() {
        Ok(g) => g.phase,
        Err(poisoned) => poisoned.into_inner().phase,
    }
}

async fn send(tx: &mpsc::Sender<SyncEvent>, event: SyncEvent) -> Result<()> {
    tx.send(event)
        .await
        .map_err(|_| anyhow::anyhow!("orchestrator stopped"))
}

async fn simulate(mut config: AppConfig, paragraphs: Vec<String>) -> Result<()> {
    let total = paragraphs.len();
    if total < config.queue.batch_size * 2 {
        // Short text: use small batches so the run still refills.
        config.queue.batch_size = (total / 3).max(2);
        config.queue.low_watermark = 1;
        log::info!(
            "short chapter, batch size {} / low watermark 1",
            config.queue.batch_size
        );
    }
    let settle = config.timing.wake_settle();
    let engine = Arc::new(SimulatedEngine::new());
    let durable = Arc::new(JsonFileStore::new(config.progress_file()));
    log::info!("progress file: {}", durable.path().display());

    // Exhaust the first refill's append attempts.
    engine.fail_next_appends(config.queue.max_append_attempts);

    let (notice_tx, mut notice_rx) = mpsc::channel::<SyncNotice>(32);
    let orchestrator = SyncOrchestrator::new(
        config,
        engine.clone(),
        Arc::new(RecordingView::new()),
        durable,
        Arc::new(MemoryStore::new()),
        notice_tx,
    );
    let state = orchestrator.shared_state();

    let (event_tx, event_rx) = mpsc::channel::<SyncEvent>(64);
    let runner = tokio::spawn(orchestrator.run(event_rx));
    let printer = tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            println!("notice: {notice:?}");
        }
    });

    let chapter = ChapterId::from("1");
    send(
        &event_tx,
        SyncEvent::OpenChapter {
            chapter: chapter.clone(),
            paragraphs,
            autoplay: true,
        },
    )
    .await?;
    tokio::time::sleep(TICK).await;

    let mut spoken = 0usize;
    let mut slept = false;
    loop {
        if !slept && spoken == total / 2 {
            slept = true;
            println!("screen off after {spoken} paragraphs");
            send(&event_tx, SyncEvent::ScreenPower(false)).await?;
            tokio::time::sleep(TICK * 4).await;
            send(&event_tx, SyncEvent::ScreenPower(true)).await?;
            // The reloaded view briefly claims the top of the chapter.
            let stale = format!(r#"{{"type":"save","chapterId":"{chapter}","paragraphIndex":0}}"#);
            send(&event_tx, SyncEvent::ViewJson(stale)).await?;
            tokio::time::sleep(settle + TICK * 4).await;
            println!("screen on");
        }

        match engine.peek_next() {
            Some(id) => {
                send(&event_tx, EngineEvent::Started(id).into()).await?;
                tokio::time::sleep(TICK).await;
                if let Some(id) = engine.finish_next() {
                    send(&event_tx, EngineEvent::Completed(id).into()).await?;
                    spoken += 1;
                }
            }
            None => {
                send(&event_tx, EngineEvent::QueueEmpty.into()).await?;
                tokio::time::sleep(TICK * 2).await;
                if phase(&state) == PlaybackPhase::Idle {
                    break;
                }
            }
        }
        tokio::time::sleep(TICK).await;
    }

    drop(event_tx);
    runner.await.context("orchestrator task failed")?;
    printer.await.context("notice printer failed")?;

    let snapshot = match state.lock() {
        Ok(g) => g.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    println!(
        "chapter {} finished: last completed {} of {} (session {}, {} utterances spoken)",
        snapshot
            .chapter
            .as_ref()
            .map_or_else(|| "-".to_string(), ChapterId::to_string),
        snapshot.position.last_completed_index(),
        snapshot.total_paragraphs,
        snapshot.session,
        spoken,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("tts-sync simulator starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Paragraphs
    let paragraphs = match std::env::args_os().nth(1) {
        Some(path) => read_paragraphs(Path::new(&path))?,
        None => BUILT_IN.iter().map(|p| p.to_string()).collect(),
    };
    log::info!("{} paragraphs loaded", paragraphs.len());

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 5-6. Orchestrator and engine driver
    rt.block_on(simulate(config, paragraphs))
}
