use std::cell::RefCell;
use std::env;
use std::fs;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use rhythm_runtime::input::{TimeSample, TimeSource};
use rhythm_runtime::{
    forever, parse_level, poll_fn, wait, wait_all, wait_first, BoxTask, DiagnosticLog,
    FrameClock, GameLoop, InputBuilder, InputReader, LevelEvent, Resume, RuntimeConfig,
    Scheduler, Task, TaskExt,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct Playthrough {
    played: usize,
    frames_drawn: u64,
}

fn run() -> Result<()> {
    let config = RuntimeConfig::from_args(env::args().skip(1))?;
    let text = fs::read_to_string(&config.level)
        .with_context(|| format!("failed to read level {}", config.level.display()))?;
    let level = parse_level(&text).context("failed to parse level")?;
    let total = level.len();
    println!("Loaded level with {total} event(s)");

    let clock = Arc::new(FrameClock::from_fps(config.fps));
    let diagnostics = DiagnosticLog::new(config.diagnostics);
    let input = InputBuilder::new()
        .source("time", TimeSource::new("time", clock.clone()))
        .build()?;
    let scheduler = Scheduler::new(clock.clone()).with_diagnostics(diagnostics.clone());
    let mut game = GameLoop::new(input, scheduler).with_frame_clock(clock);

    let results = Rc::new(RefCell::new(Playthrough::default()));
    let reader = game.reader();
    let session = Rc::clone(&results);
    game.scheduler_mut().add(
        countdown(diagnostics.clone()).then(move |_| play_level(level, reader, session)),
    );

    let frames = game.run_until_idle(config.max_frames);
    info!("simulation ran {frames} frame(s)");

    let results = results.borrow();
    println!("Finished after {frames} frame(s)");
    println!("Played {}/{total} event(s)", results.played);
    println!("Drew {} frame(s) of targets", results.frames_drawn);
    if !game.scheduler().is_empty() {
        println!(
            "Stopped with {} task(s) still running",
            game.scheduler().len()
        );
    }
    let messages = diagnostics.entries();
    if !messages.is_empty() {
        println!("Diagnostics:");
        for message in messages {
            println!(" - {message}");
        }
    }
    Ok(())
}

fn alert(alerts: DiagnosticLog, message: &'static str) -> impl Task<Output = ()> {
    poll_fn(move |_| {
        println!("{message}");
        alerts.push(message);
        Resume::Completed(())
    })
}

/// "3", "2", "1" a second apart, then "GO".
fn countdown(alerts: DiagnosticLog) -> BoxTask<()> {
    ["3", "2", "1"]
        .into_iter()
        .rev()
        .fold(alert(alerts.clone(), "GO").boxed(), |rest, label| {
            alert(alerts.clone(), label)
                .then(|_| wait(1.0))
                .then(move |_| rest)
                .boxed()
        })
}

/// Plays every event while keeping the targets drawn, until the last event
/// has been played.
fn play_level(
    level: Vec<LevelEvent>,
    reader: InputReader,
    results: Rc<RefCell<Playthrough>>,
) -> impl Task<Output = ()> {
    let events: Vec<BoxTask<()>> = level
        .into_iter()
        .map(|event| play_event(event, reader.clone(), Rc::clone(&results)).boxed())
        .collect();
    let drawn = Rc::clone(&results);
    wait_first(vec![
        forever::<(), _>(move |_| drawn.borrow_mut().frames_drawn += 1).boxed(),
        wait_all(events).map(|_| ()).boxed(),
    ])
    .map(|_| ())
}

/// Waits for the event's start, then holds it for its duration measured in
/// sampled frame deltas.
fn play_event(
    event: LevelEvent,
    reader: InputReader,
    results: Rc<RefCell<Playthrough>>,
) -> impl Task<Output = ()> {
    wait(event.start()).then(move |_| {
        let mut remaining = event.duration();
        poll_fn(move |_| {
            remaining -= reader
                .get::<TimeSample>("time")
                .map_or(0.0, |time| time.delta);
            if remaining > 0.0 {
                return Resume::Suspended;
            }
            results.borrow_mut().played += 1;
            match event {
                LevelEvent::Beat { time, direction } => {
                    println!(" - beat {direction} @ {time:.2}s");
                }
                LevelEvent::Sustain {
                    from,
                    to,
                    direction,
                } => {
                    println!(" - sustain {direction} @ {from:.2}s for {:.2}s", to - from);
                }
            }
            Resume::Completed(())
        })
    })
}
