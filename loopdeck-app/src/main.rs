//! LoopDeck - keyboard-triggered multi-track loop station
//!
//! Wires the engine to a cpal output stream and a small ratatui status view.
//! The home row plays sounds; tracks record, loop, and mix them; `E` renders
//! the session to a WAV file.

use std::io::stdout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parking_lot::Mutex;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
    Terminal,
};
use tracing::{error, info};

use loopdeck_assets::{BufferCache, Config, LoadProgress, SoundCatalog};
use loopdeck_audio::{
    AudioCommand, EngineEvent, EngineHandle, EngineState, ExportOptions, Session,
    SessionSnapshot, TrackId,
};
use loopdeck_input::{Command, InputHandler};

/// Frame rate for UI updates
const FPS: u64 = 30;

/// Cadence of engine state snapshots pushed to the UI
const STATE_UPDATE_INTERVAL: Duration = Duration::from_millis(33);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();

    let catalog = match &config.catalog_file {
        Some(path) => SoundCatalog::from_file(path)
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => SoundCatalog::builtin(),
    };

    // Create audio channels
    let (cmd_tx, cmd_rx, evt_tx, evt_rx) = EngineHandle::create_channels();

    let state = Arc::new(Mutex::new(EngineState::new(
        config.sample_rate,
        config.bpm,
        config.quantize,
    )));

    // Shutdown flag
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_audio = shutdown.clone();

    // Spawn audio thread
    let audio_state = state.clone();
    let audio_handle = thread::spawn(move || {
        run_audio_thread(audio_state, cmd_rx, evt_tx, shutdown_audio);
    });

    let cache = BufferCache::with_capacity(config.sample_rate, config.cache_capacity);
    let mut session = Session::new(
        state,
        EngineHandle::new(cmd_tx, evt_rx),
        catalog,
        config.assets_dir.clone(),
        config.export_dir.clone(),
        cache,
    );

    // Preload the catalog before entering the alternate screen so progress
    // can print plainly.
    let preload = preload_with_progress(&mut session);

    // Initialize terminal
    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    // Run main event loop
    let result = run_app(&mut terminal, &mut session, preload, shutdown.clone());

    // Cleanup
    session.shutdown();
    shutdown.store(true, Ordering::SeqCst);
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let _ = audio_handle.join();
    let _ = config.save();

    result
}

/// Preload every catalog sound, printing progress to the plain terminal.
fn preload_with_progress(session: &mut Session) -> (usize, usize) {
    let (tx, rx): (Sender<LoadProgress>, Receiver<LoadProgress>) =
        crossbeam_channel::unbounded();

    let printer = thread::spawn(move || {
        for update in rx.iter() {
            match &update {
                LoadProgress::Started { total } => {
                    println!("Loading {total} sounds...");
                }
                LoadProgress::Failed { path, message, .. } => {
                    println!("  failed: {} ({message})", path.display());
                }
                _ => {}
            }
        }
    });

    let result = session.preload(Some(tx));
    let _ = printer.join();
    info!(loaded = result.loaded, failed = result.failed, "sounds ready");
    (result.loaded, result.failed)
}

fn run_audio_thread(
    state: Arc<Mutex<EngineState>>,
    cmd_rx: Receiver<AudioCommand>,
    evt_tx: Sender<EngineEvent>,
    shutdown: Arc<AtomicBool>,
) {
    // Get audio host and device
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(d) => d,
        None => {
            let _ = evt_tx.send(EngineEvent::Error("No audio output device found".into()));
            return;
        }
    };

    let config = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = evt_tx.send(EngineEvent::Error(format!(
                "Failed to get audio config: {}",
                e
            )));
            return;
        }
    };

    let channels = config.channels() as usize;
    let state_for_callback = state.clone();

    // Pre-allocate stereo conversion buffer (no allocation in the callback)
    let mut stereo_buffer = vec![0.0f32; 16384];

    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // Use try_lock to avoid blocking the real-time audio thread.
            // On contention (rare), output silence rather than blocking.
            let Some(mut engine) = state_for_callback.try_lock() else {
                data.fill(0.0);
                return;
            };

            if channels == 2 {
                engine.process(data);
                return;
            }

            let frames = data.len() / channels;
            let needed = frames * 2;
            if needed > stereo_buffer.len() {
                stereo_buffer.resize(needed, 0.0);
            }
            let stereo = &mut stereo_buffer[..needed];
            engine.process(stereo);

            if channels == 1 {
                for (f, sample) in data.iter_mut().enumerate() {
                    *sample = (stereo[f * 2] + stereo[f * 2 + 1]) * 0.5;
                }
            } else {
                data.fill(0.0);
                for f in 0..frames {
                    data[f * channels] = stereo[f * 2];
                    data[f * channels + 1] = stereo[f * 2 + 1];
                }
            }
        },
        |err| {
            error!("audio stream error: {}", err);
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = evt_tx.send(EngineEvent::Error(format!("Failed to build stream: {}", e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = evt_tx.send(EngineEvent::Error(format!("Failed to start stream: {}", e)));
        return;
    }

    // Command/event loop: apply commands between blocks, push snapshots at
    // a fixed cadence.
    let mut last_state_update = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        while let Ok(cmd) = cmd_rx.try_recv() {
            if matches!(cmd, AudioCommand::Shutdown) {
                return;
            }
            state.lock().handle_command(cmd);
        }

        if last_state_update.elapsed() >= STATE_UPDATE_INTERVAL {
            let snapshot = state.lock().snapshot();
            let _ = evt_tx.try_send(EngineEvent::StateUpdate(snapshot));
            last_state_update = Instant::now();
        }

        thread::sleep(Duration::from_millis(2));
    }
}

/// UI-side state
struct App {
    snapshot: SessionSnapshot,
    selected: usize,
    show_help: bool,
    status: String,
    next_track_number: usize,
}

impl App {
    fn new(preload: (usize, usize)) -> Self {
        let status = if preload.1 == 0 {
            format!("{} sounds loaded", preload.0)
        } else {
            format!("{} sounds loaded, {} failed", preload.0, preload.1)
        };
        Self {
            snapshot: SessionSnapshot::default(),
            selected: 0,
            show_help: false,
            status,
            next_track_number: 1,
        }
    }

    fn selected_track(&self) -> Option<&loopdeck_audio::TrackSnapshot> {
        self.snapshot.tracks.get(self.selected)
    }

    fn selected_id(&self) -> Option<TrackId> {
        self.selected_track().map(|t| t.id)
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    session: &mut Session,
    preload: (usize, usize),
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let mut input = InputHandler::new(session.catalog().keys().collect::<Vec<_>>());
    let mut app = App::new(preload);

    // Start with one track armed for immediate play.
    session.add_track("Track 1");
    app.next_track_number = 2;

    let frame_time = Duration::from_millis(1000 / FPS);

    loop {
        // Engine events
        while let Ok(event) = session.handle().event_rx.try_recv() {
            match event {
                EngineEvent::StateUpdate(snapshot) => {
                    app.snapshot = snapshot;
                    if app.selected >= app.snapshot.tracks.len() && app.selected > 0 {
                        app.selected = app.snapshot.tracks.len().saturating_sub(1);
                    }
                }
                EngineEvent::Error(message) => {
                    app.status = message;
                }
            }
        }

        // Keyboard
        if event::poll(frame_time)? {
            if let Event::Key(key) = event::read()? {
                if let Some(command) = input.handle_key(key) {
                    if !dispatch(command, session, &mut app) {
                        break;
                    }
                }
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        terminal.draw(|frame| draw(frame, &app, &input))?;
    }

    Ok(())
}

/// Apply one input command. Returns false to quit.
fn dispatch(command: Command, session: &mut Session, app: &mut App) -> bool {
    match command {
        Command::TriggerSound(key) => {
            session.key_press(key, app.selected_id());
        }
        Command::SelectTrack(index) => {
            if index < app.snapshot.tracks.len() {
                app.selected = index;
            }
        }
        Command::CycleFocus => {
            if !app.snapshot.tracks.is_empty() {
                app.selected = (app.selected + 1) % app.snapshot.tracks.len();
            }
        }
        Command::ToggleRecord => {
            let selected = app
                .selected_track()
                .map(|t| (t.id, t.is_recording, t.name.clone()));
            if let Some((id, is_recording, name)) = selected {
                if is_recording {
                    session.stop_recording(id);
                    app.status = format!("{} captured", name);
                } else {
                    session.start_recording(id);
                    app.status = format!("{} recording...", name);
                }
            }
        }
        Command::ToggleLoop => {
            if let Some(track) = app.selected_track() {
                if track.is_looping {
                    session.stop_loop(track.id);
                } else {
                    session.start_loop(track.id);
                }
            }
        }
        Command::ToggleAllLoops => session.toggle_all_loops(),
        Command::AddTrack => {
            let name = format!("Track {}", app.next_track_number);
            app.next_track_number += 1;
            session.add_track(name);
        }
        Command::RemoveTrack => {
            if let Some(id) = app.selected_id() {
                session.remove_track(id);
            }
        }
        Command::ToggleMute => {
            if let Some(id) = app.selected_id() {
                session.toggle_mute(id);
            }
        }
        Command::ToggleSolo => {
            if let Some(id) = app.selected_id() {
                session.toggle_solo(id);
            }
        }
        Command::AdjustVolume(delta) => {
            if let Some(track) = app.selected_track() {
                session.set_track_volume(track.id, track.volume_db + delta);
            }
        }
        Command::AdjustPan(delta) => {
            if let Some(track) = app.selected_track() {
                session.set_track_pan(track.id, track.pan + delta);
            }
        }
        Command::AdjustBpm(delta) => {
            session.set_bpm(app.snapshot.bpm + delta);
        }
        Command::ToggleQuantize => {
            session.set_quantize(!app.snapshot.quantize);
        }
        Command::ExportMix => {
            app.status = "Exporting mix...".into();
            let options = ExportOptions {
                master_volume_db: app.snapshot.master_volume_db,
                ..ExportOptions::default()
            };
            match session.export_mix(&options, None) {
                Ok(result) => {
                    app.status = format!("Exported {}", result.filename);
                }
                Err(e) => {
                    app.status = format!("Export failed: {e}");
                }
            }
        }
        Command::ToggleHelp => {
            app.show_help = !app.show_help;
        }
        Command::Cancel => {
            app.status.clear();
        }
        Command::Quit => return false,
    }
    true
}

fn draw(frame: &mut ratatui::Frame, app: &App, input: &InputHandler) {
    let chunks = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .split(frame.area());

    draw_transport_bar(frame, chunks[0], app, input);
    draw_tracks(frame, chunks[1], app);
    draw_status_bar(frame, chunks[2], app);

    if app.show_help {
        draw_help(frame);
    }
}

fn draw_transport_bar(frame: &mut ratatui::Frame, area: Rect, app: &App, input: &InputHandler) {
    let snapshot = &app.snapshot;
    let transport = if snapshot.transport_running {
        format!("▶ {:6.2}s", snapshot.transport_secs)
    } else {
        "■ stopped".to_string()
    };

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", input.mode().display_name()),
            Style::default().fg(Color::Black).bg(Color::Cyan),
        ),
        Span::raw(format!(
            "  {}  {:.0} BPM  quantize {}  voices {}  ",
            transport,
            snapshot.bpm,
            if snapshot.quantize { "on" } else { "off" },
            snapshot.active_voices,
        )),
        Span::styled("? help", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_tracks(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let header = Row::new(vec!["", "track", "state", "events", "loop", "vol", "pan", "M", "S"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = app
        .snapshot
        .tracks
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let marker = if i == app.selected { ">" } else { " " };
            let state = if t.is_recording {
                Span::styled("REC", Style::default().fg(Color::Red))
            } else if t.is_looping {
                Span::styled("LOOP", Style::default().fg(Color::Green))
            } else {
                Span::raw("idle")
            };
            let loop_len = t
                .loop_length_ms
                .map(|ms| format!("{:.2}s", ms / 1000.0))
                .unwrap_or_else(|| "-".into());

            Row::new(vec![
                Cell::from(marker),
                Cell::from(t.name.clone()),
                Cell::from(state),
                Cell::from(t.event_count.to_string()),
                Cell::from(loop_len),
                Cell::from(format!("{:+.0}dB", t.volume_db)),
                Cell::from(format!("{:+.1}", t.pan)),
                Cell::from(if t.muted { "M" } else { "" }),
                Cell::from(if t.soloed { "S" } else { "" }),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(1),
            Constraint::Min(10),
            Constraint::Length(5),
            Constraint::Length(6),
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Length(5),
            Constraint::Length(1),
            Constraint::Length(1),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(" tracks "));

    frame.render_widget(table, area);
}

fn draw_status_bar(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    frame.render_widget(
        Paragraph::new(app.status.as_str()).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

fn draw_help(frame: &mut ratatui::Frame) {
    let text = "\
 pads          play sounds (see catalog)
 1-9 / Tab     select track
 Enter         start/stop recording
 L             loop selected track
 Space         toggle all loops
 N / D         add / delete track
 M / S         mute / solo
 [ ] { }       volume / pan
 - =           tempo,  Q quantize
 E             export 2-minute mix
 Ctrl+q        quit";

    let area = centered_rect(44, 14, frame.area());
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(" keys ")),
        area,
    );
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}
