//! Front-end loops driving a [`ConsoleSession`].

use crate::errors::ConsoleError;
use crate::hotkeys::{action_for_key, HotkeyAction};
use crate::intake::IntakeRequest;
use crate::logging::structured_fallback_line;
use crate::runtime::{HostEvent, ProcessHost, RunRequest, Terminal, TerminalNotifier};
use crate::session::{ConsoleSession, EventOutcome};
use crate::tui::{draw_console, log_body_height, progress_label, ConsoleView};
use crate::types::RunLifecycle;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const WHEEL_ROWS: i64 = 3;

fn io_err(error: io::Error) -> ConsoleError {
    ConsoleError::Io(error.to_string())
}

/// Prints every appended line, and a `progress:` line whenever the progress
/// label changes, until the tracked run exits. Returns the tool's exit code.
pub fn run_headless(
    session: &mut ConsoleSession,
    events: &mut UnboundedReceiver<HostEvent>,
    notifier: &TerminalNotifier,
    terminal: &dyn Terminal,
) -> Result<i32, ConsoleError> {
    let Some(run_id) = session.lifecycle().running_id() else {
        return Ok(1);
    };
    for line in session.lines().iter() {
        terminal.write_line(&structured_fallback_line(Some(run_id), "idle", line))?;
    }

    let mut last_progress = String::new();
    while let Some(event) = events.blocking_recv() {
        let text = match &event {
            HostEvent::Output { text, .. } => Some(text.clone()),
            HostEvent::Exit { .. } => None,
        };
        let outcome = session.handle_event(event, notifier);
        let progress = session.progress();
        let phase = progress.phase;
        match outcome {
            EventOutcome::Appended => {
                if let Some(text) = text {
                    terminal.write_line(&structured_fallback_line(
                        Some(run_id),
                        phase.as_str(),
                        &text,
                    ))?;
                }
                let label = progress_label(&progress);
                if phase.is_active() && label != last_progress {
                    terminal.write_line(&structured_fallback_line(
                        Some(run_id),
                        phase.as_str(),
                        &format!("progress: {label}"),
                    ))?;
                    last_progress = label;
                }
            }
            EventOutcome::Exited { exit_code } => {
                flush_notice(run_id, notifier, terminal)?;
                let status = session.status().unwrap_or("exited");
                terminal.write_line(&structured_fallback_line(
                    Some(run_id),
                    phase.as_str(),
                    status,
                ))?;
                return Ok(exit_code.unwrap_or(1));
            }
            EventOutcome::Stale | EventOutcome::Ignored => {}
        }
        flush_notice(run_id, notifier, terminal)?;
    }

    Err(ConsoleError::Process(
        "process host closed before the run exited".to_string(),
    ))
}

fn flush_notice(
    run_id: u64,
    notifier: &TerminalNotifier,
    terminal: &dyn Terminal,
) -> Result<(), ConsoleError> {
    if let Some(message) = notifier.take_message() {
        terminal.write_line(&structured_fallback_line(Some(run_id), "notify", &message))?;
    }
    Ok(())
}

/// URLs arriving from the local intake and how to turn one into a run.
pub struct Intake<'a> {
    pub requests: UnboundedReceiver<IntakeRequest>,
    pub build: &'a dyn Fn(&str) -> Result<RunRequest, ConsoleError>,
}

/// Starts a run for every pending intake URL; each one supersedes the run
/// before it. Returns how many runs were started.
pub fn drain_intake(
    session: &mut ConsoleSession,
    host: &dyn ProcessHost,
    intake: &mut Intake<'_>,
) -> usize {
    let mut started = 0;
    while let Ok(request) = intake.requests.try_recv() {
        match (intake.build)(&request.url) {
            Ok(run) => {
                if session.start_run(host, run).is_ok() {
                    started += 1;
                }
            }
            Err(err) => session.set_status(err.to_string()),
        }
    }
    started
}

pub fn run_interactive(
    session: &mut ConsoleSession,
    host: &dyn ProcessHost,
    events: &mut UnboundedReceiver<HostEvent>,
    notifier: &TerminalNotifier,
    intake: Option<Intake<'_>>,
    paint_interval: Duration,
) -> Result<i32, ConsoleError> {
    enable_raw_mode().map_err(io_err)?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture).map_err(io_err)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend).map_err(io_err)?;
    terminal.clear().map_err(io_err)?;

    let result = event_loop(
        &mut terminal,
        session,
        host,
        events,
        notifier,
        intake,
        paint_interval,
    );

    if session.lifecycle().running_id().is_some() {
        let _ = session.stop_run(host);
    }
    disable_raw_mode().map_err(io_err)?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .map_err(io_err)?;
    terminal.show_cursor().map_err(io_err)?;

    result
}

fn event_loop(
    terminal: &mut ratatui::Terminal<CrosstermBackend<Stdout>>,
    session: &mut ConsoleSession,
    host: &dyn ProcessHost,
    events: &mut UnboundedReceiver<HostEvent>,
    notifier: &TerminalNotifier,
    mut intake: Option<Intake<'_>>,
    paint_interval: Duration,
) -> Result<i32, ConsoleError> {
    let mut title = String::new();
    loop {
        if let Some(intake) = intake.as_mut() {
            drain_intake(session, host, intake);
        }
        while let Ok(event) = events.try_recv() {
            session.handle_event(event, notifier);
        }
        if let Some(message) = notifier.take_message() {
            session.set_status(message);
        }

        let size = terminal.size().map_err(io_err)?;
        let body_height = log_body_height(size.height);
        if session.viewport().state().viewport_height != body_height {
            session.viewport_mut().resize(body_height);
        }
        session.on_paint_tick();

        let next_title = session.title_text();
        if next_title != title {
            execute!(terminal.backend_mut(), SetTitle(&next_title)).map_err(io_err)?;
            title = next_title;
        }

        let lines = session.lines();
        let progress = session.progress();
        terminal
            .draw(|frame| {
                draw_console(
                    frame,
                    &ConsoleView {
                        lines: &lines,
                        progress: &progress,
                        viewport: session.viewport(),
                        lifecycle: session.lifecycle(),
                        status: session.status(),
                    },
                )
            })
            .map_err(io_err)?;

        if !event::poll(paint_interval).map_err(io_err)? {
            continue;
        }
        match event::read().map_err(io_err)? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                let Some(action) = key_action(key) else {
                    continue;
                };
                if action == HotkeyAction::Quit {
                    return Ok(exit_code_of(session.lifecycle()));
                }
                apply_action(session, host, action);
            }
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => session.viewport_mut().scroll_rows(-WHEEL_ROWS),
                MouseEventKind::ScrollDown => session.viewport_mut().scroll_rows(WHEEL_ROWS),
                _ => {}
            },
            _ => {}
        }
    }
}

fn key_action(key: KeyEvent) -> Option<HotkeyAction> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(HotkeyAction::Quit);
    }
    match key.code {
        KeyCode::Char(c) => action_for_key(c),
        KeyCode::Down => Some(HotkeyAction::ScrollDown),
        KeyCode::Up => Some(HotkeyAction::ScrollUp),
        KeyCode::PageDown => Some(HotkeyAction::PageDown),
        KeyCode::PageUp => Some(HotkeyAction::PageUp),
        KeyCode::End => Some(HotkeyAction::JumpToBottom),
        KeyCode::Esc => Some(HotkeyAction::Quit),
        _ => None,
    }
}

/// Applies every action except quitting, which the caller owns.
pub fn apply_action(session: &mut ConsoleSession, host: &dyn ProcessHost, action: HotkeyAction) {
    match action {
        HotkeyAction::Quit => {}
        HotkeyAction::StopRun => {
            let _ = session.stop_run(host);
        }
        HotkeyAction::ScrollDown => session.viewport_mut().scroll_rows(1),
        HotkeyAction::ScrollUp => session.viewport_mut().scroll_rows(-1),
        HotkeyAction::PageDown => {
            let rows = session.viewport().page_rows();
            session.viewport_mut().scroll_rows(rows);
        }
        HotkeyAction::PageUp => {
            let rows = session.viewport().page_rows();
            session.viewport_mut().scroll_rows(-rows);
        }
        HotkeyAction::JumpToBottom => session.viewport_mut().jump_to_bottom(),
        HotkeyAction::ClearLog => session.clear_log(),
    }
}

fn exit_code_of(lifecycle: RunLifecycle) -> i32 {
    match lifecycle {
        RunLifecycle::Exited { exit_code, .. } => exit_code.unwrap_or(1),
        RunLifecycle::NotStarted | RunLifecycle::Running { .. } => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_action, drain_intake, exit_code_of, run_headless, Intake};
    use crate::command::{build_run_request, CommandOptions, DownloadPreset};
    use crate::config::AppConfig;
    use crate::hotkeys::HotkeyAction;
    use crate::intake::IntakeRequest;
    use crate::runtime::{FakeProcessHost, FakeTerminal, HostEvent, RunRequest, TerminalNotifier};
    use crate::session::ConsoleSession;
    use crate::types::{FollowMode, RunLifecycle};
    use crate::viewport::AutoFollowViewport;
    use tokio::sync::mpsc;

    fn request() -> RunRequest {
        RunRequest {
            program: "yt-dlp".to_string(),
            args: vec!["https://example.com/v".to_string()],
            cwd: None,
        }
    }

    #[test]
    fn headless_prints_lines_and_returns_the_exit_code() {
        let host = FakeProcessHost::default();
        let notifier = TerminalNotifier::new(false);
        let terminal = FakeTerminal::new(false);
        let mut session = ConsoleSession::new(AutoFollowViewport::new(1, 10), true);
        let id = session.start_run(&host, request()).expect("start");

        let (tx, mut rx) = mpsc::unbounded_channel();
        for text in [
            "[download] Destination: /tmp/a.mp4",
            "[download] 100% of 1.00MiB in 00:00:01 at 1.00MiB/s",
        ] {
            tx.send(HostEvent::Output {
                run_id: id,
                text: text.to_string(),
            })
            .expect("send");
        }
        tx.send(HostEvent::Exit {
            run_id: id,
            exit_code: Some(0),
        })
        .expect("send");

        let code = run_headless(&mut session, &mut rx, &notifier, &terminal).expect("headless");
        assert_eq!(code, 0);
        let written = terminal.written_lines();
        assert_eq!(
            written[0],
            "run_id=1 phase=idle message=> yt-dlp https://example.com/v"
        );
        assert_eq!(
            written[1],
            "run_id=1 phase=downloading message=[download] Destination: /tmp/a.mp4"
        );
        assert_eq!(
            written[2],
            "run_id=1 phase=downloading message=progress: downloading 0.0% a.mp4"
        );
        assert!(written
            .iter()
            .any(|line| line == "run_id=1 phase=notify message=Download complete: a.mp4"));
        assert_eq!(
            written.last().map(String::as_str),
            Some("run_id=1 phase=idle message=exited with code 0")
        );
    }

    #[test]
    fn stop_and_scroll_actions_reach_the_session() {
        let host = FakeProcessHost::default();
        let mut session = ConsoleSession::new(AutoFollowViewport::new(1, 5), true);
        session.start_run(&host, request()).expect("start");
        for _ in 0..3 {
            apply_action(&mut session, &host, HotkeyAction::PageUp);
        }
        apply_action(&mut session, &host, HotkeyAction::StopRun);
        assert_eq!(session.lifecycle(), RunLifecycle::NotStarted);
        assert_eq!(host.stopped(), vec![1]);

        apply_action(&mut session, &host, HotkeyAction::JumpToBottom);
        assert_eq!(session.viewport().mode(), FollowMode::Following);
    }

    #[test]
    fn intake_urls_supersede_the_running_download() {
        let host = FakeProcessHost::default();
        let mut session = ConsoleSession::new(AutoFollowViewport::new(1, 5), true);
        let options = CommandOptions::from_config(&AppConfig::default(), "/videos");
        let build = |url: &str| build_run_request(url, &DownloadPreset::BestMp4, &options);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut intake = Intake {
            requests: rx,
            build: &build,
        };
        for url in ["https://a.example/v", "https://b.example/v"] {
            tx.send(IntakeRequest {
                url: url.to_string(),
            })
            .expect("send");
        }

        assert_eq!(drain_intake(&mut session, &host, &mut intake), 2);
        assert_eq!(session.lifecycle(), RunLifecycle::Running { run_id: 2 });
        assert_eq!(host.stopped(), vec![1]);
        assert_eq!(host.started()[1].args[0], "https://b.example/v");

        tx.send(IntakeRequest {
            url: "ftp://nope".to_string(),
        })
        .expect("send");
        assert_eq!(drain_intake(&mut session, &host, &mut intake), 0);
        assert_eq!(session.lifecycle(), RunLifecycle::Running { run_id: 2 });
        assert!(session.status().is_some());
    }

    #[test]
    fn exit_code_defaults() {
        assert_eq!(exit_code_of(RunLifecycle::NotStarted), 0);
        assert_eq!(
            exit_code_of(RunLifecycle::Exited {
                run_id: 1,
                exit_code: None
            }),
            1
        );
    }
}
