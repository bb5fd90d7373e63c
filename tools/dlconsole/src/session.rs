//! The live pipeline for one console: host events in, log lines, progress and
//! side effects out.

use crate::dispatcher::{SideEffect, SideEffectDispatcher};
use crate::errors::ConsoleError;
use crate::line_buffer::LineBuffer;
use crate::logging::log_event;
use crate::progress::{classify, ProgressState};
use crate::runtime::{HostEvent, Notifier, ProcessHost, RunRequest};
use crate::types::RunLifecycle;
use crate::viewport::AutoFollowViewport;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

pub const STOPPED_LINE: &str = "process stopped";
const APP_TITLE: &str = "dlconsole";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Tagged with a run id that is no longer tracked.
    Stale,
    /// Empty chunk, or leading whitespace before the first line.
    Ignored,
    Appended,
    Exited { exit_code: Option<i32> },
}

pub struct ConsoleSession {
    buffer: LineBuffer,
    progress: watch::Sender<ProgressState>,
    viewport: AutoFollowViewport,
    dispatcher: SideEffectDispatcher,
    lifecycle: RunLifecycle,
    status: Option<String>,
}

impl ConsoleSession {
    pub fn new(viewport: AutoFollowViewport, notifications_enabled: bool) -> Self {
        let (progress, _) = watch::channel(ProgressState::idle());
        Self {
            buffer: LineBuffer::new(),
            progress,
            viewport,
            dispatcher: SideEffectDispatcher::new(notifications_enabled),
            lifecycle: RunLifecycle::NotStarted,
            status: None,
        }
    }

    /// Each widget holds its own receiver and re-reads only on change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> ProgressState {
        self.progress.borrow().clone()
    }

    pub fn lifecycle(&self) -> RunLifecycle {
        self.lifecycle
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn viewport(&self) -> &AutoFollowViewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut AutoFollowViewport {
        &mut self.viewport
    }

    pub fn lines(&mut self) -> Arc<Vec<String>> {
        self.buffer.lines()
    }

    /// Dispatches a new command. Any run still in flight is superseded: it is
    /// asked to stop and its remaining events become stale.
    pub fn start_run(
        &mut self,
        host: &dyn ProcessHost,
        request: RunRequest,
    ) -> Result<u64, ConsoleError> {
        if let Some(previous) = self.lifecycle.running_id() {
            if let Err(err) = host.stop_run(previous) {
                log_event(
                    "warn",
                    "run_stopped",
                    json!({ "run_id": previous, "superseded": true, "error": err.to_string() }),
                );
            }
        }

        self.lifecycle = RunLifecycle::NotStarted;
        self.buffer.clear();
        self.viewport.reset();
        self.dispatcher.disarm();
        self.publish(ProgressState::idle());
        self.status = None;
        let display = request.display();
        self.append_line(&format!("> {display}"));

        match host.start_run(request) {
            Ok(run_id) => {
                self.lifecycle = RunLifecycle::Running { run_id };
                log_event("info", "run_started", json!({ "run_id": run_id, "command": display }));
                Ok(run_id)
            }
            Err(err) => {
                self.status = Some(err.to_string());
                log_event(
                    "error",
                    "run_launch_failed",
                    json!({ "command": display, "error": err.to_string() }),
                );
                Err(err)
            }
        }
    }

    /// Local cancellation takes effect before the host is asked to stop, so
    /// the console is reset even if the host call fails.
    pub fn stop_run(&mut self, host: &dyn ProcessHost) -> Result<(), ConsoleError> {
        let Some(run_id) = self.lifecycle.running_id() else {
            return Ok(());
        };

        self.lifecycle = RunLifecycle::NotStarted;
        self.dispatcher.disarm();
        self.publish(ProgressState::idle());
        self.append_line(STOPPED_LINE);
        log_event("info", "run_stopped", json!({ "run_id": run_id }));

        host.stop_run(run_id).map_err(|err| {
            self.status = Some(err.to_string());
            err
        })
    }

    pub fn handle_event(&mut self, event: HostEvent, notifier: &dyn Notifier) -> EventOutcome {
        let Some(current) = self.lifecycle.running_id() else {
            return self.discard(&event);
        };
        if event.run_id() != current {
            return self.discard(&event);
        }

        match event {
            HostEvent::Output { text, .. } => self.handle_output(&text, notifier),
            HostEvent::Exit { run_id, exit_code } => {
                self.lifecycle = RunLifecycle::Exited { run_id, exit_code };
                self.status = Some(match exit_code {
                    Some(code) => format!("exited with code {code}"),
                    None => "terminated by signal".to_string(),
                });
                log_event(
                    "info",
                    "run_exited",
                    json!({ "run_id": run_id, "exit_code": exit_code }),
                );
                self.advance(ProgressState::idle(), notifier);
                EventOutcome::Exited { exit_code }
            }
        }
    }

    pub fn on_paint_tick(&mut self) -> Option<u64> {
        self.viewport.on_paint_tick()
    }

    /// Empties the log without touching the run.
    pub fn clear_log(&mut self) {
        self.buffer.clear();
        self.viewport.reset();
    }

    /// Window title reflecting the current progress.
    pub fn title_text(&self) -> String {
        let progress = self.progress.borrow();
        if !progress.phase.is_active() {
            return APP_TITLE.to_string();
        }
        let mut title = format!("{} {}", progress.percent_text().trim(), progress.phase.as_str());
        if let Some(eta) = &progress.eta_text {
            title.push_str(&format!(" ETA {eta}"));
        }
        if let Some(label) = &progress.label {
            title.push_str(&format!(" - {label}"));
        }
        format!("{title} | {APP_TITLE}")
    }

    fn handle_output(&mut self, text: &str, notifier: &dyn Notifier) -> EventOutcome {
        if !self.append_line(text) {
            return EventOutcome::Ignored;
        }
        // Blank lines carry no status and must not end an active phase.
        if !text.trim().is_empty() {
            let next = classify(text, &self.progress.borrow());
            self.advance(next, notifier);
        }
        EventOutcome::Appended
    }

    fn append_line(&mut self, text: &str) -> bool {
        if !self.buffer.append(text) {
            return false;
        }
        let count = self.buffer.line_count();
        self.viewport.on_lines_changed(count);
        true
    }

    fn advance(&mut self, next: ProgressState, notifier: &dyn Notifier) {
        for effect in self.dispatcher.on_progress_state(&next) {
            match effect {
                SideEffect::NotifyCompletion { title, body } => {
                    log_event("info", "completion_fired", json!({ "label": body }));
                    notifier.notify_completion(&title, &body);
                }
                SideEffect::SignalRefresh => notifier.signal_refresh(),
            }
        }
        self.publish(next);
    }

    fn publish(&mut self, next: ProgressState) {
        self.progress.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn discard(&self, event: &HostEvent) -> EventOutcome {
        log_event(
            "debug",
            "stale_event_discarded",
            json!({ "run_id": event.run_id(), "tracked": self.lifecycle.running_id() }),
        );
        EventOutcome::Stale
    }
}
