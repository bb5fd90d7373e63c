use dlconsole::app::apply_action;
use dlconsole::hotkeys::{action_for_key, console_controls_legend, CONSOLE_BINDINGS};
use dlconsole::progress::ProgressState;
use dlconsole::runtime::FakeProcessHost;
use dlconsole::session::ConsoleSession;
use dlconsole::tui::{render_console, ConsoleView};
use dlconsole::types::RunLifecycle;
use dlconsole::viewport::AutoFollowViewport;

fn legend_keys(legend: &str) -> Vec<char> {
    legend
        .split_whitespace()
        .filter_map(|token| {
            if token.len() == 1 {
                token.chars().next()
            } else {
                None
            }
        })
        .collect()
}

#[test]
fn linter_hotkeys_advertised_in_ui_must_have_behavior() {
    let advertised = legend_keys(&console_controls_legend());
    for binding in CONSOLE_BINDINGS {
        assert!(advertised.contains(&binding.key));
    }

    for key in advertised {
        let action = action_for_key(key)
            .unwrap_or_else(|| panic!("advertised hotkey `{key}` has no application behavior"));
        let contract_source = include_str!("../src/app.rs");
        let marker = format!("HotkeyAction::{action:?} =>");
        assert!(
            contract_source.contains(&marker),
            "apply_action has no arm for hotkey `{key}`"
        );
    }
}

#[test]
fn linter_every_action_is_safe_without_a_run() {
    let host = FakeProcessHost::default();
    let mut session = ConsoleSession::new(AutoFollowViewport::new(1, 10), false);
    for binding in CONSOLE_BINDINGS {
        if let Some(action) = action_for_key(binding.key) {
            apply_action(&mut session, &host, action);
        }
    }
    assert_eq!(session.lifecycle(), RunLifecycle::NotStarted);
    assert!(host.stopped().is_empty());
}

#[test]
fn linter_legend_is_drawn_in_the_footer() {
    let viewport = AutoFollowViewport::new(1, 10);
    let frame = render_console(
        &ConsoleView {
            lines: &[],
            progress: &ProgressState::idle(),
            viewport: &viewport,
            lifecycle: RunLifecycle::NotStarted,
            status: None,
        },
        160,
        14,
    )
    .expect("render");
    assert!(frame.contains(&console_controls_legend()));
}
