#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub key: char,
    pub action: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    Quit,
    StopRun,
    ScrollDown,
    ScrollUp,
    PageDown,
    PageUp,
    JumpToBottom,
    ClearLog,
}

pub const CONSOLE_BINDINGS: [HotkeyBinding; 8] = [
    HotkeyBinding {
        key: 'q',
        action: "quit",
    },
    HotkeyBinding {
        key: 's',
        action: "stop",
    },
    HotkeyBinding {
        key: 'j',
        action: "down",
    },
    HotkeyBinding {
        key: 'k',
        action: "up",
    },
    HotkeyBinding {
        key: 'f',
        action: "page down",
    },
    HotkeyBinding {
        key: 'b',
        action: "page up",
    },
    HotkeyBinding {
        key: 'G',
        action: "bottom",
    },
    HotkeyBinding {
        key: 'c',
        action: "clear",
    },
];

pub fn console_controls_legend() -> String {
    format_bindings("Keys: ", &CONSOLE_BINDINGS)
}

pub fn action_for_key(key: char) -> Option<HotkeyAction> {
    match key {
        'q' => Some(HotkeyAction::Quit),
        's' => Some(HotkeyAction::StopRun),
        'j' => Some(HotkeyAction::ScrollDown),
        'k' => Some(HotkeyAction::ScrollUp),
        'f' => Some(HotkeyAction::PageDown),
        'b' => Some(HotkeyAction::PageUp),
        'G' => Some(HotkeyAction::JumpToBottom),
        'c' => Some(HotkeyAction::ClearLog),
        _ => None,
    }
}

fn format_bindings(prefix: &str, bindings: &[HotkeyBinding]) -> String {
    let parts = bindings
        .iter()
        .map(|binding| format!("{} {}", binding.key, binding.action))
        .collect::<Vec<_>>();
    format!("{prefix}{}", parts.join("  "))
}

#[cfg(test)]
mod tests {
    use super::{action_for_key, console_controls_legend, HotkeyAction, CONSOLE_BINDINGS};

    #[test]
    fn every_advertised_key_resolves() {
        for binding in CONSOLE_BINDINGS {
            assert!(
                action_for_key(binding.key).is_some(),
                "legend advertises unbound key {}",
                binding.key
            );
        }
    }

    #[test]
    fn legend_lists_the_jump_key() {
        let legend = console_controls_legend();
        assert!(legend.starts_with("Keys: q quit"));
        assert!(legend.contains("G bottom"));
        assert_eq!(action_for_key('G'), Some(HotkeyAction::JumpToBottom));
        assert_eq!(action_for_key('g'), None);
    }
}
