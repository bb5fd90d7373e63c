//! Progress classification for the download tool's status lines.
//!
//! Each recognized phase prefix is one [`PhaseMatcher`] variant; the first
//! matcher in [`MATCHERS`] whose prefix starts the trimmed chunk wins.
//! Extraction is best effort: a field that fails to parse keeps its previous
//! value instead of failing the update.

use crate::types::Phase;
use serde::Serialize;

pub const UNKNOWN_ETA: &str = "??:??";

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProgressState {
    pub phase: Phase,
    pub percent: f64,
    pub eta_text: Option<String>,
    /// Destination file name of the download in flight.
    pub label: Option<String>,
    /// Set on the chunk that introduced a new `label`.
    pub new_file: bool,
    /// Human summary for completion lines, e.g. "download complete, elapsed 00:05".
    pub summary: Option<String>,
}

impl ProgressState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn percent_text(&self) -> String {
        format!("{:5.1}%", self.percent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseMatcher {
    Download,
    Merger,
    Fixup,
}

pub const MATCHERS: [PhaseMatcher; 3] = [
    PhaseMatcher::Download,
    PhaseMatcher::Merger,
    PhaseMatcher::Fixup,
];

impl PhaseMatcher {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Download => "[download]",
            Self::Merger => "[Merger]",
            // Covers FixupM3u8, FixupTimestamp, FixupDuplicateMoov, ...
            Self::Fixup => "[Fixup",
        }
    }

    pub fn matches(self, line: &str) -> bool {
        line.starts_with(self.prefix())
    }

    fn apply(self, line: &str, previous: &ProgressState) -> ProgressState {
        match self {
            Self::Download => classify_download(line, previous),
            Self::Merger => ProgressState {
                phase: Phase::Merging,
                percent: 100.0,
                eta_text: None,
                label: previous.label.clone(),
                new_file: false,
                summary: None,
            },
            Self::Fixup => ProgressState {
                phase: Phase::FixingContainer,
                percent: 100.0,
                eta_text: None,
                label: previous.label.clone(),
                new_file: false,
                summary: None,
            },
        }
    }
}

/// Maps the latest chunk to a progress state. `previous` supplies the label
/// and the numeric fields that survive a malformed update.
pub fn classify(latest_chunk: &str, previous: &ProgressState) -> ProgressState {
    let line = latest_chunk.trim();
    match MATCHERS.iter().find(|matcher| matcher.matches(line)) {
        Some(matcher) => matcher.apply(line, previous),
        None => finished(previous),
    }
}

/// The state after the output stream ended without a final status line.
pub fn end_of_stream(previous: &ProgressState) -> ProgressState {
    finished(previous)
}

fn finished(previous: &ProgressState) -> ProgressState {
    if previous.phase.is_active() {
        ProgressState {
            phase: Phase::Done,
            percent: previous.percent,
            ..ProgressState::default()
        }
    } else {
        ProgressState::idle()
    }
}

fn classify_download(line: &str, previous: &ProgressState) -> ProgressState {
    let mut next = ProgressState {
        phase: Phase::Downloading,
        percent: previous.percent,
        eta_text: None,
        label: previous.label.clone(),
        new_file: false,
        summary: None,
    };

    if let Some(destination) = text_after(line, "Destination: ") {
        let name = file_name(destination);
        if !name.is_empty() && previous.label.as_deref() != Some(name) {
            next.new_file = true;
            next.label = Some(name.to_string());
            next.percent = 0.0;
        }
    }

    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if let Some(percent) = tokens.get(1).and_then(|token| parse_percent(token)) {
        next.percent = percent;
    }

    if let Some(eta) = token_after(line, "ETA ") {
        next.eta_text = Some(if eta == "Unknown" {
            UNKNOWN_ETA.to_string()
        } else {
            eta.to_string()
        });
    }

    if !line.contains("ETA") && !line.contains("Destination:") {
        if let Some(elapsed) = elapsed_token(&tokens) {
            next.percent = 100.0;
            next.summary = Some(format!("download complete, elapsed {elapsed}"));
        }
    }

    next
}

fn parse_percent(token: &str) -> Option<f64> {
    let value = token.strip_suffix('%').unwrap_or(token).parse::<f64>().ok()?;
    if value.is_finite() {
        Some(value.clamp(0.0, 100.0))
    } else {
        None
    }
}

fn text_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker)
        .map(|idx| line[idx + marker.len()..].trim())
        .filter(|rest| !rest.is_empty())
}

fn token_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    text_after(line, marker).and_then(|rest| rest.split_whitespace().next())
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path).trim()
}

/// Completion summaries read "... in 00:00:05 ..." where the token after
/// `in` is the elapsed time.
fn elapsed_token<'a>(tokens: &[&'a str]) -> Option<&'a str> {
    tokens
        .windows(2)
        .rev()
        .find(|pair| pair[0] == "in" && is_duration(pair[1]))
        .map(|pair| pair[1])
}

fn is_duration(token: &str) -> bool {
    let parts = token.split(':').collect::<Vec<_>>();
    parts.len() >= 2
        && parts.len() <= 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloading(percent: f64, label: Option<&str>) -> ProgressState {
        ProgressState {
            phase: Phase::Downloading,
            percent,
            label: label.map(ToOwned::to_owned),
            ..ProgressState::default()
        }
    }

    #[test]
    fn percent_and_eta_are_extracted() {
        let state = classify(
            "[download]  45.2% of ~10MiB at 1MiB/s ETA 00:05",
            &ProgressState::idle(),
        );
        assert_eq!(state.phase, Phase::Downloading);
        assert_eq!(state.percent, 45.2);
        assert_eq!(state.eta_text.as_deref(), Some("00:05"));
    }

    #[test]
    fn unknown_eta_is_normalized() {
        let state = classify(
            "[download]   3.0% of ~1.2GiB at Unknown B/s ETA Unknown",
            &ProgressState::idle(),
        );
        assert_eq!(state.eta_text.as_deref(), Some(UNKNOWN_ETA));
    }

    #[test]
    fn destination_sets_label_from_final_path_component() {
        let state = classify("[download] Destination: /tmp/My Video.mp4", &ProgressState::idle());
        assert_eq!(state.label.as_deref(), Some("My Video.mp4"));
        assert!(state.new_file);

        let windows = classify(
            "[download] Destination: C:\\Users\\me\\Videos\\clip.f137.mp4",
            &state,
        );
        assert_eq!(windows.label.as_deref(), Some("clip.f137.mp4"));
        assert!(windows.new_file);

        let same = classify("[download] Destination: /other/clip.f137.mp4", &windows);
        assert!(!same.new_file);
    }

    #[test]
    fn label_persists_across_progress_chunks() {
        let previous = downloading(10.0, Some("a.mp4"));
        let state = classify("[download]  20.0% of 5MiB at 1MiB/s ETA 00:03", &previous);
        assert_eq!(state.label.as_deref(), Some("a.mp4"));
        assert!(!state.new_file);
    }

    #[test]
    fn malformed_percent_keeps_previous_value() {
        let previous = downloading(31.5, Some("a.mp4"));
        let state = classify("[download]  abc% of 5MiB", &previous);
        assert_eq!(state.phase, Phase::Downloading);
        assert_eq!(state.percent, 31.5);
        assert_eq!(state.eta_text, None);
    }

    #[test]
    fn completion_summary_forces_full_percent() {
        let previous = downloading(99.0, Some("a.mp4"));
        let state = classify("[download] 100% of   10.00MiB in 00:00:05 at 2.00MiB/s", &previous);
        assert_eq!(state.percent, 100.0);
        assert_eq!(
            state.summary.as_deref(),
            Some("download complete, elapsed 00:00:05")
        );
        assert_eq!(state.label.as_deref(), Some("a.mp4"));
    }

    #[test]
    fn new_destination_restarts_the_gauge() {
        let previous = ProgressState {
            phase: Phase::Merging,
            percent: 100.0,
            label: Some("a.mp4".to_string()),
            ..ProgressState::default()
        };
        let state = classify("[download] Destination: /tmp/b.m4a", &previous);
        assert_eq!(state.percent, 0.0);
        assert_eq!(state.label.as_deref(), Some("b.m4a"));
    }

    #[test]
    fn live_stream_progress_is_not_a_completion() {
        let previous = downloading(0.0, Some("live.mp4"));
        let state = classify("[download]   1.23MiB at  500.00KiB/s (00:00:05)", &previous);
        assert_eq!(state.phase, Phase::Downloading);
        assert_eq!(state.summary, None);
        assert_eq!(state.percent, 0.0);
    }

    #[test]
    fn merger_and_fixup_force_full_percent() {
        let previous = downloading(62.0, Some("a.mp4"));
        let merging = classify("[Merger] Merging formats into \"/tmp/a.mp4\"", &previous);
        assert_eq!(merging.phase, Phase::Merging);
        assert_eq!(merging.percent, 100.0);
        assert_eq!(merging.eta_text, None);
        assert_eq!(merging.label.as_deref(), Some("a.mp4"));

        for line in [
            "[FixupM3u8] Fixing MPEG-TS in MP4 container of \"a.mp4\"",
            "[FixupTimestamp] Fixing frame timestamps",
        ] {
            let fixing = classify(line, &merging);
            assert_eq!(fixing.phase, Phase::FixingContainer);
            assert_eq!(fixing.percent, 100.0);
        }
    }

    #[test]
    fn unrecognized_content_finishes_an_active_phase_and_clears_label() {
        let previous = downloading(100.0, Some("a.mp4"));
        let done = classify("Deleting original file a.f137.mp4", &previous);
        assert_eq!(done.phase, Phase::Done);
        assert_eq!(done.label, None);

        let idle = classify("[youtube] abc: Downloading webpage", &done);
        assert_eq!(idle.phase, Phase::Idle);

        let ended = end_of_stream(&previous);
        assert_eq!(ended.phase, Phase::Done);
        assert_eq!(ended.label, None);
        assert_eq!(end_of_stream(&ended), ProgressState::idle());
    }

    #[test]
    fn first_matcher_wins_when_markers_are_mixed() {
        let state = classify("[download] [Merger] 12.0% junk", &ProgressState::idle());
        assert_eq!(state.phase, Phase::Downloading);
        let padded = classify("   [Merger] [download] x", &ProgressState::idle());
        assert_eq!(padded.phase, Phase::Merging);
    }

    #[test]
    fn out_of_range_numbers_do_not_escape_the_gauge() {
        let state = classify("[download] 250% of 1MiB", &ProgressState::idle());
        assert_eq!(state.percent, 100.0);
        let nan = classify("[download] NaN% of 1MiB", &downloading(5.0, None));
        assert_eq!(nan.percent, 5.0);
    }
}
