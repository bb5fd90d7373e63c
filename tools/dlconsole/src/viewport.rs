//! Auto-following log viewport.
//!
//! Offsets and heights are in display units (cells for the terminal front-end,
//! pixels for a graphical host). The viewport never touches the renderer: it
//! decides which rows to materialize and where the scroll offset should be.

use crate::types::{FollowMode, ScrollOrigin};
use std::ops::Range;

pub const DEFAULT_FOLLOW_TOLERANCE: u64 = 2;
pub const DEFAULT_OVERSCAN_ROWS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportState {
    pub is_following: bool,
    pub last_scroll_offset: u64,
    pub row_height: u64,
    pub viewport_height: u64,
}

#[derive(Debug, Clone)]
pub struct AutoFollowViewport {
    mode: FollowMode,
    scroll_offset: u64,
    row_height: u64,
    viewport_height: u64,
    line_count: usize,
    overscan_rows: usize,
    tolerance: u64,
    pin_pending: bool,
}

impl AutoFollowViewport {
    pub fn new(row_height: u64, viewport_height: u64) -> Self {
        Self {
            mode: FollowMode::Following,
            scroll_offset: 0,
            row_height,
            viewport_height,
            line_count: 0,
            overscan_rows: DEFAULT_OVERSCAN_ROWS,
            tolerance: DEFAULT_FOLLOW_TOLERANCE,
            pin_pending: false,
        }
    }

    pub fn with_tuning(mut self, overscan_rows: usize, tolerance: u64) -> Self {
        self.overscan_rows = overscan_rows;
        self.tolerance = tolerance.max(1);
        self
    }

    pub fn mode(&self) -> FollowMode {
        self.mode
    }

    pub fn is_following(&self) -> bool {
        self.mode == FollowMode::Following
    }

    pub fn scroll_offset(&self) -> u64 {
        self.scroll_offset
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn has_pending_pin(&self) -> bool {
        self.pin_pending
    }

    /// A zero-sized container cannot be pinned yet; the pin is retried on the
    /// next paint tick.
    pub fn is_measurable(&self) -> bool {
        self.row_height > 0 && self.viewport_height > 0
    }

    pub fn state(&self) -> ViewportState {
        ViewportState {
            is_following: self.is_following() && self.is_measurable(),
            last_scroll_offset: self.scroll_offset,
            row_height: self.row_height,
            viewport_height: self.viewport_height,
        }
    }

    pub fn content_height(&self) -> u64 {
        (self.line_count as u64).saturating_mul(self.row_height)
    }

    pub fn max_scroll_offset(&self) -> u64 {
        self.content_height().saturating_sub(self.viewport_height)
    }

    /// Called after every buffer mutation. Following mode schedules a pin to
    /// the newest line for the next paint tick instead of scrolling now.
    pub fn on_lines_changed(&mut self, line_count: usize) {
        self.line_count = line_count;
        self.scroll_offset = self.scroll_offset.min(self.max_scroll_offset());
        if self.is_following() {
            self.pin_pending = true;
        }
    }

    pub fn resize(&mut self, viewport_height: u64) {
        self.viewport_height = viewport_height;
        self.scroll_offset = self.scroll_offset.min(self.max_scroll_offset());
        if self.is_following() {
            self.pin_pending = true;
        }
    }

    /// Applies a pending pin. Returns the programmatic offset the host must
    /// scroll to; the host reports it back tagged [`ScrollOrigin::Programmatic`].
    pub fn on_paint_tick(&mut self) -> Option<u64> {
        if !self.pin_pending || !self.is_measurable() {
            return None;
        }
        self.pin_pending = false;
        let target = self.max_scroll_offset();
        self.on_scroll(target, ScrollOrigin::Programmatic);
        Some(target)
    }

    pub fn on_scroll(&mut self, offset: u64, origin: ScrollOrigin) {
        let offset = offset.min(self.max_scroll_offset());
        if origin == ScrollOrigin::User {
            match self.mode {
                FollowMode::Following if offset < self.scroll_offset => {
                    self.mode = FollowMode::Detached;
                    self.pin_pending = false;
                }
                // Only a scroll back down re-attaches.
                FollowMode::Detached
                    if offset >= self.scroll_offset && self.is_near_bottom(offset) =>
                {
                    self.mode = FollowMode::Following;
                }
                FollowMode::Following | FollowMode::Detached => {}
            }
        }
        self.scroll_offset = offset;
    }

    /// User scroll by whole rows; negative is upward.
    pub fn scroll_rows(&mut self, rows: i64) {
        let delta = rows.unsigned_abs().saturating_mul(self.row_height);
        let offset = if rows < 0 {
            self.scroll_offset.saturating_sub(delta)
        } else {
            self.scroll_offset.saturating_add(delta)
        };
        self.on_scroll(offset, ScrollOrigin::User);
    }

    pub fn page_rows(&self) -> i64 {
        if self.row_height == 0 {
            return 0;
        }
        i64::try_from((self.viewport_height / self.row_height).max(1)).unwrap_or(i64::MAX)
    }

    /// The "jump to bottom" affordance: always returns to following and
    /// scrolls to the end right away. Repeating it changes nothing.
    pub fn jump_to_bottom(&mut self) {
        self.mode = FollowMode::Following;
        if self.is_measurable() {
            self.pin_pending = false;
            let target = self.max_scroll_offset();
            self.on_scroll(target, ScrollOrigin::Programmatic);
        } else {
            self.pin_pending = true;
        }
    }

    pub fn reset(&mut self) {
        self.mode = FollowMode::Following;
        self.scroll_offset = 0;
        self.line_count = 0;
        self.pin_pending = false;
    }

    /// Rows intersecting `[offset, offset + viewport_height)`.
    pub fn window_rows(&self) -> Range<usize> {
        if self.row_height == 0 || self.line_count == 0 {
            return 0..0;
        }
        let first = usize::try_from(self.scroll_offset / self.row_height).unwrap_or(usize::MAX);
        let bottom = self.scroll_offset.saturating_add(self.viewport_height);
        let last = usize::try_from(bottom.div_ceil(self.row_height)).unwrap_or(usize::MAX);
        first.min(self.line_count)..last.min(self.line_count)
    }

    /// Rows to materialize: the window plus overscan on both sides.
    pub fn render_range(&self) -> Range<usize> {
        let window = self.window_rows();
        if window.is_empty() {
            return window;
        }
        window.start.saturating_sub(self.overscan_rows)
            ..window
                .end
                .saturating_add(self.overscan_rows)
                .min(self.line_count)
    }

    fn is_near_bottom(&self, offset: u64) -> bool {
        self.max_scroll_offset().saturating_sub(offset) <= self.tolerance
    }
}
