//! Pagination engine: observes viewport geometry, measures the rendered
//! strip, derives the page count, repairs out-of-range page indices and
//! presents the current page with a spring-like transition.
//!
//! The engine never owns the current page index; it is externally
//! controlled and only corrected here through [`PaginationEvent::PageClamped`].

use crate::render::RenderedStrip;
use ratatui::text::{Line, Span};
use std::time::{Duration, Instant};
use unicode_width::UnicodeWidthChar;

/// Re-settle delays: font rendering and image probing can shift measured
/// extent after the first synchronous pass, so measurement is repeated
/// shortly after, then once more as a fallback.
pub const RESETTLE_SHORT: Duration = Duration::from_millis(100);
pub const RESETTLE_LONG: Duration = Duration::from_millis(500);

/// Geometry changes of at most this many cells are layout jitter, not a
/// resize.
const DIMS_TOLERANCE: u16 = 1;

const ANIMATION_FACTOR: f32 = 0.15;
const ANIMATION_SNAP: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutDims {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Total extent of the strip along the flow axis, in cells.
    pub flow_extent: usize,
    pub page_count: usize,
}

/// Capability interface over the host layout pass; the terminal
/// implementation measures real wrapped lines, the fixed model backs
/// deterministic tests.
pub trait LayoutMeasurer {
    fn measure(&self, strip: &RenderedStrip, dims: LayoutDims) -> Measurement;
}

/// Measures the strip as laid out by the terminal: one wrapped line per
/// cell row, pages of `dims.height` rows.
pub struct TerminalMeasurer;

impl LayoutMeasurer for TerminalMeasurer {
    fn measure(&self, strip: &RenderedStrip, dims: LayoutDims) -> Measurement {
        let flow_extent = strip.height();
        let viewport = dims.height.max(1) as usize;
        Measurement {
            flow_extent,
            page_count: flow_extent.div_ceil(viewport).max(1),
        }
    }
}

/// Pure deterministic measurer: a fixed number of characters per page,
/// independent of any terminal.
pub struct FixedCharsPerPage {
    pub chars_per_page: usize,
}

impl LayoutMeasurer for FixedCharsPerPage {
    fn measure(&self, strip: &RenderedStrip, _dims: LayoutDims) -> Measurement {
        let chars: usize = strip.line_text.iter().map(|l| l.chars().count()).sum();
        Measurement {
            flow_extent: chars,
            page_count: chars.div_ceil(self.chars_per_page.max(1)).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationEvent {
    TotalPagesChanged(usize),
    /// The externally-held page index fell outside the new page count and
    /// must be reset to the carried value.
    PageClamped(usize),
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    version: u64,
}

pub struct PaginationEngine {
    dims: Option<LayoutDims>,
    total_pages: usize,
    /// Bumped on every dependency mutation; stale deadlines are dropped.
    version: u64,
    deadlines: Vec<Deadline>,
    // Visual transform state, in page units.
    offset: f32,
    target: f32,
    animating: bool,
    dragging: bool,
}

impl Default for PaginationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PaginationEngine {
    pub fn new() -> Self {
        Self {
            dims: None,
            total_pages: 1,
            version: 0,
            deadlines: Vec::new(),
            offset: 0.0,
            target: 0.0,
            animating: false,
            dragging: false,
        }
    }

    pub fn dims(&self) -> Option<LayoutDims> {
        self.dims
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Reports the content container's box size. Returns true when the
    /// change is large enough to invalidate the layout (beyond the jitter
    /// tolerance), in which case re-settle passes are scheduled.
    pub fn observe_geometry(&mut self, width: u16, height: u16, now: Instant) -> bool {
        if width == 0 || height == 0 {
            // Not a measurement.
            self.dims = None;
            return false;
        }
        let changed = match self.dims {
            Some(dims) => {
                dims.width.abs_diff(width) > DIMS_TOLERANCE
                    || dims.height.abs_diff(height) > DIMS_TOLERANCE
            }
            None => true,
        };
        if changed {
            self.dims = Some(LayoutDims { width, height });
            self.invalidate(now);
        }
        changed
    }

    /// Content, search term, highlight list or font tier changed.
    pub fn mark_content_changed(&mut self, now: Instant) {
        self.invalidate(now);
    }

    fn invalidate(&mut self, now: Instant) {
        self.version += 1;
        self.deadlines.push(Deadline {
            at: now + RESETTLE_SHORT,
            version: self.version,
        });
        self.deadlines.push(Deadline {
            at: now + RESETTLE_LONG,
            version: self.version,
        });
    }

    /// Drains due re-settle deadlines. True when a deadline belonging to
    /// the current dependency version fired; deadlines scheduled by an
    /// older version are dropped silently.
    pub fn poll_resettle(&mut self, now: Instant) -> bool {
        let version = self.version;
        let mut fired = false;
        self.deadlines.retain(|d| {
            if d.at > now {
                return true;
            }
            if d.version == version {
                fired = true;
            }
            false
        });
        fired
    }

    /// Earliest pending deadline, for event-loop timeout calculation.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().map(|d| d.at).min()
    }

    /// Teardown: no deadline may fire after the surface is gone.
    pub fn cancel_pending(&mut self) {
        self.deadlines.clear();
    }

    /// Recomputes the page count from the current geometry and emits the
    /// resulting notifications. Runs as a settlement side effect, never
    /// from the synchronous render path. Idempotent: identical inputs
    /// yield identical state and no repeat notifications.
    pub fn recompute(
        &mut self,
        strip: &RenderedStrip,
        measurer: &dyn LayoutMeasurer,
        current_page: usize,
    ) -> Vec<PaginationEvent> {
        let Some(dims) = self.dims else {
            return Vec::new();
        };
        let measurement = measurer.measure(strip, dims);
        let mut events = Vec::new();
        if measurement.page_count != self.total_pages {
            self.total_pages = measurement.page_count;
            events.push(PaginationEvent::TotalPagesChanged(self.total_pages));
        }
        if current_page >= self.total_pages {
            events.push(PaginationEvent::PageClamped(self.total_pages - 1));
        }
        events
    }

    // --- visual transform -------------------------------------------------

    /// Externally-controlled page index changed; animate toward it.
    pub fn set_page(&mut self, page: usize) {
        self.target = page as f32;
        if (self.target - self.offset).abs() > ANIMATION_SNAP {
            self.animating = true;
        } else {
            self.offset = self.target;
        }
    }

    /// Jump without animation (chapter change).
    pub fn snap_to_page(&mut self, page: usize) {
        self.target = page as f32;
        self.offset = self.target;
        self.animating = false;
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    /// One animation step: exponential approach toward the target, which
    /// reads as a spring settling rather than a linear slide.
    pub fn tick_animation(&mut self) {
        if !self.animating || self.dragging {
            return;
        }
        let diff = self.target - self.offset;
        if diff.abs() < ANIMATION_SNAP {
            self.offset = self.target;
            self.animating = false;
        } else {
            self.offset += diff * ANIMATION_FACTOR;
        }
    }

    pub fn begin_drag(&mut self) {
        self.dragging = true;
        self.offset = self.target;
        self.animating = false;
    }

    /// Direct manipulation: horizontal displacement in cells moves the
    /// strip, constrained to one page around the settled position and to
    /// the strip edges.
    pub fn apply_drag(&mut self, dx_cells: i32) {
        if !self.dragging {
            return;
        }
        let Some(dims) = self.dims else {
            return;
        };
        let pages = -(dx_cells as f32) / dims.width.max(1) as f32;
        let min = (self.target - 1.0).max(0.0);
        let max = (self.target + 1.0).min((self.total_pages - 1) as f32);
        self.offset = (self.target + pages).clamp(min, max);
    }

    /// Ends direct manipulation; the strip springs to the (possibly just
    /// navigated) settled position.
    pub fn end_drag(&mut self) {
        self.dragging = false;
        if (self.target - self.offset).abs() > ANIMATION_SNAP {
            self.animating = true;
        }
    }

    pub fn visual_offset(&self) -> f32 {
        self.offset
    }
}

// --- page presentation ----------------------------------------------------

/// Rows of a single settled page, styled.
pub fn page_rows<'a>(
    strip: &'a RenderedStrip,
    dims: LayoutDims,
    page: usize,
) -> &'a [Line<'static>] {
    let viewport = dims.height.max(1) as usize;
    let start = (page * viewport).min(strip.lines.len());
    let end = (start + viewport).min(strip.lines.len());
    &strip.lines[start..end]
}

/// Rows for an arbitrary (possibly fractional) strip offset. Settled
/// offsets render styled; mid-transition frames compose plain column
/// slices of the two adjacent pages.
pub fn animated_rows(strip: &RenderedStrip, dims: LayoutDims, offset: f32) -> Vec<Line<'static>> {
    let width = dims.width.max(1) as usize;
    let viewport = dims.height.max(1) as usize;
    let left_page = offset.floor().max(0.0) as usize;
    let frac = offset - left_page as f32;
    let shift = (frac * width as f32).round() as usize;

    if shift == 0 {
        return page_rows(strip, dims, left_page).to_vec();
    }

    let row_text = |page: usize, row: usize| -> &str {
        strip
            .line_text
            .get(page * viewport + row)
            .map(String::as_str)
            .unwrap_or("")
    };

    (0..viewport)
        .map(|row| {
            let mut text = slice_cols(row_text(left_page, row), shift, width);
            text.push_str(&slice_cols(row_text(left_page + 1, row), 0, shift));
            Line::from(Span::raw(text))
        })
        .collect()
}

/// Width-aware column slice, padded with spaces to exactly `to - from`
/// cells. A double-width character straddling the cut is replaced by a
/// space.
fn slice_cols(text: &str, from: usize, to: usize) -> String {
    let wanted = to.saturating_sub(from);
    let mut out = String::new();
    let mut col = 0usize;
    let mut out_width = 0usize;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if col + w > to {
            break;
        }
        if col >= from {
            out.push(ch);
            out_width += w;
        } else if col + w > from {
            // Straddles the left cut.
            out.push(' ');
            out_width += 1;
        }
        col += w;
    }
    while out_width < wanted {
        out.push(' ');
        out_width += 1;
    }
    out
}
