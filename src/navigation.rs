//! Unifies keyboard, drag-gesture, tap-zone and button input into page
//! advance/retreat intents, with chapter-boundary handoff.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::layout::Rect;
use std::time::Instant;

/// Net displacement, in cells, past which a released drag navigates.
pub const DRAG_DISTANCE_THRESHOLD: i32 = 50;
/// Release speed, in cells per second, past which a flick navigates even
/// on a short displacement.
pub const DRAG_VELOCITY_THRESHOLD: f32 = 500.0;
/// Width of the tap-to-page zones at the reading surface edges.
pub const TAP_ZONE_WIDTH: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavIntent {
    Advance,
    Retreat,
}

/// Whether a chapter-boundary handoff collaborator exists in each
/// direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChapterHandoff {
    pub has_prev: bool,
    pub has_next: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    PageChanged(usize),
    ChapterNext,
    ChapterPrev,
    NoOp,
}

/// Shared transition rule for every input source.
pub fn resolve(
    intent: NavIntent,
    current_page: usize,
    total_pages: usize,
    handoff: ChapterHandoff,
) -> NavOutcome {
    match intent {
        NavIntent::Advance => {
            if current_page + 1 < total_pages {
                NavOutcome::PageChanged(current_page + 1)
            } else if handoff.has_next {
                NavOutcome::ChapterNext
            } else {
                NavOutcome::NoOp
            }
        }
        NavIntent::Retreat => {
            if current_page > 0 {
                NavOutcome::PageChanged(current_page - 1)
            } else if handoff.has_prev {
                NavOutcome::ChapterPrev
            } else {
                NavOutcome::NoOp
            }
        }
    }
}

/// True when the intent would actually move somewhere; prev/next buttons
/// are hidden while this is false.
pub fn can_navigate(
    intent: NavIntent,
    current_page: usize,
    total_pages: usize,
    handoff: ChapterHandoff,
) -> bool {
    resolve(intent, current_page, total_pages, handoff) != NavOutcome::NoOp
}

pub fn key_intent(key: &KeyEvent) -> Option<NavIntent> {
    match key.code {
        KeyCode::Right | KeyCode::PageDown => Some(NavIntent::Advance),
        KeyCode::Left | KeyCode::PageUp => Some(NavIntent::Retreat),
        _ => None,
    }
}

/// Edge tap zones, independent of button visibility.
pub fn tap_zone_intent(x: u16, area: Rect) -> Option<NavIntent> {
    if x >= area.x && x < area.x + TAP_ZONE_WIDTH.min(area.width) {
        Some(NavIntent::Retreat)
    } else if x >= (area.x + area.width).saturating_sub(TAP_ZONE_WIDTH.min(area.width))
        && x < area.x + area.width
    {
        Some(NavIntent::Advance)
    } else {
        None
    }
}

/// Tracks one horizontal drag from press to release and classifies the
/// release as a navigation intent or a spring-back.
#[derive(Debug, Default)]
pub struct DragTracker {
    start: Option<DragStart>,
    last: Option<(i32, Instant)>,
}

#[derive(Debug, Clone, Copy)]
struct DragStart {
    x: i32,
}

impl DragTracker {
    pub fn is_active(&self) -> bool {
        self.start.is_some()
    }

    pub fn begin(&mut self, x: u16, now: Instant) {
        self.start = Some(DragStart { x: x as i32 });
        self.last = Some((x as i32, now));
    }

    /// Net displacement from the press position, in cells.
    pub fn update(&mut self, x: u16, now: Instant) -> Option<i32> {
        let start = self.start?;
        self.last = Some((x as i32, now));
        Some(x as i32 - start.x)
    }

    /// Ends the drag. Some(intent) when either the distance or the
    /// velocity threshold was crossed; None means the strip springs back.
    pub fn release(&mut self, x: u16, now: Instant) -> Option<NavIntent> {
        let start = self.start.take()?;
        let last = self.last.take();

        let dx = x as i32 - start.x;
        let velocity = match last {
            Some((last_x, last_t)) => {
                let dt = now.duration_since(last_t).as_secs_f32();
                if dt > f32::EPSILON {
                    (x as i32 - last_x) as f32 / dt
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        // Dragging the strip left (negative dx) pulls the next page in.
        if dx <= -DRAG_DISTANCE_THRESHOLD || velocity <= -DRAG_VELOCITY_THRESHOLD {
            Some(NavIntent::Advance)
        } else if dx >= DRAG_DISTANCE_THRESHOLD || velocity >= DRAG_VELOCITY_THRESHOLD {
            Some(NavIntent::Retreat)
        } else {
            None
        }
    }

    pub fn cancel(&mut self) {
        self.start = None;
        self.last = None;
    }
}
