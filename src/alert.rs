//! Environment hazard alert debouncing.
//!
//! One hazard signal arrives per inference cycle. [`decide`] turns it into
//! an announcement, a release or nothing:
//!
//! ```text
//!            new label                   same label, unmuted,
//!  Idle ─────────────────► Announced ──── elapsed >= thresholds ───┐
//!   ▲                         │  ▲                                 │
//!   │                         │  └─────────── Announce ────────────┘
//!   │   absent > RELEASE_MS   │ mute
//!   └─────────────────────────┤
//!   ▲                         ▼
//!   └──────────────────── Muted ── new label ──► Announced
//! ```

use crate::clock::Timestamp;

/// Minimum time an announced hazard stays quiet before it may repeat.
pub const REPEAT_IGNORE_MS: Timestamp = 30_000;
/// Minimum spacing between repeat announcements of a persisting hazard.
pub const WARN_INTERVAL_MS: Timestamp = 12_000;
/// Continuous absence after which the active hazard is forgotten.
pub const RELEASE_MS: Timestamp = 25_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertState {
    /// Hazard label currently considered active
    pub current_text: Option<String>,
    /// Suppresses repeats of the active hazard only
    pub muted: bool,
    pub last_warn_time: Option<Timestamp>,
    /// Last cycle that reported any hazard
    pub last_detect_time: Option<Timestamp>,
}

impl AlertState {
    pub fn reset(&mut self) {
        *self = AlertState::default();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Flips the mute flag and returns the new value
    pub fn toggle_muted(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    pub fn is_idle(&self) -> bool {
        self.current_text.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertAction {
    None,
    /// Speak this label at warning urgency
    Announce(String),
    /// The active hazard was released after sustained absence
    Reset,
}

/// Advances the alert state by one inference cycle.
///
/// Pure: the same `(signal, now, state)` always yields the same result.
pub fn decide(
    signal: Option<&str>,
    now: Timestamp,
    mut state: AlertState,
) -> (AlertAction, AlertState) {
    let signal = match signal {
        Some(signal) => signal,
        None => {
            let released = elapsed(now, state.last_detect_time) > RELEASE_MS;
            if state.current_text.is_some() && released {
                return (AlertAction::Reset, AlertState::default());
            }
            return (AlertAction::None, state);
        }
    };

    state.last_detect_time = Some(now);

    if state.current_text.as_deref() != Some(signal) {
        // identity change overrides any mute
        state.current_text = Some(signal.to_owned());
        state.muted = false;
        state.last_warn_time = Some(now);
        return (AlertAction::Announce(signal.to_owned()), state);
    }

    if state.muted {
        return (AlertAction::None, state);
    }

    let since_warn = elapsed(now, state.last_warn_time);
    if since_warn < REPEAT_IGNORE_MS {
        return (AlertAction::None, state);
    }

    // REPEAT_IGNORE_MS > WARN_INTERVAL_MS so this check currently always passes
    if since_warn >= WARN_INTERVAL_MS {
        state.last_warn_time = Some(now);
        return (AlertAction::Announce(signal.to_owned()), state);
    }

    (AlertAction::None, state)
}

fn elapsed(now: Timestamp, since: Option<Timestamp>) -> Timestamp {
    since.map_or(Timestamp::MAX, |since| now.saturating_sub(since))
}

/// First warning that mentions one of the environment keywords.
///
/// Blank keywords never match.
pub fn extract_hazard<'a>(warnings: &'a [String], keywords: &[String]) -> Option<&'a str> {
    warnings
        .iter()
        .find(|warning| {
            keywords
                .iter()
                .map(|keyword| keyword.trim())
                .any(|keyword| !keyword.is_empty() && warning.contains(keyword))
        })
        .map(String::as_str)
}
