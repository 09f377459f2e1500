//! Player navigation as a sans-IO state machine.
//!
//! [`PlayerSession`] owns the current page, the advance timer and the dock
//! state. Every input returns a list of [`PlayerEffect`]s for the host (the
//! browser runtime, or a test) to carry out. Timers are identified by
//! [`TimerId`] tokens so that a late callback for a cancelled timer is a
//! no-op.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::formats::PageTimingEntry;
use crate::protocol::{FrameCommand, HostMessage, is_navigable_url};

pub const DEFAULT_TOTAL_PAGES: u32 = 100;
pub const DEFAULT_PAGE_DURATION_SECS: u32 = 10;
pub const AUTO_START_DELAY: Duration = Duration::from_millis(800);
pub const DOCK_HIDE_DELAY: Duration = Duration::from_millis(500);

pub fn page_file_name(page: u32) -> String {
    format!("page{page}.html")
}

/// Page number -> auto-advance seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TimingTable(BTreeMap<u32, u32>);

impl TimingTable {
    pub fn from_entries(entries: &[PageTimingEntry]) -> Self {
        Self(
            entries
                .iter()
                .map(|e| (e.page, e.duration_seconds))
                .collect(),
        )
    }

    pub fn duration_for(&self, page: u32) -> Duration {
        let secs = self
            .0
            .get(&page)
            .copied()
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_PAGE_DURATION_SECS);
        Duration::from_secs(u64::from(secs))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Boot configuration embedded in the rendered player page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerBoot {
    pub story: String,
    pub initial_page: u32,
    pub total_pages: u32,
    pub auto_advance: bool,
    pub default_duration_secs: u32,
    pub auto_start_delay_ms: u64,
    pub dock_hide_delay_ms: u64,
    pub timing: TimingTable,
}

impl PlayerBoot {
    pub fn new(
        story: impl Into<String>,
        page_count: usize,
        page_query: Option<&str>,
        timing: TimingTable,
    ) -> Self {
        let total_pages = total_pages_for(page_count);
        Self {
            story: story.into(),
            initial_page: resolve_initial_page(page_query, total_pages),
            total_pages,
            auto_advance: true,
            default_duration_secs: DEFAULT_PAGE_DURATION_SECS,
            auto_start_delay_ms: AUTO_START_DELAY.as_millis() as u64,
            dock_hide_delay_ms: DOCK_HIDE_DELAY.as_millis() as u64,
            timing,
        }
    }
}

/// A story with no pages is still navigable up to the fixed default.
pub fn total_pages_for(page_count: usize) -> u32 {
    match u32::try_from(page_count) {
        Ok(0) | Err(_) => DEFAULT_TOTAL_PAGES,
        Ok(n) => n,
    }
}

/// `?page=N` when it names a page in range, page 1 otherwise.
pub fn resolve_initial_page(query: Option<&str>, total_pages: u32) -> u32 {
    query
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|page| (1..=total_pages).contains(page))
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEffect {
    LoadPage { page: u32, src: String },
    ScheduleAdvance { timer: TimerId, after: Duration },
    CancelAdvance(TimerId),
    UnmuteBackground,
    MuteBackground,
    Alert(String),
    SendToFrame(FrameCommand),
    /// Fire [`PlayerSession::on_auto_start_due`] with `load` after `after`.
    ScheduleAutoStart { load: u64, after: Duration },
    FocusFrame,
    NavigateTop { url: String },
    ShowControls,
    HideControls,
    ScheduleDockHide { timer: TimerId, after: Duration },
    CancelDockHide(TimerId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigateError {
    #[error("page number must be between 1 and {total} (got {target})")]
    OutOfRange { target: i64, total: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockEvent {
    TriggerEnter,
    ControlsEnter,
    ControlsLeave,
    HideDue(TimerId),
}

#[derive(Debug, Clone, Default)]
struct Dock {
    enabled: bool,
    visible: bool,
    pointer_in_controls: bool,
    hide_timer: Option<TimerId>,
}

#[derive(Debug, Clone)]
pub struct PlayerSession {
    current_page: u32,
    total_pages: u32,
    auto_advance: bool,
    background_muted: bool,
    timing: TimingTable,
    advance_timer: Option<TimerId>,
    next_timer: u64,
    load_generation: u64,
    dock: Dock,
}

impl PlayerSession {
    pub fn new(total_pages: u32, timing: TimingTable) -> Self {
        Self {
            current_page: 1,
            total_pages: total_pages.max(1),
            auto_advance: true,
            background_muted: false,
            timing,
            advance_timer: None,
            next_timer: 0,
            load_generation: 0,
            dock: Dock::default(),
        }
    }

    pub fn from_boot(boot: &PlayerBoot) -> Self {
        let mut session = Self::new(boot.total_pages, boot.timing.clone());
        session.auto_advance = boot.auto_advance;
        session
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn auto_advance(&self) -> bool {
        self.auto_advance
    }

    pub fn advance_timer(&self) -> Option<TimerId> {
        self.advance_timer
    }

    pub fn controls_visible(&self) -> bool {
        self.dock.visible
    }

    /// Initial navigation; runs before anything else the player does.
    pub fn start(&mut self, initial_page: u32) -> Vec<PlayerEffect> {
        let page = if (1..=self.total_pages).contains(&initial_page) {
            initial_page
        } else {
            1
        };
        let mut effects = self.go_to(page);
        effects.extend(self.set_dock_mode(true));
        effects
    }

    pub fn navigate(&mut self, target: i64) -> Result<Vec<PlayerEffect>, NavigateError> {
        let page = u32::try_from(target)
            .ok()
            .filter(|p| (1..=self.total_pages).contains(p))
            .ok_or(NavigateError::OutOfRange {
                target,
                total: self.total_pages,
            })?;
        Ok(self.go_to(page))
    }

    /// [`Self::navigate`] with the failure turned into an alert.
    pub fn navigate_or_alert(&mut self, target: i64) -> Vec<PlayerEffect> {
        match self.navigate(target) {
            Ok(effects) => effects,
            Err(err) => vec![PlayerEffect::Alert(err.to_string())],
        }
    }

    fn go_to(&mut self, page: u32) -> Vec<PlayerEffect> {
        self.current_page = page;
        let mut effects = vec![PlayerEffect::LoadPage {
            page,
            src: page_file_name(page),
        }];
        effects.extend(self.reschedule_advance());
        if self.background_muted {
            self.background_muted = false;
            effects.push(PlayerEffect::UnmuteBackground);
        }
        effects
    }

    fn allocate_timer(&mut self) -> TimerId {
        self.next_timer += 1;
        TimerId(self.next_timer)
    }

    fn cancel_advance(&mut self) -> Option<PlayerEffect> {
        self.advance_timer.take().map(PlayerEffect::CancelAdvance)
    }

    /// Clears the live advance timer and, with auto-advance on, arms a new
    /// one for the current page.
    fn reschedule_advance(&mut self) -> Vec<PlayerEffect> {
        let mut effects: Vec<_> = self.cancel_advance().into_iter().collect();
        if self.auto_advance {
            let timer = self.allocate_timer();
            self.advance_timer = Some(timer);
            effects.push(PlayerEffect::ScheduleAdvance {
                timer,
                after: self.timing.duration_for(self.current_page),
            });
        }
        effects
    }

    pub fn on_advance_timeout(&mut self, timer: TimerId) -> Vec<PlayerEffect> {
        if self.advance_timer != Some(timer) {
            return Vec::new();
        }
        self.advance_timer = None;
        self.navigate_or_alert(i64::from(self.current_page) + 1)
    }

    pub fn set_auto_advance(&mut self, enabled: bool) -> Vec<PlayerEffect> {
        self.auto_advance = enabled;
        if enabled {
            self.reschedule_advance()
        } else {
            self.cancel_advance().into_iter().collect()
        }
    }

    /// Replaces the duration table and restarts the current page's timer.
    pub fn set_timing(&mut self, timing: TimingTable) -> Vec<PlayerEffect> {
        self.timing = timing;
        self.reschedule_advance()
    }

    /// Keyboard input using DOM `KeyboardEvent.key` names. `None` means the
    /// key is not bound and the event should be left alone.
    pub fn on_key(&mut self, key: &str, ctrl_or_meta: bool) -> Option<Vec<PlayerEffect>> {
        let current = i64::from(self.current_page);
        let effects = match key {
            "f" | "F" if ctrl_or_meta => vec![PlayerEffect::FocusFrame],
            _ if ctrl_or_meta => return None,
            "ArrowLeft" => self.navigate_or_alert(current - 1),
            "ArrowRight" => self.navigate_or_alert(current + 1),
            "Home" => self.navigate_or_alert(1),
            "ArrowUp" => vec![PlayerEffect::SendToFrame(FrameCommand::NextFrame)],
            "ArrowDown" => vec![PlayerEffect::SendToFrame(FrameCommand::PreviousFrame)],
            " " => vec![PlayerEffect::SendToFrame(FrameCommand::TogglePause)],
            "a" | "A" => self.set_auto_advance(!self.auto_advance),
            _ => return None,
        };
        Some(effects)
    }

    pub fn on_host_message(&mut self, message: HostMessage) -> Vec<PlayerEffect> {
        match message {
            HostMessage::Teleport { url } if is_navigable_url(&url) => {
                vec![PlayerEffect::NavigateTop { url }]
            }
            HostMessage::Teleport { url } => {
                tracing::warn!(url = %url, "ignoring teleport to a non-http url");
                Vec::new()
            }
            HostMessage::MuteBackground if !self.background_muted => {
                self.background_muted = true;
                vec![PlayerEffect::MuteBackground]
            }
            HostMessage::MuteBackground => Vec::new(),
        }
    }

    /// The iframe finished loading a page; schedule the slideshow auto-start.
    pub fn on_frame_loaded(&mut self) -> Vec<PlayerEffect> {
        self.load_generation += 1;
        vec![PlayerEffect::ScheduleAutoStart {
            load: self.load_generation,
            after: AUTO_START_DELAY,
        }]
    }

    pub fn on_auto_start_due(&mut self, load: u64) -> Vec<PlayerEffect> {
        if load != self.load_generation {
            return Vec::new();
        }
        vec![PlayerEffect::SendToFrame(FrameCommand::StartSlideshow)]
    }

    pub fn set_dock_mode(&mut self, enabled: bool) -> Vec<PlayerEffect> {
        self.dock.enabled = enabled;
        let mut effects: Vec<_> = self
            .dock
            .hide_timer
            .take()
            .map(PlayerEffect::CancelDockHide)
            .into_iter()
            .collect();
        if enabled {
            self.dock.visible = false;
            effects.push(PlayerEffect::HideControls);
        } else {
            self.dock.visible = true;
            effects.push(PlayerEffect::ShowControls);
        }
        effects
    }

    pub fn on_dock_event(&mut self, event: DockEvent) -> Vec<PlayerEffect> {
        if !self.dock.enabled {
            return Vec::new();
        }
        match event {
            DockEvent::TriggerEnter | DockEvent::ControlsEnter => {
                if event == DockEvent::ControlsEnter {
                    self.dock.pointer_in_controls = true;
                }
                let mut effects: Vec<_> = self
                    .dock
                    .hide_timer
                    .take()
                    .map(PlayerEffect::CancelDockHide)
                    .into_iter()
                    .collect();
                if !self.dock.visible {
                    self.dock.visible = true;
                    effects.push(PlayerEffect::ShowControls);
                }
                effects
            }
            DockEvent::ControlsLeave => {
                self.dock.pointer_in_controls = false;
                let mut effects: Vec<_> = self
                    .dock
                    .hide_timer
                    .take()
                    .map(PlayerEffect::CancelDockHide)
                    .into_iter()
                    .collect();
                let timer = self.allocate_timer();
                self.dock.hide_timer = Some(timer);
                effects.push(PlayerEffect::ScheduleDockHide {
                    timer,
                    after: DOCK_HIDE_DELAY,
                });
                effects
            }
            DockEvent::HideDue(timer) => {
                if self.dock.hide_timer != Some(timer) {
                    return Vec::new();
                }
                self.dock.hide_timer = None;
                if self.dock.pointer_in_controls || !self.dock.visible {
                    return Vec::new();
                }
                self.dock.visible = false;
                vec![PlayerEffect::HideControls]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(u32, u32)]) -> TimingTable {
        let entries: Vec<_> = entries
            .iter()
            .map(|&(page, duration_seconds)| PageTimingEntry {
                page,
                duration_seconds,
            })
            .collect();
        TimingTable::from_entries(&entries)
    }

    fn scheduled(effects: &[PlayerEffect]) -> Vec<Duration> {
        effects
            .iter()
            .filter_map(|e| match e {
                PlayerEffect::ScheduleAdvance { after, .. } => Some(*after),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn out_of_range_navigation_fails_and_keeps_state() {
        let mut session = PlayerSession::new(12, TimingTable::default());
        session.start(5);
        let timer = session.advance_timer();

        assert_eq!(
            session.navigate(0),
            Err(NavigateError::OutOfRange { target: 0, total: 12 })
        );
        assert!(session.navigate(13).is_err());
        assert_eq!(session.current_page(), 5);
        assert_eq!(session.advance_timer(), timer);

        let effects = session.navigate_or_alert(13);
        assert!(matches!(
            effects.as_slice(),
            [PlayerEffect::Alert(msg)] if msg.contains("1 and 12")
        ));
    }

    #[test]
    fn navigating_home_reschedules_with_that_pages_duration() -> anyhow::Result<()> {
        let mut session = PlayerSession::new(12, table(&[(1, 9), (5, 4)]));
        session.start(5);
        let old = session.advance_timer();

        let effects = session.navigate(1)?;
        assert_eq!(session.current_page(), 1);
        assert_eq!(
            effects[0],
            PlayerEffect::LoadPage {
                page: 1,
                src: "page1.html".into()
            }
        );
        assert_eq!(
            effects[1],
            PlayerEffect::CancelAdvance(old.ok_or_else(|| anyhow::anyhow!("no timer"))?)
        );
        assert_eq!(scheduled(&effects), vec![Duration::from_secs(9)]);
        Ok(())
    }

    #[test]
    fn pages_missing_from_the_table_use_the_default() -> anyhow::Result<()> {
        let mut session = PlayerSession::new(3, table(&[(1, 4)]));
        let effects = session.navigate(2)?;
        assert_eq!(scheduled(&effects), vec![Duration::from_secs(10)]);
        Ok(())
    }

    #[test]
    fn advance_timeout_moves_forward_and_ignores_stale_timers() {
        let mut session = PlayerSession::new(3, TimingTable::default());
        session.start(1);
        let first = session.advance_timer().unwrap();
        session.on_key("ArrowRight", false);
        assert_eq!(session.current_page(), 2);

        assert!(session.on_advance_timeout(first).is_empty());
        assert_eq!(session.current_page(), 2);

        let live = session.advance_timer().unwrap();
        session.on_advance_timeout(live);
        assert_eq!(session.current_page(), 3);

        let last = session.advance_timer().unwrap();
        let effects = session.on_advance_timeout(last);
        assert!(matches!(effects.as_slice(), [PlayerEffect::Alert(_)]));
        assert_eq!(session.current_page(), 3);
    }

    #[test]
    fn at_most_one_advance_timer_is_live() {
        let mut session = PlayerSession::new(10, TimingTable::default());
        let mut live = 0i32;
        let mut apply = |effects: Vec<PlayerEffect>| {
            for effect in effects {
                match effect {
                    PlayerEffect::ScheduleAdvance { .. } => live += 1,
                    PlayerEffect::CancelAdvance(_) => live -= 1,
                    _ => {}
                }
            }
            live
        };
        apply(session.start(1));
        for key in ["ArrowRight", "ArrowRight", "Home", "a", "a", "ArrowLeft"] {
            let effects = session.on_key(key, false).unwrap_or_default();
            assert!(apply(effects) <= 1, "after {key}");
        }
        assert!(apply(session.set_timing(table(&[(1, 3)]))) <= 1);
    }

    #[test]
    fn disabling_auto_advance_cancels_the_timer() {
        let mut session = PlayerSession::new(4, TimingTable::default());
        session.start(2);
        let timer = session.advance_timer().unwrap();
        assert_eq!(
            session.on_key("A", false),
            Some(vec![PlayerEffect::CancelAdvance(timer)])
        );
        assert!(!session.auto_advance());
        assert!(scheduled(&session.navigate_or_alert(3)).is_empty());
    }

    #[test]
    fn frame_keys_are_forwarded_as_commands() {
        let mut session = PlayerSession::new(4, TimingTable::default());
        assert_eq!(
            session.on_key("ArrowUp", false),
            Some(vec![PlayerEffect::SendToFrame(FrameCommand::NextFrame)])
        );
        assert_eq!(
            session.on_key("ArrowDown", false),
            Some(vec![PlayerEffect::SendToFrame(FrameCommand::PreviousFrame)])
        );
        assert_eq!(
            session.on_key(" ", false),
            Some(vec![PlayerEffect::SendToFrame(FrameCommand::TogglePause)])
        );
        assert_eq!(session.on_key("f", true), Some(vec![PlayerEffect::FocusFrame]));
        assert_eq!(session.on_key("q", false), None);
    }

    #[test]
    fn initial_page_query_is_validated() {
        assert_eq!(resolve_initial_page(Some("7"), 12), 7);
        assert_eq!(resolve_initial_page(Some("13"), 12), 1);
        assert_eq!(resolve_initial_page(Some("zero"), 12), 1);
        assert_eq!(resolve_initial_page(None, 12), 1);
        assert_eq!(total_pages_for(0), DEFAULT_TOTAL_PAGES);
    }

    #[test]
    fn teleport_and_mute_messages_from_the_frame() {
        let mut session = PlayerSession::new(4, TimingTable::default());
        session.start(1);
        assert_eq!(
            session.on_host_message(HostMessage::Teleport {
                url: "/stories/s/player.html?page=3".into()
            }),
            vec![PlayerEffect::NavigateTop {
                url: "/stories/s/player.html?page=3".into()
            }]
        );
        assert_eq!(
            session.on_host_message(HostMessage::MuteBackground),
            vec![PlayerEffect::MuteBackground]
        );
        let effects = session.navigate_or_alert(2);
        assert_eq!(effects.last(), Some(&PlayerEffect::UnmuteBackground));
    }

    #[test]
    fn script_urls_from_the_frame_are_not_followed() {
        let mut session = PlayerSession::new(4, TimingTable::default());
        session.start(1);
        for url in ["javascript:alert(document.cookie)", "data:text/html,hi"] {
            let message = HostMessage::decode(
                &serde_json::json!({"type": "teleport", "url": url}).to_string(),
            )
            .expect("decode teleport");
            assert!(session.on_host_message(message).is_empty(), "{url}");
        }
        assert_eq!(session.current_page(), 1);
    }

    #[test]
    fn only_the_latest_page_load_auto_starts_the_slideshow() {
        let mut session = PlayerSession::new(4, TimingTable::default());
        let first = session.on_frame_loaded();
        let second = session.on_frame_loaded();
        let load_of = |effects: &[PlayerEffect]| match effects {
            [PlayerEffect::ScheduleAutoStart { load, after }] => {
                assert_eq!(*after, AUTO_START_DELAY);
                *load
            }
            other => panic!("unexpected {other:?}"),
        };
        assert!(session.on_auto_start_due(load_of(&first)).is_empty());
        assert_eq!(
            session.on_auto_start_due(load_of(&second)),
            vec![PlayerEffect::SendToFrame(FrameCommand::StartSlideshow)]
        );
    }

    #[test]
    fn dock_hides_after_grace_period_unless_reentered() {
        let mut session = PlayerSession::new(4, TimingTable::default());
        session.start(1);
        assert!(!session.controls_visible());

        assert_eq!(
            session.on_dock_event(DockEvent::TriggerEnter),
            vec![PlayerEffect::ShowControls]
        );
        session.on_dock_event(DockEvent::ControlsEnter);
        let effects = session.on_dock_event(DockEvent::ControlsLeave);
        let [PlayerEffect::ScheduleDockHide { timer: stale, after }] = effects.as_slice() else {
            panic!("unexpected {effects:?}");
        };
        assert_eq!(*after, DOCK_HIDE_DELAY);

        session.on_dock_event(DockEvent::ControlsEnter);
        assert!(session.on_dock_event(DockEvent::HideDue(*stale)).is_empty());
        assert!(session.controls_visible());

        let effects = session.on_dock_event(DockEvent::ControlsLeave);
        let [PlayerEffect::ScheduleDockHide { timer, .. }] = effects.as_slice() else {
            panic!("unexpected {effects:?}");
        };
        assert_eq!(
            session.on_dock_event(DockEvent::HideDue(*timer)),
            vec![PlayerEffect::HideControls]
        );

        assert_eq!(session.set_dock_mode(false), vec![PlayerEffect::ShowControls]);
        assert!(session.on_dock_event(DockEvent::ControlsLeave).is_empty());
        assert!(session.controls_visible());
    }
}
