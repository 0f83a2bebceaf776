// src/repeat.rs
//
// Repeat task registry: ten preset slots plus one inline slot.
//
// All scheduling uses `std::time::Instant` so wall-clock adjustments never
// move a task. After a task fires its next deadline is `now + interval`,
// never `stale_deadline + interval`, so a late wake-up does not burst.

use std::time::{Duration, Instant};

use crate::parser::{Payload, DEFAULT_INTERVAL_MS};

/// Number of preset slots
pub const PRESET_COUNT: usize = 10;

// ============================================================================
// Slot Identifiers
// ============================================================================

/// A preset slot number in `1..=10`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PresetSlot(u8);

impl PresetSlot {
    pub fn new(n: u8) -> Option<Self> {
        (1..=PRESET_COUNT as u8).contains(&n).then_some(Self(n))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn all() -> impl Iterator<Item = PresetSlot> {
        (1..=PRESET_COUNT as u8).map(PresetSlot)
    }
}

impl std::fmt::Display for PresetSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a task returned by [`Registry::due`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotId {
    Inline,
    Preset(PresetSlot),
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Clone, Copy, Debug)]
pub struct RepeatTask {
    pub enabled: bool,
    pub interval_ms: u32,
    pub next_fire: Instant,
}

impl RepeatTask {
    fn new(now: Instant) -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_INTERVAL_MS,
            next_fire: now,
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.interval_ms))
    }

    fn fire_if_due(&mut self, now: Instant) -> bool {
        if self.enabled && self.next_fire <= now {
            self.next_fire = now + self.interval();
            true
        } else {
            false
        }
    }
}

/// The inline slot owns a snapshot of its payload
#[derive(Clone, Debug)]
pub struct InlineTask {
    pub task: RepeatTask,
    pub payload: Payload,
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug)]
pub struct Registry {
    presets: [RepeatTask; PRESET_COUNT],
    inline: Option<InlineTask>,
}

impl Registry {
    pub fn new(now: Instant) -> Self {
        Self {
            presets: [RepeatTask::new(now); PRESET_COUNT],
            inline: None,
        }
    }

    /// Start repeating a preset. `None` keeps the slot's previous interval.
    /// The first firing is one interval from `now`; re-arming restarts the phase.
    pub fn arm_preset(&mut self, slot: PresetSlot, interval_ms: Option<u32>, now: Instant) -> u32 {
        let task = &mut self.presets[slot.index()];
        if let Some(ms) = interval_ms {
            task.interval_ms = ms;
        }
        task.enabled = true;
        task.next_fire = now + task.interval();
        tlog!("[repeat] Preset {} armed every {}ms", slot, task.interval_ms);
        task.interval_ms
    }

    /// Returns whether the slot was running
    pub fn disarm_preset(&mut self, slot: PresetSlot) -> bool {
        let task = &mut self.presets[slot.index()];
        let was_running = task.enabled;
        task.enabled = false;
        if was_running {
            tlog!("[repeat] Preset {} disarmed", slot);
        }
        was_running
    }

    /// Replace the inline task. It is due immediately.
    pub fn arm_inline(&mut self, payload: Payload, interval_ms: u32, now: Instant) {
        tlog!("[repeat] Inline repeat armed every {}ms", interval_ms);
        self.inline = Some(InlineTask {
            task: RepeatTask {
                enabled: true,
                interval_ms,
                next_fire: now,
            },
            payload,
        });
    }

    /// Drop the inline task and its payload. Returns whether one was running.
    pub fn disarm_inline(&mut self) -> bool {
        let was_running = self.inline.take().is_some();
        if was_running {
            tlog!("[repeat] Inline repeat disarmed");
        }
        was_running
    }

    /// Stop every repeat. Returns how many were running.
    pub fn disarm_all(&mut self) -> usize {
        let mut stopped = usize::from(self.inline.take().is_some());
        for task in self.presets.iter_mut().filter(|t| t.enabled) {
            task.enabled = false;
            stopped += 1;
        }
        if stopped > 0 {
            tlog!("[repeat] Disarmed {} repeat(s)", stopped);
        }
        stopped
    }

    /// Every enabled task with `next_fire <= now`, inline first then presets
    /// in slot order. Each returned task is rescheduled to `now + interval`.
    pub fn due(&mut self, now: Instant) -> Vec<SlotId> {
        let mut fired = Vec::new();
        if let Some(inline) = self.inline.as_mut() {
            if inline.task.fire_if_due(now) {
                fired.push(SlotId::Inline);
            }
        }
        for slot in PresetSlot::all() {
            if self.presets[slot.index()].fire_if_due(now) {
                fired.push(SlotId::Preset(slot));
            }
        }
        fired
    }

    /// Time until the soonest enabled task, zero if one is already due
    pub fn soonest_wait(&self, now: Instant) -> Option<Duration> {
        self.enabled_tasks()
            .map(|t| t.next_fire.saturating_duration_since(now))
            .min()
    }

    fn enabled_tasks(&self) -> impl Iterator<Item = &RepeatTask> {
        self.inline
            .iter()
            .map(|i| &i.task)
            .chain(self.presets.iter())
            .filter(|t| t.enabled)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn preset(&self, slot: PresetSlot) -> &RepeatTask {
        &self.presets[slot.index()]
    }

    pub fn is_preset_running(&self, slot: PresetSlot) -> bool {
        self.presets[slot.index()].enabled
    }

    pub fn inline(&self) -> Option<&InlineTask> {
        self.inline.as_ref()
    }

    /// Running presets with their intervals, in slot order
    pub fn running_presets(&self) -> Vec<(PresetSlot, u32)> {
        PresetSlot::all()
            .filter(|s| self.is_preset_running(*s))
            .map(|s| (s, self.presets[s.index()].interval_ms))
            .collect()
    }

    pub fn any_running(&self) -> bool {
        self.enabled_tasks().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u8) -> PresetSlot {
        PresetSlot::new(n).unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_preset_slot_range() {
        assert!(PresetSlot::new(0).is_none());
        assert!(PresetSlot::new(11).is_none());
        assert_eq!(slot(10).index(), 9);
        assert_eq!(PresetSlot::all().count(), PRESET_COUNT);
    }

    #[test]
    fn test_fires_without_drift() {
        let t0 = Instant::now();
        let mut reg = Registry::new(t0);
        reg.arm_preset(slot(3), Some(250), t0);

        let mut firings = 0;
        for step in 1..=999u64 {
            firings += reg.due(t0 + ms(step)).len();
        }
        assert_eq!(firings, 3);
        assert_eq!(reg.preset(slot(3)).next_fire, t0 + ms(1000));
    }

    #[test]
    fn test_late_tick_does_not_burst() {
        let t0 = Instant::now();
        let mut reg = Registry::new(t0);
        reg.arm_preset(slot(1), Some(100), t0);

        assert_eq!(reg.due(t0 + ms(550)), vec![SlotId::Preset(slot(1))]);
        assert!(reg.due(t0 + ms(551)).is_empty());
        assert_eq!(reg.preset(slot(1)).next_fire, t0 + ms(650));
    }

    #[test]
    fn test_disarm_stops_and_rearm_resets_phase() {
        let t0 = Instant::now();
        let mut reg = Registry::new(t0);
        reg.arm_preset(slot(2), Some(300), t0);
        assert_eq!(reg.due(t0 + ms(300)).len(), 1);

        assert!(reg.disarm_preset(slot(2)));
        assert!(reg.due(t0 + ms(600)).is_empty());
        assert!(!reg.disarm_preset(slot(2)));

        reg.arm_preset(slot(2), None, t0 + ms(650));
        assert_eq!(reg.preset(slot(2)).interval_ms, 300);
        assert!(reg.due(t0 + ms(900)).is_empty());
        assert_eq!(reg.due(t0 + ms(950)).len(), 1);
    }

    #[test]
    fn test_inline_fires_immediately_and_replaces() {
        let t0 = Instant::now();
        let mut reg = Registry::new(t0);
        reg.arm_inline(Payload::hex(vec![1]), 500, t0);
        assert_eq!(reg.due(t0), vec![SlotId::Inline]);

        reg.arm_inline(Payload::hex(vec![2]), 200, t0 + ms(10));
        assert_eq!(reg.inline().unwrap().payload.bytes(), &[2]);
        assert_eq!(reg.due(t0 + ms(10)), vec![SlotId::Inline]);

        assert!(reg.disarm_inline());
        assert!(reg.inline().is_none());
        assert!(!reg.disarm_inline());
    }

    #[test]
    fn test_due_order_inline_then_presets() {
        let t0 = Instant::now();
        let mut reg = Registry::new(t0);
        reg.arm_preset(slot(5), Some(100), t0);
        reg.arm_preset(slot(1), Some(100), t0);
        reg.arm_inline(Payload::hex(vec![0]), 100, t0);

        assert_eq!(
            reg.due(t0 + ms(100)),
            vec![SlotId::Inline, SlotId::Preset(slot(1)), SlotId::Preset(slot(5))]
        );
    }

    #[test]
    fn test_soonest_wait() {
        let t0 = Instant::now();
        let mut reg = Registry::new(t0);
        assert_eq!(reg.soonest_wait(t0), None);

        reg.arm_preset(slot(1), Some(400), t0);
        reg.arm_preset(slot(2), Some(150), t0);
        assert_eq!(reg.soonest_wait(t0 + ms(50)), Some(ms(100)));
        assert_eq!(reg.soonest_wait(t0 + ms(200)), Some(Duration::ZERO));
    }

    #[test]
    fn test_disarm_all() {
        let t0 = Instant::now();
        let mut reg = Registry::new(t0);
        reg.arm_preset(slot(1), None, t0);
        reg.arm_preset(slot(4), None, t0);
        reg.arm_inline(Payload::text("hi"), 100, t0);

        assert_eq!(reg.disarm_all(), 3);
        assert!(!reg.any_running());
        assert_eq!(reg.disarm_all(), 0);
    }

    #[test]
    fn test_running_presets() {
        let t0 = Instant::now();
        let mut reg = Registry::new(t0);
        reg.arm_preset(slot(7), Some(20), t0);
        reg.arm_preset(slot(2), None, t0);
        assert_eq!(reg.running_presets(), vec![(slot(2), 1000), (slot(7), 20)]);
    }
}
