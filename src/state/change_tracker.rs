use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::render::format::Tone;
use crate::render::surface::{DisplayField, FieldName, VisualHandle};

/// Fields of one record that differ from the last committed rendition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Formatted text differs: rewrite and (for flashing fields) highlight.
    pub changed: Vec<FieldName>,
    /// Same text, different tone: restyle only, never highlighted.
    pub restyled: Vec<FieldName>,
    /// Displayed last time, absent now.
    pub removed: Vec<FieldName>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.restyled.is_empty() && self.removed.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.changed.iter().any(|f| *f == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Rendered {
    text: String,
    tone: Option<Tone>,
}

/// Last formatted value of every displayed field of one record.
///
/// Comparison is on formatted strings: two raw values that render the same
/// at display precision are the same value as far as the viewer is concerned.
#[derive(Debug, Clone, Default)]
pub struct FieldChangeTracker {
    last: HashMap<FieldName, Rendered>,
}

impl FieldChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diff(&self, fields: &[DisplayField]) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for field in fields {
            match self.last.get(field.name) {
                Some(prev) if prev.text == field.text => {
                    if prev.tone != field.tone {
                        changes.restyled.push(field.name);
                    }
                }
                _ => changes.changed.push(field.name),
            }
        }
        let mut removed: Vec<FieldName> = self
            .last
            .keys()
            .copied()
            .filter(|name| !fields.iter().any(|f| f.name == *name))
            .collect();
        removed.sort_unstable();
        changes.removed = removed;
        changes
    }

    /// Makes `fields` the new baseline. Fields no longer displayed are
    /// forgotten so that their reappearance counts as a change.
    pub fn commit(&mut self, fields: &[DisplayField]) {
        self.last.clear();
        for field in fields {
            self.last.insert(
                field.name,
                Rendered {
                    text: field.text.clone(),
                    tone: field.tone,
                },
            );
        }
    }

    pub fn last_text(&self, name: &str) -> Option<&str> {
        self.last.get(name).map(|r| r.text.as_str())
    }
}

/// Deadlines of the transient "updated" highlights.
///
/// Flagging a field that is already lit restarts its window instead of
/// stacking a second one.
#[derive(Debug, Clone)]
pub struct HighlightSchedule {
    duration: Duration,
    deadlines: HashMap<(VisualHandle, FieldName), Instant>,
}

impl HighlightSchedule {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadlines: HashMap::new(),
        }
    }

    /// Returns true if the field was not lit before.
    pub fn flag(&mut self, handle: VisualHandle, field: FieldName, now: Instant) -> bool {
        self.deadlines
            .insert((handle, field), now + self.duration)
            .is_none()
    }

    /// Removes and returns every highlight whose window has elapsed.
    pub fn expire(&mut self, now: Instant) -> Vec<(VisualHandle, FieldName)> {
        let mut expired: Vec<_> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(slot, _)| *slot)
            .collect();
        expired.sort();
        for slot in &expired {
            self.deadlines.remove(slot);
        }
        expired
    }

    /// Drops pending highlights of a block that no longer exists.
    pub fn forget(&mut self, handle: VisualHandle) {
        self.deadlines.retain(|(h, _), _| *h != handle);
    }

    pub fn is_lit(&self, handle: VisualHandle, field: &str) -> bool {
        self.deadlines.keys().any(|(h, f)| *h == handle && *f == field)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(name: FieldName, text: &str) -> DisplayField {
        DisplayField::new(name, name, text)
    }

    #[test]
    fn first_diff_reports_every_field() {
        let tracker = FieldChangeTracker::new();
        let changes = tracker.diff(&[price("open", "1.00"), price("close", "2.00")]);
        assert_eq!(changes.changed, ["open", "close"]);
    }

    #[test]
    fn identical_rendition_yields_empty_change_set() {
        let mut tracker = FieldChangeTracker::new();
        let fields = [price("open", "100.00"), price("close", "101.00")];
        tracker.commit(&fields);
        assert!(tracker.diff(&fields).is_empty());
    }

    #[test]
    fn sub_precision_noise_is_not_a_change() {
        use crate::render::format::fixed;

        let mut tracker = FieldChangeTracker::new();
        tracker.commit(&[price("close", &fixed(100.001, 2))]);
        let changes = tracker.diff(&[price("close", &fixed(100.004, 2))]);
        assert!(changes.is_empty());
    }

    #[test]
    fn tone_only_change_is_a_restyle() {
        let mut tracker = FieldChangeTracker::new();
        tracker.commit(&[price("pnl", "₹0").tone(None)]);
        let changes = tracker.diff(&[price("pnl", "₹0").tone(Tone::Neutral)]);
        assert!(changes.changed.is_empty());
        assert_eq!(changes.restyled, ["pnl"]);
    }

    #[test]
    fn dropped_field_counts_as_new_when_it_returns() {
        let mut tracker = FieldChangeTracker::new();
        tracker.commit(&[price("vwap", "99.10")]);
        assert_eq!(tracker.diff(&[]).removed, ["vwap"]);
        tracker.commit(&[]);
        assert!(tracker.diff(&[price("vwap", "99.10")]).contains("vwap"));
    }

    #[test]
    fn reflag_restarts_the_window() {
        let start = Instant::now();
        let mut schedule = HighlightSchedule::new(Duration::from_millis(1000));
        let h = VisualHandle(1);

        assert!(schedule.flag(h, "close", start));
        assert!(!schedule.flag(h, "close", start + Duration::from_millis(600)));
        assert_eq!(schedule.len(), 1);

        assert!(schedule.expire(start + Duration::from_millis(1000)).is_empty());
        assert!(schedule.is_lit(h, "close"));

        let expired = schedule.expire(start + Duration::from_millis(1600));
        assert_eq!(expired, [(h, "close")]);
        assert!(schedule.is_empty());
    }

    #[test]
    fn forget_drops_pending_highlights() {
        let now = Instant::now();
        let mut schedule = HighlightSchedule::new(Duration::from_millis(1000));
        schedule.flag(VisualHandle(1), "open", now);
        schedule.flag(VisualHandle(2), "open", now);
        schedule.forget(VisualHandle(1));
        assert!(!schedule.is_lit(VisualHandle(1), "open"));
        assert!(schedule.is_lit(VisualHandle(2), "open"));
    }
}
