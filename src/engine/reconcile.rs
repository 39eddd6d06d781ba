use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::engine::entity::Entity;
use crate::render::surface::{BlockKind, PanelId, Placement, RenderedView, Surface, VisualHandle};
use crate::state::change_tracker::{ChangeSet, HighlightSchedule};
use crate::state::scroll::ScrollAnchor;
use crate::state::store::{Upsert, ViewRecord, ViewRecordStore};

/// How a panel treats keys across snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Scrollback list: append on first sighting, patch in place afterwards,
    /// evict the earliest-inserted records beyond `capacity`.
    BoundedFeed { capacity: usize },
    /// Live set: a key missing from the latest snapshot is removed.
    PresenceSet,
    /// Exactly one record, replaced in place when the key changes.
    Singleton,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::BoundedFeed { .. } => "bounded_feed",
            Mode::PresenceSet => "presence_set",
            Mode::Singleton => "singleton",
        }
    }
}

/// What one `apply` did to a panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub created: Vec<String>,
    pub patched: Vec<String>,
    pub removed: Vec<String>,
    pub evicted: Vec<String>,
    /// Change sets of patched records that actually changed.
    pub changes: Vec<(String, ChangeSet)>,
    pub highlighted: usize,
}

impl ApplyReport {
    pub fn changes_for(&self, key: &str) -> Option<&ChangeSet> {
        self.changes.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }

    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.removed.is_empty()
            && self.evicted.is_empty()
            && self.changes.is_empty()
    }
}

/// Reconciles successive snapshots of one panel against what is on screen.
///
/// `apply` runs to completion synchronously; the caller guarantees passes
/// never interleave.
#[derive(Debug)]
pub struct ReconciliationEngine {
    panel: PanelId,
    mode: Mode,
    store: ViewRecordStore,
    highlights: HighlightSchedule,
    scroll_tolerance_px: f64,
}

impl ReconciliationEngine {
    pub fn new(
        panel: PanelId,
        mode: Mode,
        highlight_duration: Duration,
        scroll_tolerance_px: f64,
    ) -> Self {
        Self {
            panel,
            mode,
            store: ViewRecordStore::new(),
            highlights: HighlightSchedule::new(highlight_duration),
            scroll_tolerance_px,
        }
    }

    pub fn panel(&self) -> PanelId {
        self.panel
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn store(&self) -> &ViewRecordStore {
        &self.store
    }

    pub fn highlights(&self) -> &HighlightSchedule {
        &self.highlights
    }

    pub fn apply<E, S>(&mut self, snapshot: &[E], surface: &mut S, now: Instant) -> ApplyReport
    where
        E: Entity,
        S: Surface + ?Sized,
    {
        let mut report = ApplyReport::default();
        let entries: Vec<(String, RenderedView)> = match self.mode {
            // Only the last entity of the snapshot survives a single-slot pass.
            Mode::Singleton => snapshot.last().map(|e| (e.key(), e.view())).into_iter().collect(),
            _ => collapse_duplicates(snapshot.iter().map(|e| (e.key(), e.view()))),
        };

        let anchor = match self.mode {
            Mode::BoundedFeed { .. } => surface
                .container(self.panel)
                .map(|c| ScrollAnchor::capture(c, self.scroll_tolerance_px)),
            _ => None,
        };

        let mut replaced = None;
        match self.mode {
            Mode::PresenceSet => {
                let present: HashSet<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
                let stale: Vec<String> = self
                    .store
                    .keys()
                    .filter(|k| !present.contains(k))
                    .map(str::to_owned)
                    .collect();
                for key in stale {
                    self.discard(&key, surface);
                    report.removed.push(key);
                }
            }
            Mode::Singleton => {
                let incoming = entries.first().map(|(k, _)| k.as_str());
                let current: Option<String> = self.store.keys().next().map(str::to_owned);
                if let Some(current) = current {
                    if incoming != Some(current.as_str()) {
                        if let Some(record) = self.store.remove(&current) {
                            self.highlights.forget(record.handle);
                            if incoming.is_some() {
                                replaced = Some(record.handle);
                            } else {
                                surface.release(record.handle);
                            }
                        }
                        report.removed.push(current);
                    }
                }
            }
            Mode::BoundedFeed { .. } => {}
        }

        for (index, (key, view)) in entries.iter().enumerate() {
            let placement = match (self.mode, replaced.take()) {
                (_, Some(old)) => Placement::Replace(old),
                (Mode::BoundedFeed { .. }, None) => Placement::Append,
                (Mode::PresenceSet, None) => Placement::At(index),
                (Mode::Singleton, None) => Placement::Append,
            };
            self.reconcile_one(key, view, placement, surface, now, &mut report);
        }

        if let Mode::BoundedFeed { capacity } = self.mode {
            for record in self.store.evict_overflow(capacity) {
                self.highlights.forget(record.handle);
                surface.release(record.handle);
                report.evicted.push(record.key);
            }
        }

        if let Some(anchor) = anchor {
            if let Some(container) = surface.container(self.panel) {
                anchor.restore(container);
            }
        }

        debug!(
            panel = %self.panel,
            mode = self.mode.as_str(),
            created = report.created.len(),
            patched = report.patched.len(),
            removed = report.removed.len(),
            evicted = report.evicted.len(),
            highlighted = report.highlighted,
            "reconciled snapshot"
        );
        report
    }

    fn reconcile_one<S>(
        &mut self,
        key: &str,
        view: &RenderedView,
        placement: Placement,
        surface: &mut S,
        now: Instant,
        report: &mut ApplyReport,
    ) where
        S: Surface + ?Sized,
    {
        let panel = self.panel;
        let created = match self
            .store
            .upsert(key, || surface.create(panel, key, view, placement))
        {
            Upsert::Created(record) => {
                record.blocks = view.blocks.iter().map(|b| (b.kind, b.clone())).collect();
                record.fields.commit(&view.fields);
                true
            }
            Upsert::Existing(record) => {
                let changes = record.fields.diff(&view.fields);
                report.highlighted +=
                    patch_fields(record, view, &changes, &mut self.highlights, surface, now);
                patch_blocks(record, view, surface);
                record.fields.commit(&view.fields);
                if !changes.is_empty() {
                    report.changes.push((key.to_string(), changes));
                }
                false
            }
        };

        if created {
            report.created.push(key.to_string());
        } else {
            report.patched.push(key.to_string());
        }
    }

    /// Clears highlights whose window has elapsed; returns how many.
    pub fn expire_highlights<S>(&mut self, now: Instant, surface: &mut S) -> usize
    where
        S: Surface + ?Sized,
    {
        let expired = self.highlights.expire(now);
        for &(handle, field) in &expired {
            surface.set_highlight(handle, field, false);
        }
        expired.len()
    }

    /// Drops every record, e.g. when the panel is torn down.
    pub fn clear<S>(&mut self, surface: &mut S) -> Vec<String>
    where
        S: Surface + ?Sized,
    {
        let keys: Vec<String> = self.store.keys().map(str::to_owned).collect();
        for key in &keys {
            self.discard(key, surface);
        }
        keys
    }

    fn discard<S>(&mut self, key: &str, surface: &mut S)
    where
        S: Surface + ?Sized,
    {
        if let Some(record) = self.store.remove(key) {
            self.highlights.forget(record.handle);
            surface.release(record.handle);
        }
    }
}

/// Keeps one entry per key: first-sighting position, last-sighting value.
fn collapse_duplicates(
    entries: impl Iterator<Item = (String, RenderedView)>,
) -> Vec<(String, RenderedView)> {
    let mut out: Vec<(String, RenderedView)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (key, view) in entries {
        match index.get(&key) {
            Some(&at) => out[at].1 = view,
            None => {
                index.insert(key.clone(), out.len());
                out.push((key, view));
            }
        }
    }
    out
}

/// Rewrites changed fields and flashes the ones that flash. Returns the
/// number of highlights raised.
fn patch_fields<S>(
    record: &ViewRecord,
    view: &RenderedView,
    changes: &ChangeSet,
    highlights: &mut HighlightSchedule,
    surface: &mut S,
    now: Instant,
) -> usize
where
    S: Surface + ?Sized,
{
    let handle: VisualHandle = record.handle;
    let mut lit = 0;
    for field in &view.fields {
        if changes.contains(field.name) {
            surface.update_field(handle, field);
            if field.flash {
                highlights.flag(handle, field.name, now);
                surface.set_highlight(handle, field.name, true);
                lit += 1;
            }
        } else if changes.restyled.contains(&field.name) {
            surface.update_field(handle, field);
        }
    }
    for &name in &changes.removed {
        surface.remove_field(handle, name);
    }
    lit
}

/// Adds, refreshes or drops optional sub-blocks purely by presence in `view`.
fn patch_blocks<S>(record: &mut ViewRecord, view: &RenderedView, surface: &mut S)
where
    S: Surface + ?Sized,
{
    for block in &view.blocks {
        match record.blocks.get(&block.kind) {
            None => surface.attach_block(record.handle, block),
            Some(drawn) if drawn != block => surface.update_block(record.handle, block),
            Some(_) => continue,
        }
        record.blocks.insert(block.kind, block.clone());
    }

    let gone: Vec<BlockKind> = record
        .blocks
        .keys()
        .filter(|kind| view.sub_block(**kind).is_none())
        .copied()
        .collect();
    for kind in gone {
        record.blocks.remove(&kind);
        surface.detach_block(record.handle, kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::format::fixed;
    use crate::render::headless::{HeadlessSurface, LINE_HEIGHT_PX};
    use crate::render::surface::DisplayField;

    const FEED: PanelId = PanelId("feed");
    const HIGHLIGHT: Duration = Duration::from_millis(1000);

    #[derive(Debug, Clone)]
    struct Quote {
        key: &'static str,
        open: f64,
        close: f64,
        note: Option<&'static str>,
    }

    fn quote(key: &'static str, close: f64) -> Quote {
        Quote {
            key,
            open: 100.0,
            close,
            note: None,
        }
    }

    impl Entity for Quote {
        fn key(&self) -> String {
            self.key.to_string()
        }

        fn view(&self) -> RenderedView {
            let mut view = RenderedView::new(self.key)
                .field(DisplayField::new("open", "Open", fixed(self.open, 2)))
                .field(DisplayField::new("close", "Close", fixed(self.close, 2)));
            if let Some(note) = self.note {
                view = view.block(
                    BlockKind::Recommendation,
                    vec![DisplayField::new("note", "Note", note)],
                );
            }
            view
        }
    }

    fn feed(capacity: usize) -> ReconciliationEngine {
        ReconciliationEngine::new(FEED, Mode::BoundedFeed { capacity }, HIGHLIGHT, 10.0)
    }

    #[test]
    fn reapplying_same_snapshot_is_idempotent() {
        let mut engine = feed(20);
        let mut surface = HeadlessSurface::new();
        let now = Instant::now();
        let snapshot = [quote("NIFTY", 100.0), quote("BANKNIFTY", 200.0)];

        let first = engine.apply(&snapshot, &mut surface, now);
        assert_eq!(first.created, ["NIFTY", "BANKNIFTY"]);

        let second = engine.apply(&snapshot, &mut surface, now);
        assert!(second.changes.is_empty());
        assert_eq!(second.highlighted, 0);
        assert!(second.is_noop());
    }

    #[test]
    fn changed_field_is_patched_and_highlighted_in_place() {
        let mut engine = feed(20);
        let mut surface = HeadlessSurface::new();
        let now = Instant::now();

        engine.apply(&[quote("A", 1.0), quote("NIFTY", 100.0)], &mut surface, now);
        let report = engine.apply(&[quote("NIFTY", 101.0)], &mut surface, now);

        assert_eq!(report.patched, ["NIFTY"]);
        assert_eq!(report.changes_for("NIFTY").unwrap().changed, ["close"]);
        assert_eq!(surface.keys(FEED), ["A", "NIFTY"]);
        let block = surface.block(FEED, "NIFTY").unwrap();
        assert_eq!(block.text("close"), Some("101.00"));
        assert!(block.is_highlighted("close"));
        assert!(!block.is_highlighted("open"));
    }

    #[test]
    fn sub_precision_noise_does_not_highlight() {
        let mut engine = feed(20);
        let mut surface = HeadlessSurface::new();
        let now = Instant::now();

        engine.apply(&[quote("NIFTY", 100.001)], &mut surface, now);
        let report = engine.apply(&[quote("NIFTY", 100.004)], &mut surface, now);
        assert_eq!(report.highlighted, 0);
        assert!(!surface.block(FEED, "NIFTY").unwrap().is_highlighted("close"));
    }

    #[test]
    fn overflow_evicts_earliest_first_seen() {
        let mut engine = feed(3);
        let mut surface = HeadlessSurface::new();
        let now = Instant::now();

        engine.apply(&[quote("a", 1.0), quote("b", 1.0), quote("c", 1.0)], &mut surface, now);
        // "a" is updated, which must not save it.
        let report = engine.apply(
            &[quote("a", 2.0), quote("d", 1.0), quote("e", 1.0)],
            &mut surface,
            now,
        );

        assert_eq!(report.evicted, ["a", "b"]);
        assert_eq!(engine.store().len(), 3);
        assert_eq!(surface.keys(FEED), ["c", "d", "e"]);
        assert_eq!(surface.live_blocks(), 3);
        assert!(engine.highlights().is_empty());
    }

    #[test]
    fn duplicate_keys_keep_first_position_and_last_value() {
        let mut engine = feed(20);
        let mut surface = HeadlessSurface::new();
        let report = engine.apply(
            &[quote("x", 1.0), quote("y", 1.0), quote("x", 3.0)],
            &mut surface,
            Instant::now(),
        );
        assert_eq!(report.created, ["x", "y"]);
        assert_eq!(engine.store().len(), 2);
        assert_eq!(surface.block(FEED, "x").unwrap().text("close"), Some("3.00"));
    }

    #[test]
    fn presence_set_drops_missing_keys() {
        let mut engine =
            ReconciliationEngine::new(PanelId("positions"), Mode::PresenceSet, HIGHLIGHT, 10.0);
        let mut surface = HeadlessSurface::new();
        let now = Instant::now();

        engine.apply(&[quote("p1", 1.0), quote("p2", 1.0)], &mut surface, now);
        let report = engine.apply(&[quote("p2", 1.0), quote("p3", 1.0)], &mut surface, now);

        assert_eq!(report.removed, ["p1"]);
        assert_eq!(report.created, ["p3"]);
        assert_eq!(surface.keys(PanelId("positions")), ["p2", "p3"]);

        let report = engine.apply::<Quote, _>(&[], &mut surface, now);
        assert_eq!(report.removed, ["p2", "p3"]);
        assert!(surface.blocks(PanelId("positions")).is_empty());
    }

    #[test]
    fn singleton_replaces_in_place_and_clears_on_empty() {
        let trend = PanelId("trend");
        let mut engine = ReconciliationEngine::new(trend, Mode::Singleton, HIGHLIGHT, 10.0);
        let mut surface = HeadlessSurface::new();
        let now = Instant::now();

        engine.apply(&[quote("t1", 1.0)], &mut surface, now);
        let report = engine.apply(&[quote("t2", 1.0), quote("t3", 2.0)], &mut surface, now);
        assert_eq!(report.removed, ["t1"]);
        assert_eq!(report.created, ["t3"]);
        assert_eq!(surface.keys(trend), ["t3"]);
        assert_eq!(surface.live_blocks(), 1);

        engine.apply::<Quote, _>(&[], &mut surface, now);
        assert!(engine.store().is_empty());
        assert_eq!(surface.live_blocks(), 0);
    }

    #[test]
    fn singleton_keeps_last_arrival_even_when_its_key_repeats() {
        let trend = PanelId("trend");
        let mut engine = ReconciliationEngine::new(trend, Mode::Singleton, HIGHLIGHT, 10.0);
        let mut surface = HeadlessSurface::new();

        let report = engine.apply(
            &[quote("t2", 1.0), quote("t3", 2.0), quote("t2", 3.0)],
            &mut surface,
            Instant::now(),
        );
        assert_eq!(report.created, ["t2"]);
        assert_eq!(surface.keys(trend), ["t2"]);
        assert_eq!(surface.block(trend, "t2").unwrap().text("close"), Some("3.00"));
    }

    #[test]
    fn optional_blocks_follow_presence_not_change_set() {
        let mut engine = feed(20);
        let mut surface = HeadlessSurface::new();
        let now = Instant::now();

        engine.apply(&[quote("NIFTY", 100.0)], &mut surface, now);
        let with_note = Quote {
            note: Some("BUY_CE"),
            ..quote("NIFTY", 100.0)
        };
        let report = engine.apply(&[with_note.clone()], &mut surface, now);
        assert_eq!(report.highlighted, 0);
        assert!(
            surface
                .block(FEED, "NIFTY")
                .unwrap()
                .sub_block(BlockKind::Recommendation)
                .is_some()
        );

        engine.apply(&[quote("NIFTY", 100.0)], &mut surface, now);
        assert!(
            surface
                .block(FEED, "NIFTY")
                .unwrap()
                .sub_block(BlockKind::Recommendation)
                .is_none()
        );
    }

    #[test]
    fn highlight_expires_after_window_and_restarts_on_reflag() {
        let mut engine = feed(20);
        let mut surface = HeadlessSurface::new();
        let t0 = Instant::now();

        engine.apply(&[quote("NIFTY", 100.0)], &mut surface, t0);
        engine.apply(&[quote("NIFTY", 101.0)], &mut surface, t0);
        let t1 = t0 + Duration::from_millis(700);
        engine.apply(&[quote("NIFTY", 102.0)], &mut surface, t1);

        assert_eq!(engine.expire_highlights(t0 + HIGHLIGHT, &mut surface), 0);
        assert!(surface.block(FEED, "NIFTY").unwrap().is_highlighted("close"));

        assert_eq!(engine.expire_highlights(t1 + HIGHLIGHT, &mut surface), 1);
        assert!(!surface.block(FEED, "NIFTY").unwrap().is_highlighted("close"));
    }

    #[test]
    fn viewer_at_bottom_stays_at_bottom_after_append() {
        let mut engine = feed(20);
        let mut surface = HeadlessSurface::new().with_viewport(FEED, 100.0);
        let now = Instant::now();

        let initial: Vec<Quote> = ["a", "b", "c", "d"].into_iter().map(|k| quote(k, 1.0)).collect();
        engine.apply(&initial, &mut surface, now);
        surface.scroll_to_bottom(FEED);

        engine.apply(&[quote("e", 1.0)], &mut surface, now);
        let bottom = surface.scroll_height(FEED) - surface.client_height(FEED);
        assert_eq!(surface.scroll_top(FEED), bottom);
    }

    #[test]
    fn viewer_reading_history_keeps_offset_after_append() {
        let mut engine = feed(40);
        let mut surface = HeadlessSurface::new().with_viewport(FEED, 100.0);
        let now = Instant::now();

        let keys = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let initial: Vec<Quote> = keys.into_iter().map(|k| quote(k, 1.0)).collect();
        engine.apply(&initial, &mut surface, now);

        let height_before = surface.scroll_height(FEED);
        let top = height_before - surface.client_height(FEED) - 200.0;
        surface.scroll_to(FEED, top);

        engine.apply(&[quote("i", 1.0)], &mut surface, now);
        assert!(surface.scroll_height(FEED) > height_before);
        assert!((surface.scroll_top(FEED) - top).abs() <= 10.0);
        assert_eq!(surface.scroll_height(FEED), height_before + 3.0 * LINE_HEIGHT_PX);
    }
}
