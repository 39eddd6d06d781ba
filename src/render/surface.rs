//! Seam between the reconciliation engine and whatever draws the dashboard.
//!
//! The engine only ever talks to a [`Surface`]; it never reads rendered text
//! back. Previous values live in the engine's own change tracker.

use std::fmt;

use crate::render::format::Tone;
use crate::state::scroll::ScrollContainer;

/// Stable name of a displayed field, e.g. `"close"`.
pub type FieldName = &'static str;

/// Identifies one panel (one engine) on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PanelId(pub &'static str);

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Opaque handle to a block drawn on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisualHandle(pub u64);

/// One formatted value as it appears on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayField {
    pub name: FieldName,
    pub label: &'static str,
    pub text: String,
    /// `None` means the value carries no colour class at all.
    pub tone: Option<Tone>,
    /// Whether a text change flashes the transient highlight.
    pub flash: bool,
}

impl DisplayField {
    pub fn new(name: FieldName, label: &'static str, text: impl Into<String>) -> Self {
        Self {
            name,
            label,
            text: text.into(),
            tone: None,
            flash: true,
        }
    }

    pub fn tone(mut self, tone: impl Into<Option<Tone>>) -> Self {
        self.tone = tone.into();
        self
    }

    /// Updated silently: clocks and badges change every cycle and would
    /// otherwise flash constantly.
    pub fn quiet(mut self) -> Self {
        self.flash = false;
        self
    }
}

/// Optional structural part of a block, added or removed by presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockKind {
    TradeDetails,
    Recommendation,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::TradeDetails => "trade-details",
            BlockKind::Recommendation => "recommendation",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubBlock {
    pub kind: BlockKind,
    pub fields: Vec<DisplayField>,
}

/// Complete formatted rendition of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedView {
    pub title: String,
    pub fields: Vec<DisplayField>,
    pub blocks: Vec<SubBlock>,
}

impl RenderedView {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn field(mut self, field: DisplayField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn block(mut self, kind: BlockKind, fields: Vec<DisplayField>) -> Self {
        self.blocks.push(SubBlock { kind, fields });
        self
    }

    pub fn get(&self, name: &str) -> Option<&DisplayField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn sub_block(&self, kind: BlockKind) -> Option<&SubBlock> {
        self.blocks.iter().find(|b| b.kind == kind)
    }
}

/// Where a newly created block goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// After the last block of the panel.
    Append,
    /// At a position in the panel, clamped to its length.
    At(usize),
    /// In place of an existing block, which the surface releases.
    Replace(VisualHandle),
}

/// Drawing backend.
pub trait Surface {
    fn create(
        &mut self,
        panel: PanelId,
        key: &str,
        view: &RenderedView,
        placement: Placement,
    ) -> VisualHandle;

    /// Rewrites the text and tone of one field of an existing block.
    fn update_field(&mut self, handle: VisualHandle, field: &DisplayField);

    /// Drops a field the entity no longer reports.
    fn remove_field(&mut self, handle: VisualHandle, field: FieldName);

    fn set_highlight(&mut self, handle: VisualHandle, field: FieldName, on: bool);

    fn attach_block(&mut self, handle: VisualHandle, block: &SubBlock);

    fn update_block(&mut self, handle: VisualHandle, block: &SubBlock);

    fn detach_block(&mut self, handle: VisualHandle, kind: BlockKind);

    fn release(&mut self, handle: VisualHandle);

    /// Scrollable container of a panel, if it has one.
    fn container(&mut self, panel: PanelId) -> Option<&mut dyn ScrollContainer>;
}
