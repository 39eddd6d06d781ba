//! In-memory [`Surface`] with simulated scroll geometry.
//!
//! Every block is laid out as one title line plus one line per field and per
//! sub-block row, each [`LINE_HEIGHT_PX`] tall. The binary dumps it as text;
//! tests inspect it directly.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::render::format::Tone;
use crate::render::surface::{
    BlockKind, DisplayField, FieldName, PanelId, Placement, RenderedView, SubBlock, Surface,
    VisualHandle,
};
use crate::state::scroll::ScrollContainer;

pub const LINE_HEIGHT_PX: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub field: DisplayField,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub handle: VisualHandle,
    pub key: String,
    pub title: String,
    pub cells: Vec<Cell>,
    pub sub_blocks: Vec<SubBlock>,
}

impl Block {
    fn from_view(handle: VisualHandle, key: &str, view: &RenderedView) -> Self {
        Self {
            handle,
            key: key.to_string(),
            title: view.title.clone(),
            cells: view
                .fields
                .iter()
                .map(|field| Cell {
                    field: field.clone(),
                    highlighted: false,
                })
                .collect(),
            sub_blocks: view.blocks.clone(),
        }
    }

    pub fn height(&self) -> f64 {
        let sub_lines: usize = self.sub_blocks.iter().map(|b| 1 + b.fields.len()).sum();
        (1 + self.cells.len() + sub_lines) as f64 * LINE_HEIGHT_PX
    }

    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.field.name == name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.cell(name).map(|c| c.field.text.as_str())
    }

    pub fn tone(&self, name: &str) -> Option<Tone> {
        self.cell(name).and_then(|c| c.field.tone)
    }

    pub fn is_highlighted(&self, name: &str) -> bool {
        self.cell(name).is_some_and(|c| c.highlighted)
    }

    pub fn sub_block(&self, kind: BlockKind) -> Option<&SubBlock> {
        self.sub_blocks.iter().find(|b| b.kind == kind)
    }

    fn cell_mut(&mut self, name: &str) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.field.name == name)
    }
}

#[derive(Debug, Clone, Copy)]
struct Viewport {
    client_height: f64,
    scroll_top: f64,
}

#[derive(Debug, Clone, Default)]
struct Panel {
    blocks: Vec<Block>,
    viewport: Option<Viewport>,
    placeholder: Option<&'static str>,
}

impl ScrollContainer for Panel {
    fn scroll_top(&self) -> f64 {
        self.viewport.map_or(0.0, |v| v.scroll_top)
    }

    fn client_height(&self) -> f64 {
        self.viewport.map_or(0.0, |v| v.client_height)
    }

    fn scroll_height(&self) -> f64 {
        let content: f64 = self.blocks.iter().map(Block::height).sum();
        content.max(self.client_height())
    }

    fn set_scroll_top(&mut self, top: f64) {
        let max = (self.scroll_height() - self.client_height()).max(0.0);
        if let Some(viewport) = self.viewport.as_mut() {
            viewport.scroll_top = top.clamp(0.0, max);
        }
    }
}

#[derive(Debug, Default)]
pub struct HeadlessSurface {
    panels: BTreeMap<PanelId, Panel>,
    owners: HashMap<VisualHandle, PanelId>,
    next_handle: u64,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives a panel a scrollable viewport of `client_height` pixels.
    pub fn with_viewport(mut self, panel: PanelId, client_height: f64) -> Self {
        self.panels.entry(panel).or_default().viewport = Some(Viewport {
            client_height,
            scroll_top: 0.0,
        });
        self
    }

    /// Text shown by [`render_text`](Self::render_text) while a panel is empty.
    pub fn with_placeholder(mut self, panel: PanelId, text: &'static str) -> Self {
        self.panels.entry(panel).or_default().placeholder = Some(text);
        self
    }

    pub fn blocks(&self, panel: PanelId) -> &[Block] {
        self.panels.get(&panel).map(|p| p.blocks.as_slice()).unwrap_or(&[])
    }

    pub fn keys(&self, panel: PanelId) -> Vec<&str> {
        self.blocks(panel).iter().map(|b| b.key.as_str()).collect()
    }

    pub fn block(&self, panel: PanelId, key: &str) -> Option<&Block> {
        self.blocks(panel).iter().find(|b| b.key == key)
    }

    /// Number of live blocks across all panels.
    pub fn live_blocks(&self) -> usize {
        self.owners.len()
    }

    pub fn scroll_top(&self, panel: PanelId) -> f64 {
        self.panels.get(&panel).map_or(0.0, |p| p.scroll_top())
    }

    pub fn scroll_height(&self, panel: PanelId) -> f64 {
        self.panels.get(&panel).map_or(0.0, |p| p.scroll_height())
    }

    pub fn client_height(&self, panel: PanelId) -> f64 {
        self.panels.get(&panel).map_or(0.0, |p| p.client_height())
    }

    /// Simulates the viewer scrolling a panel.
    pub fn scroll_to(&mut self, panel: PanelId, top: f64) {
        if let Some(p) = self.panels.get_mut(&panel) {
            p.set_scroll_top(top);
        }
    }

    pub fn scroll_to_bottom(&mut self, panel: PanelId) {
        let bottom = self.scroll_height(panel);
        self.scroll_to(panel, bottom);
    }

    /// Plain-text frame of one panel.
    pub fn render_text(&self, panel: PanelId) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "== {panel} ==");
        let Some(p) = self.panels.get(&panel) else {
            return out;
        };
        if p.blocks.is_empty() {
            if let Some(placeholder) = p.placeholder {
                let _ = writeln!(out, "  {placeholder}");
            }
            return out;
        }
        for block in &p.blocks {
            let _ = writeln!(out, "[{}]", block.title);
            for cell in &block.cells {
                write_field(&mut out, "  ", &cell.field, cell.highlighted);
            }
            for sub in &block.sub_blocks {
                let _ = writeln!(out, "  <{}>", sub.kind.as_str());
                for field in &sub.fields {
                    write_field(&mut out, "    ", field, false);
                }
            }
        }
        out
    }

    /// Frames of every known panel, in panel order.
    pub fn render_all(&self) -> String {
        self.panels.keys().map(|panel| self.render_text(*panel)).collect()
    }

    fn block_mut(&mut self, handle: VisualHandle) -> Option<&mut Block> {
        let panel = self.owners.get(&handle)?;
        self.panels
            .get_mut(panel)?
            .blocks
            .iter_mut()
            .find(|b| b.handle == handle)
    }

    fn detach(&mut self, handle: VisualHandle) -> Option<(PanelId, usize)> {
        let panel = self.owners.remove(&handle)?;
        let blocks = &mut self.panels.get_mut(&panel)?.blocks;
        let at = blocks.iter().position(|b| b.handle == handle)?;
        blocks.remove(at);
        Some((panel, at))
    }
}

fn write_field(out: &mut String, indent: &str, field: &DisplayField, highlighted: bool) {
    let tone = match field.tone {
        Some(Tone::Positive) => " (+)",
        Some(Tone::Negative) => " (-)",
        Some(Tone::Neutral) => " (=)",
        None => "",
    };
    let mark = if highlighted { " *" } else { "" };
    let _ = writeln!(out, "{indent}{}: {}{tone}{mark}", field.label, field.text);
}

impl Surface for HeadlessSurface {
    fn create(
        &mut self,
        panel: PanelId,
        key: &str,
        view: &RenderedView,
        placement: Placement,
    ) -> VisualHandle {
        self.next_handle += 1;
        let handle = VisualHandle(self.next_handle);
        let block = Block::from_view(handle, key, view);

        let slot = match placement {
            Placement::Replace(old) => self
                .detach(old)
                .filter(|(owner, _)| *owner == panel)
                .map(|(_, at)| at),
            Placement::At(index) => Some(index),
            Placement::Append => None,
        };

        let blocks = &mut self.panels.entry(panel).or_default().blocks;
        match slot {
            Some(at) => blocks.insert(at.min(blocks.len()), block),
            None => blocks.push(block),
        }
        self.owners.insert(handle, panel);
        handle
    }

    fn update_field(&mut self, handle: VisualHandle, field: &DisplayField) {
        let Some(block) = self.block_mut(handle) else {
            return;
        };
        match block.cell_mut(field.name) {
            Some(cell) => cell.field = field.clone(),
            None => block.cells.push(Cell {
                field: field.clone(),
                highlighted: false,
            }),
        }
    }

    fn remove_field(&mut self, handle: VisualHandle, field: FieldName) {
        if let Some(block) = self.block_mut(handle) {
            block.cells.retain(|c| c.field.name != field);
        }
    }

    fn set_highlight(&mut self, handle: VisualHandle, field: FieldName, on: bool) {
        if let Some(cell) = self.block_mut(handle).and_then(|b| b.cell_mut(field)) {
            cell.highlighted = on;
        }
    }

    fn attach_block(&mut self, handle: VisualHandle, block: &SubBlock) {
        if let Some(target) = self.block_mut(handle) {
            target.sub_blocks.retain(|b| b.kind != block.kind);
            target.sub_blocks.push(block.clone());
        }
    }

    fn update_block(&mut self, handle: VisualHandle, block: &SubBlock) {
        if let Some(target) = self.block_mut(handle) {
            match target.sub_blocks.iter_mut().find(|b| b.kind == block.kind) {
                Some(existing) => *existing = block.clone(),
                None => target.sub_blocks.push(block.clone()),
            }
        }
    }

    fn detach_block(&mut self, handle: VisualHandle, kind: BlockKind) {
        if let Some(target) = self.block_mut(handle) {
            target.sub_blocks.retain(|b| b.kind != kind);
        }
    }

    fn release(&mut self, handle: VisualHandle) {
        self.detach(handle);
    }

    fn container(&mut self, panel: PanelId) -> Option<&mut dyn ScrollContainer> {
        let p = self.panels.get_mut(&panel)?;
        if p.viewport.is_none() {
            return None;
        }
        Some(p as &mut dyn ScrollContainer)
    }
}
