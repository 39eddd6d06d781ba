use crate::render::surface::RenderedView;

/// Anything the engine can reconcile: a stable key plus a formatted rendition.
pub trait Entity {
    /// Identity of the subject within its panel; stable across snapshots.
    fn key(&self) -> String;

    fn view(&self) -> RenderedView;
}

impl<T: Entity + ?Sized> Entity for &T {
    fn key(&self) -> String {
        (**self).key()
    }

    fn view(&self) -> RenderedView {
        (**self).view()
    }
}
