/// Scroll geometry of a list container, in pixels.
pub trait ScrollContainer {
    fn scroll_top(&self) -> f64;
    fn client_height(&self) -> f64;
    fn scroll_height(&self) -> f64;
    fn set_scroll_top(&mut self, top: f64);
}

/// Viewer's scroll position captured before a reconciliation pass.
///
/// Capture strictly before the first mutation of a pass and restore strictly
/// after the last one; anything in between sees a half-updated height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAnchor {
    /// The viewer was following the tail; keep following it.
    AtBottom,
    /// The viewer was reading somewhere else; keep the exact offset.
    Offset(f64),
}

impl ScrollAnchor {
    pub fn capture(container: &dyn ScrollContainer, tolerance_px: f64) -> Self {
        let top = container.scroll_top();
        let at_bottom =
            top + container.client_height() >= container.scroll_height() - tolerance_px;
        if at_bottom {
            ScrollAnchor::AtBottom
        } else {
            ScrollAnchor::Offset(top)
        }
    }

    pub fn restore(self, container: &mut dyn ScrollContainer) {
        match self {
            ScrollAnchor::AtBottom => {
                let bottom = container.scroll_height();
                container.set_scroll_top(bottom);
            }
            ScrollAnchor::Offset(top) => container.set_scroll_top(top),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        top: f64,
        client: f64,
        content: f64,
    }

    impl ScrollContainer for Fake {
        fn scroll_top(&self) -> f64 {
            self.top
        }
        fn client_height(&self) -> f64 {
            self.client
        }
        fn scroll_height(&self) -> f64 {
            self.content.max(self.client)
        }
        fn set_scroll_top(&mut self, top: f64) {
            self.top = top.clamp(0.0, (self.scroll_height() - self.client).max(0.0));
        }
    }

    #[test]
    fn within_tolerance_counts_as_bottom() {
        let fake = Fake { top: 391.0, client: 100.0, content: 500.0 };
        assert_eq!(ScrollAnchor::capture(&fake, 10.0), ScrollAnchor::AtBottom);

        let fake = Fake { top: 389.0, client: 100.0, content: 500.0 };
        assert_eq!(ScrollAnchor::capture(&fake, 10.0), ScrollAnchor::Offset(389.0));
    }

    #[test]
    fn bottom_anchor_follows_growth() {
        let mut fake = Fake { top: 400.0, client: 100.0, content: 500.0 };
        let anchor = ScrollAnchor::capture(&fake, 10.0);
        fake.content = 560.0;
        anchor.restore(&mut fake);
        assert_eq!(fake.top, 460.0);
    }

    #[test]
    fn offset_anchor_keeps_reading_position() {
        let mut fake = Fake { top: 200.0, client: 100.0, content: 500.0 };
        let anchor = ScrollAnchor::capture(&fake, 10.0);
        fake.content = 560.0;
        fake.top = 0.0;
        anchor.restore(&mut fake);
        assert_eq!(fake.top, 200.0);
    }

    #[test]
    fn short_content_is_always_at_bottom() {
        let fake = Fake { top: 0.0, client: 300.0, content: 120.0 };
        assert_eq!(ScrollAnchor::capture(&fake, 10.0), ScrollAnchor::AtBottom);
    }
}
