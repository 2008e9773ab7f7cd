use serde::Deserialize;

/// Viewports narrower than this are treated as touch-primary.
pub const MOBILE_BREAKPOINT: u32 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormFactor {
    Mobile,
    Desktop,
}

impl FormFactor {
    pub fn classify(viewport: Viewport, breakpoint: u32) -> Self {
        if viewport.width < breakpoint {
            FormFactor::Mobile
        } else {
            FormFactor::Desktop
        }
    }

    pub fn is_mobile(self) -> bool {
        self == FormFactor::Mobile
    }
}

#[derive(Debug, Clone)]
pub struct FormFactorWatch {
    breakpoint: Option<u32>,
    current: FormFactor,
}

impl FormFactorWatch {
    pub fn auto(viewport: Viewport, breakpoint: u32) -> Self {
        Self {
            breakpoint: Some(breakpoint),
            current: FormFactor::classify(viewport, breakpoint),
        }
    }

    /// Pins the classification; resizes no longer change it.
    pub fn fixed(form_factor: FormFactor) -> Self {
        Self {
            breakpoint: None,
            current: form_factor,
        }
    }

    pub fn current(&self) -> FormFactor {
        self.current
    }

    pub fn is_mobile(&self) -> bool {
        self.current.is_mobile()
    }

    /// Returns the new classification only when it changed.
    pub fn resize(&mut self, viewport: Viewport) -> Option<FormFactor> {
        let bp = self.breakpoint?;
        let next = FormFactor::classify(viewport, bp);
        if next == self.current {
            return None;
        }
        self.current = next;
        Some(next)
    }
}
