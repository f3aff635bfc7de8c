use std::cell::{Cell, RefCell};

use render_arbiter::DisplaySurface;

/// Display root backed by a string.
#[derive(Default)]
pub struct MemorySurface {
    exists: Cell<bool>,
    created: Cell<u32>,
    paints: RefCell<Vec<String>>,
}

impl MemorySurface {
    /// A page that has no root element yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A page whose root element already exists.
    pub fn with_root() -> Self {
        let surface = Self::default();
        surface.exists.set(true);
        surface
    }

    /// Current contents of the root, empty if never painted.
    pub fn html(&self) -> String {
        self.paints.borrow().last().cloned().unwrap_or_default()
    }

    pub fn paint_count(&self) -> usize {
        self.paints.borrow().len()
    }

    pub fn paints(&self) -> Vec<String> {
        self.paints.borrow().clone()
    }

    /// Times the root had to be created.
    pub fn created(&self) -> u32 {
        self.created.get()
    }
}

impl DisplaySurface for MemorySurface {
    fn exists(&self) -> bool {
        self.exists.get()
    }

    fn create(&self) {
        self.exists.set(true);
        self.created.set(self.created.get() + 1);
    }

    fn paint(&self, markup: &str) {
        self.paints.borrow_mut().push(markup.to_owned());
    }
}
