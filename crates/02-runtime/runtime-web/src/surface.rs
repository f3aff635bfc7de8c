use log::warn;
use render_arbiter::DisplaySurface;
use web_sys::Document;

/// The display root element, looked up by id on every access.
pub struct DomSurface {
    document: Document,
    root_id: String,
}

impl DomSurface {
    /// Targets the element with id `root_id` in `document`.
    pub fn new(document: Document, root_id: impl Into<String>) -> Self {
        Self {
            document,
            root_id: root_id.into(),
        }
    }

    /// Targets `root_id` in the current window's document.
    pub fn current(root_id: impl Into<String>) -> Option<Self> {
        let document = web_sys::window()?.document()?;
        Some(Self::new(document, root_id))
    }
}

impl DisplaySurface for DomSurface {
    fn exists(&self) -> bool {
        self.document.get_element_by_id(&self.root_id).is_some()
    }

    fn create(&self) {
        let Some(body) = self.document.body() else {
            warn!("cannot create #{}: document has no body", self.root_id);
            return;
        };
        match self.document.create_element("div") {
            Ok(root) => {
                root.set_id(&self.root_id);
                if body.append_child(&root).is_err() {
                    warn!("cannot attach #{} to the body", self.root_id);
                }
            }
            Err(_) => warn!("cannot create #{}", self.root_id),
        }
    }

    fn paint(&self, markup: &str) {
        match self.document.get_element_by_id(&self.root_id) {
            Some(root) => root.set_inner_html(markup),
            None => warn!("display root #{} vanished before paint", self.root_id),
        }
    }
}
