use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::FutureExt;
use js_sys::{Function, Reflect};
use log::{debug, warn};
use script_loader::{AssetHost, AttemptFuture, ElementId, LoadError};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Event, HtmlScriptElement, Window};

use crate::{describe_js, ASSET_ATTR};

type Settle = Rc<RefCell<Option<oneshot::Sender<Result<(), LoadError>>>>>;

struct Inserted {
    element: HtmlScriptElement,
    _on_load: Closure<dyn FnMut(Event)>,
    _on_error: Closure<dyn FnMut(Event)>,
}

/// Loads assets by appending `<script>` elements to the document head.
pub struct DomAssetHost {
    window: Window,
    document: Document,
    inserted: RefCell<HashMap<ElementId, Inserted>>,
    next_id: Cell<u64>,
}

impl DomAssetHost {
    /// Host bound to the current window. `None` outside a document context.
    pub fn current() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self {
            window,
            document,
            inserted: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        })
    }

    fn create_script(&self, asset: &str, url: &str) -> Result<HtmlScriptElement, JsValue> {
        let script: HtmlScriptElement = self.document.create_element("script")?.dyn_into()?;
        script.set_src(url);
        script.set_async(true);
        script.set_attribute(ASSET_ATTR, asset)?;
        Ok(script)
    }
}

fn settle(slot: &Settle, outcome: Result<(), LoadError>) {
    if let Some(tx) = slot.borrow_mut().take() {
        let _ = tx.send(outcome);
    }
}

impl AssetHost for DomAssetHost {
    fn binding_present(&self, binding: &str) -> bool {
        Reflect::get(&self.window, &JsValue::from_str(binding))
            .map(|value| !value.is_undefined() && !value.is_null())
            .unwrap_or(false)
    }

    fn insert(&self, asset: &str, url: &str) -> Result<(ElementId, AttemptFuture), LoadError> {
        let script = self
            .create_script(asset, url)
            .map_err(|err| LoadError::Insert(describe_js(&err)))?;

        let (tx, rx) = oneshot::channel();
        let slot: Settle = Rc::new(RefCell::new(Some(tx)));
        let on_load = {
            let slot = Rc::clone(&slot);
            Closure::<dyn FnMut(Event)>::new(move |_event: Event| settle(&slot, Ok(())))
        };
        let on_error = {
            let url = url.to_owned();
            Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                settle(&slot, Err(LoadError::network(format!("failed to load {url}"))))
            })
        };
        script.set_onload(Some(on_load.as_ref().unchecked_ref()));
        script.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        let parent = self
            .document
            .head()
            .map(|head| head.unchecked_into::<web_sys::Node>())
            .or_else(|| self.document.body().map(|body| body.unchecked_into()))
            .ok_or_else(|| LoadError::Insert("document has no head or body".to_owned()))?;
        parent
            .append_child(&script)
            .map_err(|err| LoadError::Insert(describe_js(&err)))?;

        let id = ElementId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        debug!("inserted <script> #{} for {asset}: {url}", id.0);
        self.inserted.borrow_mut().insert(
            id,
            Inserted {
                element: script,
                _on_load: on_load,
                _on_error: on_error,
            },
        );

        let pending = async move {
            rx.await
                .unwrap_or_else(|_| Err(LoadError::network("script element discarded")))
        };
        Ok((id, pending.boxed_local()))
    }

    fn remove(&self, element: ElementId) {
        let removed = self.inserted.borrow_mut().remove(&element);
        if let Some(inserted) = removed {
            inserted.element.set_onload(None);
            inserted.element.set_onerror(None);
            inserted.element.remove();
        }
    }

    fn install_stub(&self, binding: &str) {
        let stub = Function::new_no_args("");
        if let Err(err) = Reflect::set(&self.window, &JsValue::from_str(binding), &stub) {
            warn!("could not stub window.{binding}: {}", describe_js(&err));
        }
    }
}
