#![cfg(target_arch = "wasm32")]
#![deny(missing_docs)]
//! Browser implementations of the resilience layer's platform traits.
//!
//! * [`BrowserTimers`] – `setTimeout` backed [`resilience_core::Timers`].
//! * [`WebSocketConnector`] – raw `WebSocket` connections for the reconnector.
//! * [`DomAssetHost`] – `<script>` insertion and `window` bindings for the loader.
//! * [`DomSurface`] – the display root element.
//! * [`install_fault_hooks`] – `error` / `unhandledrejection` listeners.
//! * [`console_log`] – a `log` backend writing to the browser console.

mod assets;
pub mod console_log;
mod faults;
mod socket;
mod surface;
mod timers;

pub use assets::DomAssetHost;
pub use faults::{install_fault_hooks, FaultHooks};
pub use socket::WebSocketConnector;
pub use surface::DomSurface;
pub use timers::BrowserTimers;

use wasm_bindgen::JsValue;

/// Marks `<script>` elements owned by [`DomAssetHost`].
pub(crate) const ASSET_ATTR: &str = "data-asset";

/// Best-effort text of a thrown JS value.
pub fn describe_js(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    js_sys::Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|message| message.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}
