use failure_monitor::PageFault;
use log::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{ErrorEvent, Event, HtmlScriptElement, PromiseRejectionEvent, Window};

use crate::{describe_js, ASSET_ATTR};

/// Installed `error` and `unhandledrejection` listeners. Dropping removes them.
pub struct FaultHooks {
    window: Window,
    on_error: Closure<dyn FnMut(Event)>,
    on_rejection: Closure<dyn FnMut(PromiseRejectionEvent)>,
}

/// Forwards uncaught errors, failed `<script>` loads and unhandled rejections
/// to `report`.
pub fn install_fault_hooks(report: impl Fn(PageFault) + 'static) -> Result<FaultHooks, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let report = std::rc::Rc::new(report);

    let on_error = {
        let report = std::rc::Rc::clone(&report);
        Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            if let Some(error) = event.dyn_ref::<ErrorEvent>() {
                let mut fault = PageFault::error(error.message());
                let file = error.filename();
                if !file.is_empty() {
                    fault = fault.with_source(file);
                }
                report(fault);
            } else if let Some(script) = event
                .target()
                .and_then(|target| target.dyn_into::<HtmlScriptElement>().ok())
            {
                if script.has_attribute(ASSET_ATTR) {
                    debug!("script load failure owned by the loader: {}", script.src());
                } else {
                    report(PageFault::script_load(script.src()));
                }
            } else {
                debug!("ignoring resource error from a non-script element");
            }
        })
    };
    let on_rejection = Closure::<dyn FnMut(PromiseRejectionEvent)>::new(
        move |event: PromiseRejectionEvent| {
            report(PageFault::rejection(describe_js(&event.reason())));
        },
    );

    // Capture phase: resource errors do not bubble up to the window.
    window.add_event_listener_with_callback_and_bool(
        "error",
        on_error.as_ref().unchecked_ref(),
        true,
    )?;
    window.add_event_listener_with_callback(
        "unhandledrejection",
        on_rejection.as_ref().unchecked_ref(),
    )?;

    Ok(FaultHooks {
        window,
        on_error,
        on_rejection,
    })
}

impl Drop for FaultHooks {
    fn drop(&mut self) {
        let _ = self.window.remove_event_listener_with_callback_and_bool(
            "error",
            self.on_error.as_ref().unchecked_ref(),
            true,
        );
        let _ = self.window.remove_event_listener_with_callback(
            "unhandledrejection",
            self.on_rejection.as_ref().unchecked_ref(),
        );
    }
}
