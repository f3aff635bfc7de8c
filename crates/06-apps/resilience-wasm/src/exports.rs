//! wasm-bindgen entry points (wasm32 only).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{Array, Function, Object, Promise, Reflect};
use log::{info, LevelFilter};
use resilience_layer::{
    LoadResult, PageFault, RenderError, ResilienceConfig, ResilienceLayer, RootLease,
};
use runtime_web::{
    console_log, describe_js, install_fault_hooks, BrowserTimers, DomAssetHost, DomSurface,
    FaultHooks, WebSocketConnector,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, spawn_local, JsFuture};

use crate::socket::JsSocket;

struct Context {
    layer: ResilienceLayer,
    _hooks: FaultHooks,
}

thread_local! {
    static CTX: RefCell<Option<Context>> = RefCell::new(None);
    static IN_INSTALL: Cell<bool> = Cell::new(false);
}

fn with_guard<F, R>(f: F) -> Result<R, JsValue>
where
    F: FnOnce() -> Result<R, JsValue>,
{
    IN_INSTALL.with(|g| {
        if g.get() {
            return Err(JsValue::from_str("reentrant install call"));
        }
        g.set(true);
        let r = f();
        g.set(false);
        r
    })
}

/// Clones the layer out so no borrow of the context is held while it runs.
fn layer() -> Result<ResilienceLayer, JsValue> {
    CTX.with(|c| {
        c.borrow()
            .as_ref()
            .map(|ctx| ctx.layer.clone())
            .ok_or_else(|| JsValue::from_str("resilience layer not installed"))
    })
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Builds the layer from a JSON configuration and hooks page-level faults.
#[wasm_bindgen]
pub fn install(config_json: &str) -> Result<(), JsValue> {
    with_guard(|| {
        if console_log::init(LevelFilter::Info).is_err() {
            log::debug!("console logger already installed");
        }
        if CTX.with(|c| c.borrow().is_some()) {
            return Err(JsValue::from_str("resilience layer already installed"));
        }

        let config = ResilienceConfig::from_json(config_json).map_err(js_error)?;
        let surface = DomSurface::current(config.root_id.clone())
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let assets = DomAssetHost::current().ok_or_else(|| JsValue::from_str("no document"))?;
        let layer = ResilienceLayer::builder(config)
            .timers(BrowserTimers::shared())
            .connector(Rc::new(WebSocketConnector::new()))
            .asset_host(Rc::new(assets))
            .surface(Rc::new(surface))
            .build()
            .map_err(|err| JsValue::from_str(&format!("{err:#}")))?;

        let reporter = layer.clone();
        let hooks = install_fault_hooks(move |fault| reporter.report_fault(&fault))?;
        CTX.with(|c| {
            *c.borrow_mut() = Some(Context {
                layer,
                _hooks: hooks,
            })
        });
        info!("resilience layer installed");
        Ok(())
    })
}

/// Offers a rendering strategy. `render` is called with a [`JsLease`] once the
/// strategy holds the display root; throwing (or returning a promise that
/// rejects) counts as a renderer failure.
#[wasm_bindgen]
pub fn register(name: String, priority: u32, render: Function) -> Result<bool, JsValue> {
    let layer = layer()?;
    Ok(layer.register(name, priority, move |lease: RootLease| {
        let returned = render
            .call1(&JsValue::NULL, &JsValue::from(JsLease { lease: lease.clone() }))
            .map_err(|err| RenderError::failed(describe_js(&err)))?;
        if let Some(promise) = returned.dyn_ref::<Promise>() {
            let pending = JsFuture::from(promise.clone());
            spawn_local(async move {
                if let Err(err) = pending.await {
                    lease.fail(RenderError::failed(describe_js(&err)));
                }
            });
        }
        Ok(())
    }))
}

#[wasm_bindgen]
pub fn release(name: &str) -> Result<bool, JsValue> {
    Ok(layer()?.release(name))
}

/// Loads every configured asset; resolves with `[{asset, success, source}]`.
#[wasm_bindgen]
pub fn load_assets() -> Result<Promise, JsValue> {
    let pending = layer()?.load_assets();
    Ok(future_to_promise(async move {
        let out = Array::new();
        for result in pending.await {
            out.push(&load_result_to_js(&result)?);
        }
        Ok(out.into())
    }))
}

fn load_result_to_js(result: &LoadResult) -> Result<JsValue, JsValue> {
    let o = Object::new();
    Reflect::set(&o, &"asset".into(), &JsValue::from_str(&result.asset))?;
    Reflect::set(&o, &"success".into(), &JsValue::from_bool(result.success))?;
    Reflect::set(&o, &"source".into(), &JsValue::from_str(result.source.as_str()))?;
    Reflect::set(
        &o,
        &"failedAttempts".into(),
        &JsValue::from_f64(result.failures.len() as f64),
    )?;
    Ok(o.into())
}

/// Opens a reconnecting socket with the configured policy.
#[wasm_bindgen]
pub fn connect(url: &str) -> Result<JsSocket, JsValue> {
    let layer = layer()?;
    Ok(JsSocket::new(layer.connect(url)))
}

/// Calls `callback(reason)` once degraded mode takes over the page.
#[wasm_bindgen]
pub fn on_degraded(callback: Function) -> Result<(), JsValue> {
    layer()?.on_degraded(move |event| {
        if let Err(err) = callback.call1(&JsValue::NULL, &JsValue::from_str(&event.reason)) {
            log::warn!("degraded-mode listener threw: {}", describe_js(&err));
        }
    });
    Ok(())
}

#[wasm_bindgen]
pub fn should_escalate() -> Result<bool, JsValue> {
    Ok(layer()?.should_escalate())
}

/// Reports a handled failure the page still wants counted.
#[wasm_bindgen]
pub fn report_error(message: &str) -> Result<(), JsValue> {
    layer()?.report_fault(&PageFault::error(message));
    Ok(())
}

/// Ownership of the display root, handed to a render callback.
#[wasm_bindgen]
pub struct JsLease {
    lease: RootLease,
}

#[wasm_bindgen]
impl JsLease {
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.lease.name().to_owned()
    }

    #[wasm_bindgen(js_name = isCurrent)]
    pub fn is_current(&self) -> bool {
        self.lease.is_current()
    }

    /// Replaces the root's contents; throws if this lease lost the root.
    pub fn paint(&self, markup: &str) -> Result<(), JsValue> {
        self.lease.paint(markup).map_err(js_error)
    }

    pub fn release(&self) -> bool {
        self.lease.release()
    }

    /// Reports a failure that happened after the render callback returned.
    pub fn fail(&self, message: &str) {
        self.lease.fail(RenderError::failed(message));
    }
}
