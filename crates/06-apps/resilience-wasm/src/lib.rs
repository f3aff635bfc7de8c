//! Single wasm artifact exposing the resilience layer to page bootstrap code.
//!
//! ```js
//! import init, { install, register, connect } from "./resilience_wasm.js";
//! await init();
//! install(JSON.stringify({ rootId: "app", errorBudgetThreshold: 5 }));
//! register("spa", 10, (lease) => lease.paint("<main>…</main>"));
//! const socket = connect("wss://example.test/rt");
//! socket.on("message", (data) => console.log(data));
//! ```

#[cfg(target_arch = "wasm32")]
mod exports;
#[cfg(target_arch = "wasm32")]
mod socket;

#[cfg(target_arch = "wasm32")]
pub use exports::{
    connect, install, load_assets, on_degraded, register, release, report_error,
    should_escalate, JsLease,
};
#[cfg(target_arch = "wasm32")]
pub use socket::JsSocket;
