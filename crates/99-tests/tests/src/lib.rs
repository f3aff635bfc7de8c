//! Cross-crate scenario tests for the page resilience layer.
//!
//! Every run is simulated: virtual clock, mock platform, generated inputs.

#[cfg(all(test, not(target_arch = "wasm32")))]
mod loader_fallback;

#[cfg(all(test, not(target_arch = "wasm32")))]
mod reconnect_properties;

#[cfg(all(test, not(target_arch = "wasm32")))]
mod arbitration_scenarios;

#[cfg(all(test, not(target_arch = "wasm32")))]
mod layer_e2e;
