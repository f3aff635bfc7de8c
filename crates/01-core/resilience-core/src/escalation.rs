/// Result of asking for degraded mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Degraded mode is now painted on the display root.
    Activated,
    /// A renderer holds the root; degraded mode activates once it fails or releases.
    Deferred,
    /// Degraded mode was already active.
    AlreadyDegraded,
}

/// Something that can switch the page into degraded mode.
///
/// Implemented by the render arbiter; the failure monitor only sees this trait.
pub trait EscalationTarget {
    fn request_degraded(&self, reason: &str) -> EscalationOutcome;

    fn is_degraded(&self) -> bool;
}
