use futures::future::LocalBoxFuture;

use crate::error::LoadError;

/// Completes when the inserted element finishes loading (or fails to).
pub type AttemptFuture = LocalBoxFuture<'static, Result<(), LoadError>>;

/// Identifier of an inserted executable element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// Page-side operations the loader needs.
///
/// In a browser this is `<script>` insertion plus `window` property access.
pub trait AssetHost {
    /// True if a global binding with this name exists.
    fn binding_present(&self, binding: &str) -> bool;

    /// Inserts one executable element fetching `url`.
    fn insert(&self, asset: &str, url: &str) -> Result<(ElementId, AttemptFuture), LoadError>;

    /// Removes an element inserted by [`AssetHost::insert`].
    fn remove(&self, element: ElementId);

    /// Defines `binding` as a harmless no-op so dependents do not crash.
    fn install_stub(&self, binding: &str);
}
