/// The page's single display root.
///
/// Only the arbiter holds one; renderers reach it through a
/// [`RootLease`](crate::RootLease).
pub trait DisplaySurface {
    /// True if the root element exists in the page.
    fn exists(&self) -> bool;

    /// Creates the root element. Called only when [`DisplaySurface::exists`] is false.
    fn create(&self);

    /// Replaces the root's contents with `markup`.
    fn paint(&self, markup: &str);
}
