//! Common utilities shared by the front end and the analyses.

/// A validated program.  The only way to obtain one is to go through the front
/// end's link step, so analyses that take `Valid<Program>` can assume all
/// references are resolved and all invariants checked.
#[derive(Clone, Debug)]
pub struct Valid<T>(pub T);

/// Escape hatch for tests that construct already-linked programs by hand.
pub fn skip_validation<T>(t: T) -> Valid<T> {
    Valid(t)
}
