// Common trait for spaces.

use rand::Rng;

/// A set of admissible values that can be sampled and tested.
/// `Element` is the value type living in the space, e.g. `[T; N]` for a
/// fixed-size BoxSpace.
pub trait Space {
    type Element;

    /// Draw a sample from the space using the provided RNG.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Element;

    /// Return true if the given element is a member of the space.
    fn contains(&self, elem: &Self::Element) -> bool;
}
