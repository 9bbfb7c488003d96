pub mod physics;
pub mod safe_cart_pole;

pub use physics::{CartPolePhysics, EulerCartPole};
pub use safe_cart_pole::{EpisodePhase, SAFE_COLOR, SafeCartPoleEnv, SafeCartPoleObs, SafetyIndicator, UNSAFE_COLOR};
