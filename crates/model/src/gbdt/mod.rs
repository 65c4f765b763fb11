//! Integer-only Gradient Boosted Decision Tree evaluator
//!
//! A [`Booster`] is an ensemble of [`Tree`]s whose thresholds, leaves, weights
//! and bias are fixed-point integers at a shared scale (typically 1e6):
//!
//! ```json
//! {
//!   "version": 1,
//!   "scale": 1000000,
//!   "bias": -100000,
//!   "trees": [
//!     {
//!       "weight": 1000000,
//!       "nodes": [
//!         {"feature": 9, "threshold": 1000000, "left": 1, "right": 2},
//!         {"leaf": -600000},
//!         {"leaf": 700000}
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Traversal goes left when `feature <= threshold`. No floating point is
//! involved, so a given artifact scores identically on every platform.

pub mod booster;
pub mod tree;

pub use booster::{Booster, BoosterError, BOOSTER_VERSION, SCALE};
pub use tree::{Node, Tree};
