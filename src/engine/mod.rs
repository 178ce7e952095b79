//! Convergence engine
//!
//! The engine works in three steps:
//! 1. Planning - Compare declared resources against tracked snapshots
//! 2. Diffing - Render the plan for review
//! 3. Executing - Apply changes one at a time, saving state as it goes

pub mod differ;
pub mod executor;
pub mod planner;
