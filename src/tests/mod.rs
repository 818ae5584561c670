//! Scenario and property tests that drive a whole kernel.

mod helpers;
mod property;
