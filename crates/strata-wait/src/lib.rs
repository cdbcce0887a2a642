//! strata-wait — bounded polling primitive.
//!
//! Provider creates and deletes complete asynchronously: a scaling group
//! enters a "deleting" state and only leaves listings later, a security group
//! refuses deletion while network interfaces still reference it. The
//! [`Waiter`] bridges that gap by re-running a check until it reports
//! [`Poll::Ready`], fails, or exhausts its retry budget.
//!
//! Delays go through a [`Clock`] so tests can advance time without sleeping.

pub mod clock;
pub mod waiter;

pub use clock::{Clock, ManualClock, TokioClock};
pub use waiter::{Poll, WaitError, Waiter};
