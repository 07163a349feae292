//! Detection backend client and per-detector job lifecycle.
//!
//! Provides typed wire messages, the [`backend::DetectionBackend`] seam
//! with its HTTP implementation, job lifecycle events, and the generic
//! [`job::DetectionJobManager`] instantiated once per detector kind.

pub mod api;
pub mod backend;
pub mod events;
pub mod job;
pub mod kind;
pub mod messages;
