//! Job descriptions and submission handles
//!
//! A [`spec::JobSpec`] is built by the caller and never changes. A [`handle::JobHandle`] starts
//! empty next to it and records how far the submission progressed.

pub mod spec;
pub mod handle;
pub mod state;
