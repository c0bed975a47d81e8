//! DSP engine: pure Rust synthesis for the breathing soundscape.
//!
//! The same code renders live sessions and offline exports, so both paths
//! produce the same samples for the same timeline.

pub mod ambience;
pub mod automation;
pub mod engine;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod recipe;
pub mod renderer;
pub mod reverb;
pub mod sampler;
pub mod voice;
pub mod wav;
