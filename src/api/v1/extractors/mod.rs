pub mod gated;

pub use gated::Gated;
