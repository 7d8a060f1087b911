pub mod bucket;
pub mod client_key;

pub use bucket::{Admission, BucketConfig, RateLimitError, TokenBucketStore};
pub use client_key::{ClientKeyExtractor, ForwardedFor, PeerAddr};
