//! Generic REST machinery shared by every device client.

pub mod backend;
pub mod client;
pub mod options;
pub mod pager;

pub use backend::Backend;
pub use client::{Call, RawResponse, Rest, Transport};
pub use options::{RequestBody, RequestOptions, Timeout};
pub use pager::Pager;
