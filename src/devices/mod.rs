//! Device backends for the supported HPE storage platforms.
//!
//! Each backend teaches the generic [`Rest`](crate::rest::Rest) client
//! one platform dialect: where the service lives, how a login turns
//! credentials into a session artifact, how that artifact rides on
//! requests, and how the platform announces an expired session.

pub mod storeonce3;
pub mod storeonce4;
pub mod storeserv;
pub mod xp;

pub use storeonce3::StoreOnceG3;
pub use storeonce4::StoreOnceG4;
pub use storeserv::StoreServ;
pub use xp::{CommandViewAE, Xp, XpGeneration, XpSession};
