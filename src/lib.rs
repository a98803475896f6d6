//! storrest - REST clients for HPE storage systems.
//!
//! This crate keeps an authenticated REST session alive against an HPE
//! storage device and hides the session plumbing from the caller: it
//! logs in on demand, re-authenticates and replays a request once when
//! the device reports the session as expired, and walks multi-page
//! collection replies lazily.
//!
//! Supported devices:
//! - [`StoreServ`] - 3PAR and Primera arrays (WSAPI)
//! - [`StoreOnceG3`] - StoreOnce Gen 3 backup appliances
//! - [`StoreOnceG4`] - StoreOnce Gen 4 backup appliances
//! - [`Xp`] - XP7 and P9500 arrays behind Command View AE
//!
//! ```no_run
//! use storrest::{RequestOptions, Rest, StoreServ};
//!
//! # async fn demo() -> storrest::RestResult<()> {
//! let mut array = Rest::new(StoreServ::new("10.0.0.1", "3paradm", "3pardata"))?;
//! array.open().await?;
//!
//! let (status, system) = array.get("system", RequestOptions::new()).await?;
//! if status == 200 {
//!     if let Some(system) = system {
//!         println!("array name: {}", system["name"]);
//!     }
//! }
//!
//! array.close().await;
//! # Ok(())
//! # }
//! ```

pub mod devices;
pub mod error;
pub mod rest;
pub mod session;
pub mod utils;

pub use devices::{CommandViewAE, StoreOnceG3, StoreOnceG4, StoreServ, Xp, XpGeneration, XpSession};
pub use error::{RestError, RestResult};
pub use rest::{Backend, Pager, RequestBody, RequestOptions, Rest, Timeout, Transport};
pub use session::{SessionState, SessionStore, StoredSession};
pub use utils::CookieMap;
