//! Browser session management
//!
//! Launching or reattaching to the browser process, the single live Session,
//! and the page/surface abstraction the wallet drivers run against.

pub mod launcher;
pub mod page;
pub mod session;

pub use page::{ControlMatch, Intent, LocatorStrategy, Page, Surface, SurfaceSource};
pub use session::{Session, SessionState};
