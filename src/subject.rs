//! Hot sources that are driven from the outside.
//!
//! - [`SingleSubject`]: multicasts one terminal event and replays it to late
//!   subscribers.
//! - [`UnicastSubject`]: buffers items for exactly one subscriber; the relay
//!   the `..._when` operators feed their termination tokens into.

mod single_subject;
pub(crate) mod subscribers;
mod unicast;

pub use single_subject::SingleSubject;
pub use unicast::UnicastSubject;
