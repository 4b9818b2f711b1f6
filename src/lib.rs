//! Live location sharing for groups.
//!
//! A [`session::Session`] reports the device position for as long as the
//! user is signed in. A [`view::GroupView`] keeps the roster of the group on
//! screen in sync from a snapshot plus a live update stream, and moves the
//! map when the members' positions change.

pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod map;
pub mod model;
pub mod reporter;
pub mod roster;
pub mod session;
pub mod source;
#[cfg(test)]
mod testing;
pub mod view;
pub mod viewport;
pub mod wire;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
