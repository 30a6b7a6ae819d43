//! Application/room dispatch: pluggable application hooks and the rooms
//! they multiplex clients into.

pub mod application;
pub mod registry;
pub mod room;
