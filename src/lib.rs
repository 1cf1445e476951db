//! feedbell watches RSS, Atom and JSON feeds and announces new entries in
//! chat channels.
//!
//! A synchronization cycle lists every subscription from the SQLite store,
//! downloads all feeds concurrently through a polling multiplexer, works out
//! which entries are newer than each subscription's checkpoint, posts one
//! message per new entry, and moves the checkpoint forward.
//!
//! - [`storage`] - subscriptions and their checkpoints
//! - [`feed`] - downloading, parsing and change detection
//! - [`notify`] - where announcements go
//! - [`sync`] - the cycle itself and its timer
//! - [`commands`] - adding, removing and listing subscriptions

pub mod commands;
pub mod config;
pub mod feed;
pub mod logging;
pub mod notify;
pub mod storage;
pub mod sync;
pub mod util;
