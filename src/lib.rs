//! Periodic job that mirrors a Discourse forum's categories and tags
//! into SQLite and mails users a digest of the names added since they
//! were last notified.

pub mod config;
pub mod db;
pub mod feed;
pub mod mailer;
pub mod runner;
