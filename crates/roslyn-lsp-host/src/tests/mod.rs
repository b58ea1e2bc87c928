//! Supervisor tests driven by scripted sessions.

mod support;
mod unit;
