//! Scenario-driven HTTP load generator for the prices API.
//!
//! A [`config::Plan`] names scenarios (executor, VUs, duration, start offset,
//! graceful stop) and the request each scenario's iterations send.
//! [`load::LoadRunner`] executes the plan and produces [`load::RunResults`].

pub mod commands;
pub mod config;
pub mod load;
pub mod logging;
pub mod report;
pub mod runner;
pub mod ui;
pub mod utils;
