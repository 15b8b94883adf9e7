#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate lazy_static;

pub mod api;
pub mod config;
pub mod directions;
pub mod gps_processor;
pub mod logs;
pub mod navigation_tracker;
pub mod polyline;
pub mod route;
pub mod route_deviation;
pub mod tracking_session;
pub mod utils;
