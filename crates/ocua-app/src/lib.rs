// Attendance report front end: configuration, the report service, text
// rendering and the command-line interface.

pub mod cli;
pub mod config;
pub mod render;
pub mod service;
