pub mod chunk_plan;
pub mod classify;
pub mod cli;
pub mod config;
pub mod doctor;
pub mod engine;
pub mod merge;
pub mod pipeline;
pub mod report;
pub mod scan;
pub mod split;
pub mod util;
