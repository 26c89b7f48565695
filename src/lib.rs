#![forbid(unsafe_code)]

pub mod app;
pub mod assemble;
pub mod cli;
pub mod extract;
pub mod formats;
pub mod images;
pub mod import;
pub mod ingest;
pub mod logging;
pub mod package;
pub mod scrape;
pub mod tts;
