pub mod aqhi;
pub mod calibrate;
pub mod config;
pub mod error;
pub mod fields;
pub mod kiosk;
pub mod metadata;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod reading;
pub mod snapshot;
pub mod source;
pub mod stats;
pub mod window;
