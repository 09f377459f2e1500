#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod extract;
pub mod favorites;
pub mod formats;
pub mod html;
pub mod logging;
pub mod player;
pub mod probe;
pub mod protocol;
pub mod rebuild;
pub mod render;
pub mod slideshow;
pub mod story_store;
pub mod timing;
