mod common;

mod geo;
mod lifecycle;
