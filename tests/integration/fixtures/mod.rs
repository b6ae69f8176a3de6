#![allow(dead_code)]

pub mod cluster;
pub mod envelope;
pub mod store_dir;
