use super::*;

pub mod cluster;
pub mod reflection;
