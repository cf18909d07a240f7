#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use tenancy_controller_core as core;
pub use tenancy_controller_k8s_api as k8s;
pub use tenancy_controller_k8s_index as index;

mod admission;
mod args;
mod conversion;
pub mod webhook;

pub use self::args::Args;
