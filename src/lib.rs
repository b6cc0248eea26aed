// src/lib.rs

//! Clinical guide crawler library

pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
#[cfg(test)]
mod testing;
pub mod utils;
