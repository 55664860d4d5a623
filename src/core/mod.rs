use rand::distr::{Alphanumeric, SampleString};

pub mod checkpoint;

pub mod chunk;

pub mod config;

pub mod item;

pub mod job;

pub mod step;

pub mod tasklet;

pub mod transaction;

/// Generates a random name consisting of alphanumeric characters.
///
/// # Returns
///
/// A `String` containing the generated random name.
fn build_name() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8)
}
