// src/engine/assignment.rs

//! Draws one worker's question sequence from the packages of an event.
//!
//! With several packages every worker gets `K` questions (the shortest package
//! length), split as evenly as integer division allows across packages, with
//! the package interleaving shuffled per worker. Questions keep their stored
//! order inside a package and options are never shuffled.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom, seq::index};

/// A fresh, independently seeded generator for one draw.
pub fn fresh_rng() -> StdRng {
    StdRng::from_entropy()
}

/// Number of questions every package can supply.
pub fn common_length(packages: &[Vec<i64>]) -> usize {
    packages.iter().map(Vec::len).min().unwrap_or(0)
}

/// Orders the question ids one worker will see.
///
/// `packages` holds each package's question ids in stored order.
pub fn draw_questions<R: Rng + ?Sized>(packages: &[Vec<i64>], rng: &mut R) -> Vec<i64> {
    match packages {
        [] => Vec::new(),
        [only] => only.clone(),
        _ => draw_cross_package(packages, rng),
    }
}

fn draw_cross_package<R: Rng + ?Sized>(packages: &[Vec<i64>], rng: &mut R) -> Vec<i64> {
    let package_count = packages.len();
    let total = common_length(packages);
    if total == 0 {
        return Vec::new();
    }

    let base = total / package_count;
    let remainder = total % package_count;

    let mut quotas = vec![base; package_count];
    for extra in index::sample(rng, package_count, remainder) {
        quotas[extra] += 1;
    }

    let mut slots: Vec<usize> = quotas
        .iter()
        .enumerate()
        .flat_map(|(package, &quota)| std::iter::repeat(package).take(quota))
        .collect();
    slots.shuffle(rng);

    let mut cursors = vec![0usize; package_count];
    slots
        .into_iter()
        .map(|package| {
            let question = packages[package][cursors[package]];
            cursors[package] += 1;
            question
        })
        .collect()
}
