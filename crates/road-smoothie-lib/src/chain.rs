//! Reordering of unordered reference fragments into a traversal
//!
//! Selected fragments arrive in arbitrary order. Walking them so that connected
//! fragments are visited consecutively keeps the later fetch rectangles
//! contiguous, which in turn lets them merge into fewer downloads.
//!
//! The result is best effort: disconnected pieces are appended as separate
//! chains, so consumers must not assume adjacent fragments share an endpoint.

use crate::{Diagnostics, EndpointId, Fragment};
use std::collections::HashMap;

/// Traversal state while ordering fragments
#[derive(Clone, Copy, Debug, PartialEq)]
enum ChainState {
    /// Looking for the west-most path terminus to start from
    SearchingTerminus,
    /// Appending `current`, whose far end is `trailing`
    Extending {
        current: usize,
        trailing: EndpointId,
    },
    /// The chain broke; start again from the next unvisited fragment
    SeedingBranch,
    Done,
}

/// Reorder fragments so connected ones are visited consecutively
///
/// Each fragment keeps its own vertex order; only the sequence of fragments
/// changes. The output is a permutation of the input.
pub fn order_fragments(fragments: Vec<Fragment>, diagnostics: &mut Diagnostics) -> Vec<Fragment> {
    #[cfg(feature = "profiling")]
    profiling::scope!("chain::order_fragments");

    let order = traversal_order(&fragments, diagnostics);

    let mut slots: Vec<Option<Fragment>> = fragments.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

/// Compute the traversal as indices into `fragments`
fn traversal_order(fragments: &[Fragment], diagnostics: &mut Diagnostics) -> Vec<usize> {
    let mut order = Vec::with_capacity(fragments.len());
    let mut visited = vec![false; fragments.len()];

    let mut state = if fragments.is_empty() {
        ChainState::Done
    } else {
        ChainState::SearchingTerminus
    };

    loop {
        state = match state {
            ChainState::SearchingTerminus => {
                let counts = endpoint_counts(fragments);
                report_branches(&counts, diagnostics);
                match westmost_terminus(fragments, &counts) {
                    Some((current, trailing)) => ChainState::Extending { current, trailing },
                    None => ChainState::SeedingBranch,
                }
            }
            ChainState::Extending { current, trailing } => {
                order.push(current);
                visited[current] = true;

                match find_continuation(fragments, &visited, trailing) {
                    Some((next, trailing)) => ChainState::Extending {
                        current: next,
                        trailing,
                    },
                    None => ChainState::SeedingBranch,
                }
            }
            ChainState::SeedingBranch => match visited.iter().position(|v| !v) {
                Some(next) => {
                    if !order.is_empty() {
                        tracing::debug!(
                            "Reference chain broken after fragment {}",
                            fragments[order[order.len() - 1]].id()
                        );
                    }
                    ChainState::Extending {
                        current: next,
                        trailing: eastern_end(&fragments[next]),
                    }
                }
                None => ChainState::Done,
            },
            ChainState::Done => break,
        };
    }

    order
}

/// Number of fragment ends meeting at each endpoint identity
fn endpoint_counts(fragments: &[Fragment]) -> HashMap<EndpointId, usize> {
    let mut counts = HashMap::new();
    for fragment in fragments {
        *counts.entry(fragment.first()).or_insert(0) += 1;
        *counts.entry(fragment.last()).or_insert(0) += 1;
    }
    counts
}

/// Endpoints joining more than two fragment ends indicate a malformed selection
fn report_branches(counts: &HashMap<EndpointId, usize>, diagnostics: &mut Diagnostics) {
    let mut branches: Vec<_> = counts.iter().filter(|(_, count)| **count > 2).collect();
    branches.sort();
    for (endpoint, count) in branches {
        diagnostics.warn(format!(
            "Reference branches at endpoint {endpoint}: {count} fragment ends meet there"
        ));
    }
}

/// Fragment starting at the terminus with the smallest longitude, with its far end
///
/// A terminus is any endpoint not shared by exactly two fragment ends.
fn westmost_terminus(
    fragments: &[Fragment],
    counts: &HashMap<EndpointId, usize>,
) -> Option<(usize, EndpointId)> {
    let is_terminus = |endpoint: EndpointId| counts.get(&endpoint).copied().unwrap_or(0) != 2;

    let mut best: Option<(usize, EndpointId, f64)> = None;
    for (index, fragment) in fragments.iter().enumerate() {
        let ends = [
            (fragment.first(), fragment.first_coord().x, fragment.last()),
            (fragment.last(), fragment.last_coord().x, fragment.first()),
        ];
        for (start, lon, trailing) in ends {
            if !is_terminus(start) {
                continue;
            }
            if best.is_none_or(|(_, _, min_lon)| lon < min_lon) {
                best = Some((index, trailing, lon));
            }
        }
    }

    best.map(|(index, trailing, _)| (index, trailing))
}

/// Unvisited fragment attached to `trailing`, with its new far end
fn find_continuation(
    fragments: &[Fragment],
    visited: &[bool],
    trailing: EndpointId,
) -> Option<(usize, EndpointId)> {
    fragments
        .iter()
        .enumerate()
        .filter(|(index, _)| !visited[*index])
        .find_map(|(index, fragment)| {
            if fragment.first() == trailing {
                Some((index, fragment.last()))
            } else if fragment.last() == trailing {
                Some((index, fragment.first()))
            } else {
                None
            }
        })
}

/// The endpoint with the larger longitude, from which traversal continues
fn eastern_end(fragment: &Fragment) -> EndpointId {
    if fragment.first_coord().x > fragment.last_coord().x {
        fragment.first()
    } else {
        fragment.last()
    }
}
