//! End-to-end run: selection, chaining, indexing, fetching and conflation

use crate::engine::{ConflationEngine, RunReport};
use crate::fetch::{NetworkSource, fetch_network, plan_fetch};
use crate::{Config, Diagnostics, Fragment, Network, Reference, Result, order_fragments, select_reference};
use chrono::{DateTime, Utc};
use geo::{Coord, Rect};
use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of [`smooth_to_reference`]
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Outcome {
    /// Reference identifier, `None` when nothing usable was selected
    pub reference: Option<String>,
    /// Where a viewer should center to review the result
    pub focus: Option<Coord<f64>>,
    /// Rectangles requested from the source
    pub fetch_plan: Vec<Rect<f64>>,
    /// Counters of the conflation; its diagnostics cover the whole run
    pub report: RunReport,
}

/// Conflate `network` onto the reference formed by the selected fragments
///
/// Missing parts of the network around the reference are loaded from `source`
/// first. A selection without a usable reference leaves the network untouched
/// and is reported through the outcome's diagnostics.
pub fn smooth_to_reference<S, R>(
    selected: Vec<(Option<String>, Fragment)>,
    network: &mut Network,
    source: &mut S,
    config: &Config,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<Outcome>
where
    S: NetworkSource + ?Sized,
    R: Rng,
{
    #[cfg(feature = "profiling")]
    profiling::scope!("pipeline::smooth_to_reference");

    config.validate()?;
    let mut diagnostics = Diagnostics::new();

    let Some(selection) = select_reference(selected, &mut diagnostics) else {
        return Ok(Outcome {
            report: RunReport {
                diagnostics,
                ..RunReport::default()
            },
            ..Outcome::default()
        });
    };

    let fragments = order_fragments(selection.fragments, &mut diagnostics);
    diagnostics.info(format!(
        "Processing ref {}, {} ways",
        selection.reference,
        fragments.len()
    ));
    let reference = Reference::build(selection.reference, fragments, config, &mut diagnostics)?;

    let fetch_plan = plan_fetch(&reference, network.loaded_bounds(), config.max_area);
    fetch_network(source, network, &fetch_plan, &mut diagnostics);

    let engine = ConflationEngine::new(&reference, config);
    let mut report = engine.run(network, rng, now)?;
    diagnostics.extend(std::mem::take(&mut report.diagnostics));
    report.diagnostics = diagnostics;

    Ok(Outcome {
        reference: Some(reference.name().to_string()),
        focus: Some(reference.focus()),
        fetch_plan,
        report,
    })
}
