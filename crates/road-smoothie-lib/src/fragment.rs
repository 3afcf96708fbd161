//! Reference fragments and selection of a single reference corridor

use crate::{Diagnostics, Result, SmoothieError};
use geo::Coord;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity of a fragment as assigned by the reference source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct FragmentId(pub i64);

/// Identity of a fragment endpoint, shared by fragments that meet there
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct EndpointId(pub i64);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One contiguous, immutable piece of the reference polyline
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fragment {
    id: FragmentId,
    first: EndpointId,
    last: EndpointId,
    coords: Vec<Coord<f64>>,
}

impl Fragment {
    /// Create a fragment; it must have at least one coordinate
    pub fn new(
        id: FragmentId,
        first: EndpointId,
        last: EndpointId,
        coords: Vec<Coord<f64>>,
    ) -> Result<Self> {
        if coords.is_empty() {
            return Err(SmoothieError::InvalidGeometry(format!(
                "Fragment {id} has no coordinates"
            )));
        }
        Ok(Self {
            id,
            first,
            last,
            coords,
        })
    }

    #[inline]
    pub fn id(&self) -> FragmentId {
        self.id
    }

    /// Identity of the first vertex
    #[inline]
    pub fn first(&self) -> EndpointId {
        self.first
    }

    /// Identity of the last vertex
    #[inline]
    pub fn last(&self) -> EndpointId {
        self.last
    }

    #[inline]
    pub fn coords(&self) -> &[Coord<f64>] {
        &self.coords
    }

    #[inline]
    pub fn first_coord(&self) -> Coord<f64> {
        self.coords[0]
    }

    #[inline]
    pub fn last_coord(&self) -> Coord<f64> {
        self.coords[self.coords.len() - 1]
    }
}

/// Fragments of a single reference, as selected by the user
#[derive(Clone, Debug)]
pub struct Selection {
    /// Reference identifier shared by all fragments (e.g. a road number)
    pub reference: String,
    pub fragments: Vec<Fragment>,
}

/// Keep only the fragments belonging to the first reference in the selection
///
/// The first non-empty reference value wins; fragments carrying a different
/// value are skipped with a warning. Returns `None` (with an error recorded)
/// when nothing was selected or no fragment carries a reference value.
pub fn select_reference(
    selected: Vec<(Option<String>, Fragment)>,
    diagnostics: &mut Diagnostics,
) -> Option<Selection> {
    let mut reference: Option<String> = None;
    let mut fragments = Vec::with_capacity(selected.len());

    for (value, fragment) in selected {
        if let Some(current) = &reference {
            if value.as_deref() != Some(current.as_str()) {
                diagnostics.warn(format!(
                    "Ref mismatch in selection: {} / {}",
                    current,
                    value.as_deref().unwrap_or("")
                ));
                continue;
            }
        } else if value.is_some() {
            reference = value;
        }
        fragments.push(fragment);
    }

    if fragments.is_empty() {
        diagnostics.error("No selected ways.");
        return None;
    }
    let Some(reference) = reference else {
        diagnostics.error("Selected ways carry no reference value.");
        return None;
    };
    Some(Selection {
        reference,
        fragments,
    })
}
