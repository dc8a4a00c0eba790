//! Assembled dataset model.
//!
//! A [`Dataset`] is the tabular contract consumed by downstream container
//! writers: an ordered mapping from variable name to an array plus its
//! metadata. The coordinate entries `lat`, `lon`, `lev`, `levp` and `time`
//! are always present; every non-coordinate entry carries a leading time
//! axis.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata attached to each dataset variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarMeta {
    /// Short name (e.g. "ts").
    pub short_name: String,
    /// Descriptive name (e.g. "surface temperature").
    pub long_name: String,
    /// Physical units (e.g. "K").
    pub units: String,
    /// Model variable code, if the quantity has one.
    pub code: Option<u32>,
    /// Dimension names, outermost first (e.g. ["time", "lev", "lat", "lon"]).
    pub dims: Vec<String>,
}

impl VarMeta {
    /// Create metadata for a coordinate variable.
    pub fn coordinate(name: &str, long_name: &str, units: &str) -> Self {
        Self {
            short_name: name.to_string(),
            long_name: long_name.to_string(),
            units: units.to_string(),
            code: None,
            dims: vec![name.to_string()],
        }
    }
}

/// One dataset entry: the values plus their metadata.
#[derive(Debug, Clone)]
pub struct Variable {
    pub data: ArrayD<f64>,
    pub meta: VarMeta,
}

/// Ordered name -> (array, metadata) mapping.
///
/// Insertion order is preserved so writers emit variables in a stable
/// order; replacing an existing entry keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    order: Vec<String>,
    vars: HashMap<String, Variable>,
}

/// Names of the coordinate entries every dataset carries.
pub const COORD_NAMES: [&str; 5] = ["lat", "lon", "lev", "levp", "time"];

impl Dataset {
    /// Create an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a variable.
    pub fn insert(&mut self, name: impl Into<String>, var: Variable) {
        let name = name.into();
        if !self.vars.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.vars.insert(name, var);
    }

    /// Get a variable by name.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    /// Get a mutable variable by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.vars.get_mut(name)
    }

    /// Check if a variable is present.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Variable names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Iterate variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.order
            .iter()
            .filter_map(|name| self.vars.get(name).map(|v| (name.as_str(), v)))
    }

    /// Names of the non-coordinate entries, in insertion order.
    pub fn data_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|n| !COORD_NAMES.contains(&n.as_str()))
            .cloned()
            .collect()
    }

    /// Number of entries (coordinates included).
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Check the coordinate invariant: `lat`, `lon`, `lev`, `levp` and
    /// `time` present, and every data entry leading with the time axis.
    pub fn check_invariants(&self) -> Result<(), String> {
        for name in COORD_NAMES {
            if !self.contains(name) {
                return Err(format!("missing coordinate entry '{name}'"));
            }
        }
        let ntime = self.vars["time"].data.len();
        for name in self.data_names() {
            let var = &self.vars[&name];
            if var.meta.dims.first().map(String::as_str) != Some("time") {
                return Err(format!("variable '{name}' does not lead with time"));
            }
            if var.data.shape().first() != Some(&ntime) {
                return Err(format!(
                    "variable '{name}' time axis does not match the time coordinate"
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn coord(name: &str, n: usize) -> Variable {
        Variable {
            data: ArrayD::zeros(vec![n]),
            meta: VarMeta::coordinate(name, name, "1"),
        }
    }

    #[test]
    fn test_insert_preserves_order_on_replace() {
        let mut ds = Dataset::new();
        ds.insert("a", coord("a", 1));
        ds.insert("b", coord("b", 1));
        ds.insert("a", coord("a", 2));

        let names: Vec<_> = ds.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(ds.get("a").unwrap().data.len(), 2);
    }

    #[test]
    fn test_check_invariants() {
        let mut ds = Dataset::new();
        for name in COORD_NAMES {
            ds.insert(name, coord(name, 4));
        }
        assert!(ds.check_invariants().is_ok());

        ds.insert(
            "ts",
            Variable {
                data: ArrayD::zeros(vec![4, 2, 3]),
                meta: VarMeta {
                    short_name: "ts".into(),
                    long_name: "surface temperature".into(),
                    units: "K".into(),
                    code: Some(139),
                    dims: vec!["time".into(), "lat".into(), "lon".into()],
                },
            },
        );
        assert!(ds.check_invariants().is_ok());

        // Wrong time length must be flagged.
        ds.get_mut("ts").unwrap().data = ArrayD::zeros(vec![3, 2, 3]);
        assert!(ds.check_invariants().is_err());
    }
}
