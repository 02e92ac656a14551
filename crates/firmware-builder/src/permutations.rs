//! Build permutation axes and their Cartesian expansion.
//!
//! Axis order is the order the axes were declared in the catalog document, so
//! both [`Axes`] and [`Permutation`] keep insertion order instead of sorting.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Axes {
    axes: Vec<Axis>,
}

impl Axes {
    pub fn iter(&self) -> impl Iterator<Item = &Axis> {
        self.axes.iter()
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.axes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.values.as_slice())
    }

    /// Adds an axis, replacing the values of an existing axis with the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.axes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.values = values,
            None => self.axes.push(Axis { name, values }),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.axes
            .iter()
            .flat_map(|a| a.values.iter().map(String::as_str))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, Vec<V>)> for Axes {
    fn from_iter<I: IntoIterator<Item = (N, Vec<V>)>>(iter: I) -> Self {
        let mut axes = Axes::default();
        for (name, values) in iter {
            axes.insert(name, values.into_iter().map(Into::into).collect());
        }
        axes
    }
}

impl Serialize for Axes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.axes.len()))?;
        for axis in &self.axes {
            map.serialize_entry(&axis.name, &axis.values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Axes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AxesVisitor;

        impl<'de> Visitor<'de> for AxesVisitor {
            type Value = Axes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of axis name to a list of string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Axes, A::Error> {
                let mut axes = Axes::default();
                while let Some((name, values)) = access.next_entry::<String, Vec<String>>()? {
                    axes.insert(name, values);
                }
                Ok(axes)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Axes, E> {
                Ok(Axes::default())
            }
        }

        deserializer.deserialize_any(AxesVisitor)
    }
}

/// One chosen value per axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permutation {
    entries: Vec<(String, String)>,
}

impl Permutation {
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == axis)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn with(&self, axis: &str, value: &str) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend(self.entries.iter().cloned());
        entries.push((axis.to_string(), value.to_string()));
        Self { entries }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Permutation {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("(default)");
        }
        let parts = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();
        f.write_str(&parts.join(", "))
    }
}

impl Serialize for Permutation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Every combination of axis values; the last declared axis varies fastest.
///
/// No axes yields a single empty permutation, so a target always produces at
/// least one build. An axis with no values yields no permutations at all.
pub fn expand(axes: &Axes) -> Vec<Permutation> {
    let mut out = vec![Permutation::default()];
    for axis in axes.iter() {
        let mut next = Vec::with_capacity(out.len() * axis.values.len());
        for prefix in &out {
            for value in &axis.values {
                next.push(prefix.with(&axis.name, value));
            }
        }
        out = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(pairs: &[(&str, &str)]) -> Permutation {
        pairs.iter().copied().collect()
    }

    #[test]
    fn no_axes_yield_one_empty_permutation() {
        let got = expand(&Axes::default());
        assert_eq!(got, vec![Permutation::default()]);
    }

    #[test]
    fn last_axis_varies_fastest() {
        let axes: Axes = [("A", vec!["1", "2"]), ("B", vec!["x", "y"])]
            .into_iter()
            .collect();
        let got = expand(&axes);
        assert_eq!(
            got,
            vec![
                perm(&[("A", "1"), ("B", "x")]),
                perm(&[("A", "1"), ("B", "y")]),
                perm(&[("A", "2"), ("B", "x")]),
                perm(&[("A", "2"), ("B", "y")]),
            ]
        );
    }

    #[test]
    fn keeps_declared_axis_order_from_json() {
        let axes: Axes =
            serde_json::from_str(r#"{"zeta": ["b", "a"], "alpha": ["2", "1"]}"#).expect("parse");
        let got = expand(&axes)
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            got,
            vec![
                "zeta=b, alpha=2",
                "zeta=b, alpha=1",
                "zeta=a, alpha=2",
                "zeta=a, alpha=1",
            ]
        );
        let round = serde_json::to_string(&axes).expect("encode");
        assert_eq!(round, r#"{"zeta":["b","a"],"alpha":["2","1"]}"#);
    }

    #[test]
    fn empty_axis_yields_nothing() {
        let axes: Axes = [("A", vec!["1"]), ("B", Vec::<&str>::new())]
            .into_iter()
            .collect();
        assert!(expand(&axes).is_empty());
    }

    #[test]
    fn rejects_non_list_axis_values() {
        let err = serde_json::from_str::<Axes>(r#"{"rev": "1"}"#).unwrap_err();
        assert!(err.to_string().contains("sequence"), "unexpected err: {err}");
    }
}
