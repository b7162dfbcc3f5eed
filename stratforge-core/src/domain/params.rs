//! Parameter sets and the schema that bounds them for search.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;

/// A single strategy parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view. Ints widen to f64; text has no numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Name → value mapping owned by a strategy instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of `self`.
    pub fn merged(&self, other: &ParameterSet) -> ParameterSet {
        let mut out = self.clone();
        for (k, v) in &other.0 {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    pub fn f64(&self, name: &str) -> Result<f64, ConfigError> {
        self.get(name)
            .and_then(ParamValue::as_f64)
            .ok_or_else(|| ConfigError::MissingParam(name.to_string()))
    }

    pub fn usize(&self, name: &str) -> Result<usize, ConfigError> {
        let v = self.f64(name)?;
        if v < 0.0 || v.fract() != 0.0 {
            return Err(ConfigError::InvalidParam {
                name: name.to_string(),
                reason: format!("expected a non-negative integer, got {v}"),
            });
        }
        Ok(v as usize)
    }

    pub fn text(&self, name: &str) -> Result<&str, ConfigError> {
        self.get(name)
            .and_then(ParamValue::as_str)
            .ok_or_else(|| ConfigError::MissingParam(name.to_string()))
    }
}

impl std::fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ─── Schema ──────────────────────────────────────────────────────────

/// Type of a searchable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int,
    Float,
    Choice(Vec<String>),
}

/// Bounds for one parameter. `min`/`max` are inclusive; ignored for choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub description: String,
}

impl ParamSpec {
    pub fn int(min: i64, max: i64, description: &str) -> Self {
        Self {
            kind: ParamKind::Int,
            min: min as f64,
            max: max as f64,
            description: description.to_string(),
        }
    }

    pub fn float(min: f64, max: f64, description: &str) -> Self {
        Self {
            kind: ParamKind::Float,
            min,
            max,
            description: description.to_string(),
        }
    }

    pub fn choice(options: &[&str], description: &str) -> Self {
        Self {
            kind: ParamKind::Choice(options.iter().map(|s| s.to_string()).collect()),
            min: 0.0,
            max: 0.0,
            description: description.to_string(),
        }
    }

    /// Draw a value: ints inclusively, floats uniformly, choices uniformly.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match &self.kind {
            ParamKind::Int => {
                let lo = self.min.ceil() as i64;
                let hi = self.max.floor() as i64;
                if hi <= lo {
                    ParamValue::Int(lo)
                } else {
                    ParamValue::Int(rng.gen_range(lo..=hi))
                }
            }
            ParamKind::Float => {
                if self.max <= self.min {
                    ParamValue::Float(self.min)
                } else {
                    ParamValue::Float(rng.gen_range(self.min..=self.max))
                }
            }
            ParamKind::Choice(options) => {
                if options.is_empty() {
                    ParamValue::Text(String::new())
                } else {
                    ParamValue::Text(options[rng.gen_range(0..options.len())].clone())
                }
            }
        }
    }

    /// Evenly spaced values across the range, at most `points` of them.
    ///
    /// Ints keep every integer when the range is small enough; choices always
    /// list every option.
    pub fn grid(&self, points: usize) -> Vec<ParamValue> {
        let points = points.max(1);
        match &self.kind {
            ParamKind::Int => {
                let lo = self.min.ceil() as i64;
                let hi = self.max.floor() as i64;
                if hi <= lo {
                    return vec![ParamValue::Int(lo)];
                }
                let span = (hi - lo) as usize;
                if span < points {
                    return (lo..=hi).map(ParamValue::Int).collect();
                }
                let mut out: Vec<i64> = (0..points)
                    .map(|i| lo + ((span as f64) * i as f64 / (points - 1).max(1) as f64).round() as i64)
                    .collect();
                out.dedup();
                out.into_iter().map(ParamValue::Int).collect()
            }
            ParamKind::Float => {
                if self.max <= self.min || points == 1 {
                    return vec![ParamValue::Float(self.min)];
                }
                let step = (self.max - self.min) / (points - 1) as f64;
                (0..points)
                    .map(|i| {
                        let v = if i + 1 == points { self.max } else { self.min + step * i as f64 };
                        ParamValue::Float(v)
                    })
                    .collect()
            }
            ParamKind::Choice(options) => {
                if options.is_empty() {
                    vec![ParamValue::Text(String::new())]
                } else {
                    options.iter().cloned().map(ParamValue::Text).collect()
                }
            }
        }
    }

    fn check(&self, name: &str, value: &ParamValue) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidParam {
            name: name.to_string(),
            reason,
        };
        match (&self.kind, value) {
            (ParamKind::Int, ParamValue::Int(v)) => {
                let v = *v as f64;
                if v < self.min || v > self.max {
                    return Err(invalid(format!(
                        "{v} outside [{}, {}]",
                        self.min, self.max
                    )));
                }
                Ok(())
            }
            (ParamKind::Float, ParamValue::Float(_) | ParamValue::Int(_)) => {
                let v = value.as_f64().unwrap_or(f64::NAN);
                if !v.is_finite() || v < self.min || v > self.max {
                    return Err(invalid(format!(
                        "{v} outside [{}, {}]",
                        self.min, self.max
                    )));
                }
                Ok(())
            }
            (ParamKind::Choice(options), ParamValue::Text(s)) => {
                if options.iter().any(|o| o == s) {
                    Ok(())
                } else {
                    Err(invalid(format!("'{s}' not one of {options:?}")))
                }
            }
            (kind, v) => Err(invalid(format!("value {v} does not match kind {kind:?}"))),
        }
    }
}

/// Declared search space of a strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSchema(BTreeMap<String, ParamSpec>);

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.0.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamSpec)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keep only the named parameters (used to search a subset).
    pub fn restricted_to(&self, names: &[String]) -> ParamSchema {
        ParamSchema(
            self.0
                .iter()
                .filter(|(k, _)| names.iter().any(|n| n == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Reject unknown names, wrong types and out-of-bounds values.
    ///
    /// Parameters absent from `params` are not an error; they fall back to
    /// the strategy defaults.
    pub fn validate(&self, params: &ParameterSet) -> Result<(), ConfigError> {
        for (name, value) in params.iter() {
            match self.0.get(name) {
                Some(spec) => spec.check(name, value)?,
                None => return Err(ConfigError::UnknownParam(name.clone())),
            }
        }
        Ok(())
    }

    /// Number of candidates in the full grid; saturates instead of overflowing.
    pub fn grid_size(&self, points: usize) -> usize {
        self.0
            .values()
            .fold(1usize, |acc, spec| acc.saturating_mul(spec.grid(points).len()))
    }

    /// Candidate `index` of the grid in mixed-radix order, the last parameter
    /// (by name) varying fastest.
    pub fn grid_point(&self, index: usize, points: usize) -> ParameterSet {
        let axes: Vec<(&String, Vec<ParamValue>)> = self
            .0
            .iter()
            .map(|(name, spec)| (name, spec.grid(points)))
            .collect();
        let mut rest = index;
        let mut values = Vec::with_capacity(axes.len());
        for (name, axis) in axes.iter().rev() {
            values.push(((*name).clone(), axis[rest % axis.len()].clone()));
            rest /= axis.len();
        }
        values.into_iter().collect()
    }

    /// Draw one candidate for every parameter in the schema.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterSet {
        self.0
            .iter()
            .map(|(name, spec)| (name.clone(), spec.sample(rng)))
            .collect()
    }
}
