//! Resource stash with a declarative value language
//!
//! A stash maps resource keys to concrete quantities. Values can be
//! declared as rules and resolved ("rolled") through a shared random
//! source:
//!
//! - `"5"` / `5` - plain quantity
//! - `"1:3"` - uniform integer in `[1, 3]`
//! - `"10%50"` - 10 with 50% probability, otherwise 0
//! - `"5%30*"` - weighted group member: exactly one `*` entry wins per roll
//! - `"1#2"` - sampled group member: a fixed-size subset resolves per roll
//!
//! Rolled amounts are sparse: arithmetic drops keys whose quantity
//! reaches zero. Keys written as zero by a roll itself (losing weighted
//! or unselected sampled entries) stay visible until the next operation.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{Result, WardenError};
use crate::rng::GameRng;

static STASH_PATTERN: OnceLock<Regex> = OnceLock::new();

fn stash_pattern() -> &'static Regex {
    STASH_PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<min>\d+)(:(?P<max>\d+))?(%(?P<probability>\d+))?(?P<weighted>\*)?(#(?P<sampled>\d+))?$")
            .unwrap()
    })
}

fn parse_error(text: &str) -> WardenError {
    WardenError::StashParse(format!("unable to parse {:?}", text))
}

fn value_as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Store integral results as JSON integers, everything else as floats
fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}

// ============================================================================
// Stash Value
// ============================================================================

/// One parsed stash entry: either a plain quantity or a randomized rule
#[derive(Debug, Clone)]
pub struct StashValue {
    raw: Value,
    plain: bool,
    min: i64,
    max: i64,
    probability: f64,
    weighted: bool,
    sampled: usize,
}

impl StashValue {
    /// Parse a declarative value. Numbers pass through as plain
    /// quantities; strings are either numeric (truncated to an integer)
    /// or a rule in the pattern language.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Number(_) => Ok(Self::plain(value.clone())),
            Value::String(text) => Self::parse_text(text),
            other => Err(WardenError::StashParse(format!(
                "unsupported stash value: {}",
                other
            ))),
        }
    }

    fn plain(raw: Value) -> Self {
        Self {
            raw,
            plain: true,
            min: 0,
            max: 0,
            probability: 1.0,
            weighted: false,
            sampled: 0,
        }
    }

    fn parse_text(text: &str) -> Result<Self> {
        if let Ok(number) = text.parse::<f64>() {
            if !number.is_finite() {
                return Err(parse_error(text));
            }
            return Ok(Self::plain(Value::from(number as i64)));
        }

        let captures = stash_pattern()
            .captures(text)
            .ok_or_else(|| parse_error(text))?;

        let min = capture_i64(&captures, "min", 0, text)?;
        let max = capture_i64(&captures, "max", min, text)?;
        let probability = capture_i64(&captures, "probability", 100, text)? as f64 / 100.0;

        // A sample count trumps the weighted marker
        let (weighted, sampled) = match captures.name("sampled") {
            Some(m) => {
                let count = m
                    .as_str()
                    .parse::<usize>()
                    .map_err(|_| parse_error(text))?;
                (false, count)
            }
            None => (captures.name("weighted").is_some(), 0),
        };

        Ok(Self {
            raw: Value::String(text.to_string()),
            plain: false,
            min,
            max,
            probability,
            weighted,
            sampled,
        })
    }

    /// True when the value carries no randomness
    pub fn is_plain(&self) -> bool {
        self.plain
    }

    /// True when the value belongs to a mutually-exclusive weighted group
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    /// Probability of a nonzero result, `1.0` when unconditional
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Sample-group size, `0` when the value is not sampled
    pub fn sample_count(&self) -> usize {
        self.sampled
    }

    /// Resolve to a concrete quantity
    pub fn roll(&self, rng: &GameRng) -> Value {
        self.roll_with(rng, None)
    }

    /// Resolve with the probability check forced to pass
    pub(crate) fn roll_forced(&self, rng: &GameRng) -> Value {
        self.roll_with(rng, Some(0.0))
    }

    fn roll_with(&self, rng: &GameRng, forced_dice: Option<f64>) -> Value {
        if self.plain {
            return self.raw.clone();
        }
        if self.probability < 1.0 {
            let dice = forced_dice.unwrap_or_else(|| rng.random());
            if self.probability <= dice {
                return Value::from(0);
            }
        }
        if self.min < self.max {
            Value::from(rng.range_inclusive(self.min, self.max))
        } else {
            Value::from(self.min)
        }
    }

    /// Render the value back to its declarative form
    pub fn format_value(&self) -> String {
        if self.plain {
            return self.raw.to_string();
        }
        let mut text = if self.min != self.max {
            format!("{}:{}", self.min, self.max)
        } else {
            self.min.to_string()
        };
        if self.probability < 1.0 {
            text.push_str(&format!("%{}", (self.probability * 100.0).round() as i64));
        }
        if self.weighted {
            text.push('*');
        } else if self.sampled > 0 {
            text.push_str(&format!("#{}", self.sampled));
        }
        text
    }
}

fn capture_i64(captures: &regex::Captures<'_>, name: &str, default: i64, text: &str) -> Result<i64> {
    match captures.name(name) {
        Some(m) => m.as_str().parse::<i64>().map_err(|_| parse_error(text)),
        None => Ok(default),
    }
}

// ============================================================================
// Stash
// ============================================================================

/// Sparse resource mapping with randomized construction
#[derive(Debug, Clone)]
pub struct Stash {
    stash_values: BTreeMap<String, StashValue>,
    amounts: BTreeMap<String, Value>,
    rng: GameRng,
}

impl Stash {
    /// Parse a mapping of declarative values and roll it once
    pub fn new(src: &Map<String, Value>, rng: GameRng) -> Result<Self> {
        let mut stash_values = BTreeMap::new();
        for (key, value) in src {
            stash_values.insert(key.clone(), StashValue::parse(value)?);
        }
        let mut stash = Self {
            stash_values,
            amounts: BTreeMap::new(),
            rng,
        };
        if !stash.stash_values.is_empty() {
            stash.roll();
        }
        Ok(stash)
    }

    /// Bind already-rolled amounts without parsing or redrawing. This is
    /// how a stored `resources` mapping is reattached to its state.
    pub fn from_amounts(amounts: &Map<String, Value>, rng: GameRng) -> Self {
        Self {
            stash_values: BTreeMap::new(),
            amounts: amounts
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            rng,
        }
    }

    /// Stash with no entries
    pub fn empty(rng: GameRng) -> Self {
        Self {
            stash_values: BTreeMap::new(),
            amounts: BTreeMap::new(),
            rng,
        }
    }

    /// Redraw every entry from its parsed rule.
    ///
    /// Entries resolve in four groups: plain values copy through,
    /// independent rules roll their own probability and range, the
    /// weighted group elects exactly one winner by probability weight,
    /// and the sampled group resolves a fixed-size random subset.
    /// Losing weighted keys and unselected sampled keys are written as
    /// explicit zeros.
    pub fn roll(&mut self) {
        self.amounts.clear();

        let mut weighted: Vec<(String, f64)> = Vec::new();
        let mut sample_group: Vec<String> = Vec::new();
        let mut sample_count = 0usize;

        for (key, value) in &self.stash_values {
            if value.plain {
                self.amounts.insert(key.clone(), value.roll(&self.rng));
            } else if value.sampled > 0 {
                sample_group.push(key.clone());
                sample_count = value.sampled;
            } else if value.weighted && value.probability > 0.0 {
                weighted.push((key.clone(), value.probability));
            } else {
                self.amounts.insert(key.clone(), value.roll(&self.rng));
            }
        }

        if weighted.len() > 1 {
            for (key, _) in &weighted {
                self.amounts.insert(key.clone(), Value::from(0));
            }
            if let Some(winner) = self.rng.weighted_choice(&weighted) {
                if let Some(value) = self.stash_values.get(&winner) {
                    self.amounts.insert(winner.clone(), value.roll_forced(&self.rng));
                }
            }
        } else if let Some((key, _)) = weighted.first() {
            if let Some(value) = self.stash_values.get(key) {
                self.amounts.insert(key.clone(), value.roll_forced(&self.rng));
            }
        }

        if sample_group.len() > 1 && sample_count > 0 {
            let chosen = self.rng.sample(&sample_group, sample_count);
            for key in &sample_group {
                if chosen.contains(key) {
                    if let Some(value) = self.stash_values.get(key) {
                        self.amounts.insert(key.clone(), value.roll(&self.rng));
                    }
                } else {
                    self.amounts.insert(key.clone(), Value::from(0));
                }
            }
        }
    }

    /// Quantity for a key, `0` when absent or non-numeric
    pub fn get(&self, key: &str) -> i64 {
        self.amounts
            .get(key)
            .and_then(value_as_f64)
            .map(|number| number as i64)
            .unwrap_or(0)
    }

    /// Raw value for a key
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.amounts.get(key)
    }

    /// Write a key directly, bypassing the rule language
    pub fn set(&mut self, key: &str, value: Value) {
        self.amounts.insert(key.to_string(), value);
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.amounts.remove(key)
    }

    /// Rolled amounts, sorted by key
    pub fn amounts(&self) -> &BTreeMap<String, Value> {
        &self.amounts
    }

    /// Copy the amounts into a JSON object for storage
    pub fn to_map(&self) -> Map<String, Value> {
        self.amounts
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    /// True when `other` is fully covered: every key of `other` exists
    /// here with at least the same quantity
    pub fn contains(&self, other: &Stash) -> bool {
        for (key, value) in &other.amounts {
            let own = match self.amounts.get(key) {
                Some(own) => own,
                None => return false,
            };
            match (value_as_f64(value), value_as_f64(own)) {
                (Some(needed), Some(have)) if needed <= have => {}
                _ => return false,
            }
        }
        true
    }

    /// Containment check against a declarative mapping, which is parsed
    /// and rolled before comparing
    pub fn contains_amounts(&self, src: &Map<String, Value>) -> Result<bool> {
        let other = Stash::new(src, self.rng.clone())?;
        Ok(self.contains(&other))
    }

    /// Copy with every quantity sign-flipped; non-numeric values pass
    /// through unchanged
    pub fn negate(&self) -> Stash {
        let mut negated = Stash::empty(self.rng.clone());
        for (key, value) in &self.amounts {
            let flipped = match value_as_f64(value) {
                Some(number) => number_value(-number),
                None => value.clone(),
            };
            negated.amounts.insert(key.clone(), flipped);
        }
        negated
    }

    /// True when no quantity is negative
    pub fn is_positive(&self) -> bool {
        self.amounts
            .values()
            .all(|value| value_as_f64(value).map(|number| number >= 0.0).unwrap_or(true))
    }

    /// True when no entry carries randomness
    pub fn is_plain(&self) -> bool {
        self.stash_values.values().all(|value| value.plain)
    }

    /// True when no weighted entry with a positive probability remains
    pub fn weighted_empty(&self) -> bool {
        !self
            .stash_values
            .values()
            .any(|value| value.weighted && value.probability > 0.0)
    }

    /// Render the parsed rules back to their declarative strings
    pub fn format_rules(&self) -> BTreeMap<String, String> {
        self.stash_values
            .iter()
            .map(|(key, value)| (key.clone(), value.format_value()))
            .collect()
    }

    pub fn add<O: Into<StashOperand>>(&mut self, operand: O) -> Result<()> {
        self.apply(Op::Add, operand.into())
    }

    pub fn subtract<O: Into<StashOperand>>(&mut self, operand: O) -> Result<()> {
        self.apply(Op::Sub, operand.into())
    }

    pub fn multiply<O: Into<StashOperand>>(&mut self, operand: O) -> Result<()> {
        self.apply(Op::Mul, operand.into())
    }

    fn apply(&mut self, op: Op, operand: StashOperand) -> Result<()> {
        match operand {
            StashOperand::Amounts(map) => {
                let other = Stash::new(&map, self.rng.clone())?;
                for (key, value) in &other.amounts {
                    let rhs = value_as_f64(value).ok_or_else(|| {
                        WardenError::StashParse(format!("non-numeric operand for key {}", key))
                    })?;
                    self.apply_number(op, key, rhs)?;
                }
            }
            StashOperand::Entry(key, value) => {
                let rhs = self.parse_and_roll(&value)?;
                self.apply_number(op, &key, rhs)?;
            }
            StashOperand::Scalar(value) => {
                // Parsed and rolled once, then applied to every key
                let rhs = self.parse_and_roll(&value)?;
                let keys: Vec<String> = self.amounts.keys().cloned().collect();
                for key in &keys {
                    self.apply_number(op, key, rhs)?;
                }
            }
        }
        Ok(())
    }

    fn parse_and_roll(&self, value: &Value) -> Result<f64> {
        let rolled = StashValue::parse(value)?.roll(&self.rng);
        value_as_f64(&rolled)
            .ok_or_else(|| WardenError::StashParse(format!("non-numeric roll of {}", value)))
    }

    fn apply_number(&mut self, op: Op, key: &str, rhs: f64) -> Result<()> {
        let current = match self.amounts.get(key) {
            Some(value) => value_as_f64(value).ok_or_else(|| {
                WardenError::StashParse(format!("non-numeric value at key {}", key))
            })?,
            None => 0.0,
        };
        let result = op.apply(current, rhs);
        if !result.is_finite() {
            return Err(WardenError::StashParse(format!(
                "non-finite result at key {}",
                key
            )));
        }
        if result != 0.0 {
            self.amounts.insert(key.to_string(), number_value(result));
        } else {
            self.amounts.remove(key);
        }
        Ok(())
    }
}

impl fmt::Display for Stash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.amounts {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
}

impl Op {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Op::Add => lhs + rhs,
            Op::Sub => lhs - rhs,
            Op::Mul => lhs * rhs,
        }
    }
}

/// Right-hand side of a stash operation: a whole mapping, one keyed
/// entry, or a scalar applied across every key. Scalar and entry values
/// go through the full rule language.
pub enum StashOperand {
    Amounts(Map<String, Value>),
    Entry(String, Value),
    Scalar(Value),
}

impl From<&Stash> for StashOperand {
    fn from(stash: &Stash) -> Self {
        Self::Amounts(stash.to_map())
    }
}

impl From<Map<String, Value>> for StashOperand {
    fn from(map: Map<String, Value>) -> Self {
        Self::Amounts(map)
    }
}

impl From<&Map<String, Value>> for StashOperand {
    fn from(map: &Map<String, Value>) -> Self {
        Self::Amounts(map.clone())
    }
}

impl From<Value> for StashOperand {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Amounts(map),
            other => Self::Scalar(other),
        }
    }
}

impl From<(&str, Value)> for StashOperand {
    fn from((key, value): (&str, Value)) -> Self {
        Self::Entry(key.to_string(), value)
    }
}

impl From<(&str, i64)> for StashOperand {
    fn from((key, value): (&str, i64)) -> Self {
        Self::Entry(key.to_string(), Value::from(value))
    }
}

impl From<(&str, &str)> for StashOperand {
    fn from((key, value): (&str, &str)) -> Self {
        Self::Entry(key.to_string(), Value::String(value.to_string()))
    }
}

impl From<i64> for StashOperand {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<f64> for StashOperand {
    fn from(value: f64) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<&str> for StashOperand {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::String(value.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
