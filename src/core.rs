// Core traits and types shared by every environment in the crate.

/// A small ordered info map attached to resets and steps.
/// Keys are unique; inserting an existing key replaces its value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Info {
    entries: Vec<(String, InfoValue)>,
}

impl Info {
    /// Create an empty Info map.
    pub fn new() -> Self { Self { entries: Vec::new() } }

    /// Insert or replace a key with the given value.
    pub fn insert<K: Into<String>, V: Into<InfoValue>>(&mut self, key: K, value: V) {
        let k = key.into();
        let value = value.into();
        if let Some((_, v)) = self.entries.iter_mut().find(|(kk, _)| kk == &k) {
            *v = value;
        } else {
            self.entries.push((k, value));
        }
    }

    /// Get a reference to a value by key.
    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Boolean value stored under `key`, if present and boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(InfoValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Floating point value stored under `key`, if present and numeric.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(InfoValue::F64(v)) => Some(*v),
            Some(InfoValue::I64(v)) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InfoValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn len(&self) -> usize { self.entries.len() }
}

/// Value types stored in an info map.
#[derive(Clone, Debug, PartialEq)]
pub enum InfoValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
}

impl From<bool> for InfoValue { fn from(v: bool) -> Self { InfoValue::Bool(v) } }
impl From<i64> for InfoValue { fn from(v: i64) -> Self { InfoValue::I64(v) } }
impl From<usize> for InfoValue { fn from(v: usize) -> Self { InfoValue::I64(v as i64) } }
impl From<f64> for InfoValue { fn from(v: f64) -> Self { InfoValue::F64(v) } }
impl From<&str> for InfoValue { fn from(v: &str) -> Self { InfoValue::Str(v.to_string()) } }
impl From<String> for InfoValue { fn from(v: String) -> Self { InfoValue::Str(v) } }

/// A step result from the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Step<Obs> {
    pub observation: Obs,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

impl<Obs> Step<Obs> {
    pub fn new(observation: Obs, reward: f64, terminated: bool, truncated: bool, info: Info) -> Self {
        Self { observation, reward, terminated, truncated, info }
    }

    /// Whether the episode ended on this step, for either reason.
    pub fn done(&self) -> bool { self.terminated || self.truncated }
}

/// Recoverable errors across the crate.
#[derive(thiserror::Error, Debug)]
pub enum GymError {
    #[error("Invalid action: {0}")]
    InvalidAction(String),
    #[error("Environment not ready: {0}")]
    NotReady(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch { expected: Vec<usize>, found: Vec<usize> },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Value function cache error: {0}")]
    Cache(#[from] bincode::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results using GymError.
pub type Result<T> = std::result::Result<T, GymError>;

/// Core environment trait following the Gymnasium contract.
pub trait Env {
    type Obs;
    type Act;

    /// Reset the environment to an initial state.
    /// Implementations should re-seed internal RNGs when `seed` is provided.
    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info);

    /// Apply an action and advance the environment by one step.
    /// Fails when the environment is not in a steppable phase or the action is invalid.
    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>>;

    /// Close and release any external resources.
    fn close(&mut self) {}
}
