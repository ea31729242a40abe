//! Persistent alarm/radio document
//!
//! A small nested JSON document addressed by `/`-delimited key paths such
//! as `alarm/hour`. Every mutation is written back to disk before the call
//! returns.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Document written when no usable file exists
pub fn default_document() -> Value {
    json!({
        "alarm": {
            "on": false,
            "hour": 6,
            "min": 55
        },
        "radio": {
            "playing": false
        }
    })
}

/// Alarm section of the document, typed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSettings {
    pub on: bool,
    pub hour: u32,
    pub min: u32,
}

/// Config store backed by a single pretty-printed JSON file
///
/// Writes are synchronous `std::fs` calls made while holding a
/// `std::sync::Mutex`; the document is a few hundred bytes and only changes
/// on user requests, so this runs inline on the async handlers.
pub struct ConfigStore {
    path: PathBuf,
    document: Mutex<Value>,
}

impl ConfigStore {
    /// Load the document from `path`, falling back to defaults
    ///
    /// Read and parse failures are logged and replaced by the default
    /// document. Keys missing from a parsed file are filled in from the
    /// defaults. The result is written back immediately, so only a failed
    /// write is reported as an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let mut document = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(value) if value.is_object() => value,
                Ok(_) => {
                    warn!("{} is not a JSON object, using defaults", path.display());
                    default_document()
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    default_document()
                }
            },
            Err(e) => {
                info!("No usable config at {} ({}), using defaults", path.display(), e);
                default_document()
            }
        };
        fill_missing(&mut document, &default_document());

        let store = Self {
            path,
            document: Mutex::new(document),
        };
        store.save()?;
        Ok(store)
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the backing file with the full in-memory document
    pub fn save(&self) -> Result<()> {
        let document = self.lock();
        self.write(&document)
    }

    /// Resolve a `/`-delimited path
    pub fn get(&self, path: &str) -> Result<Value> {
        let document = self.lock();
        let mut current = &*document;
        for segment in path.split('/') {
            current = current
                .as_object()
                .and_then(|map| map.get(segment))
                .ok_or_else(|| Error::KeyNotFound(path.to_string()))?;
        }
        Ok(current.clone())
    }

    /// Assign `value` at a `/`-delimited path and persist
    ///
    /// Every segment but the last must resolve to a mapping; the last one is
    /// inserted when absent.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        let mut document = self.lock();
        assign(&mut document, path, value.into())?;
        debug!("Set {} and saving {}", path, self.path.display());
        self.write(&document)
    }

    /// Swap the value at a `/`-delimited path and persist, returning the
    /// previous value (`Null` when the key was absent)
    ///
    /// Read and write happen under one lock, so concurrent callers each see
    /// the value left by the one before.
    pub fn replace(&self, path: &str, value: impl Into<Value>) -> Result<Value> {
        let mut document = self.lock();
        let previous = assign(&mut document, path, value.into())?;
        debug!("Replaced {} and saving {}", path, self.path.display());
        self.write(&document)?;
        Ok(previous)
    }

    /// Read a boolean value
    pub fn get_bool(&self, path: &str) -> Result<bool> {
        self.get(path)?.as_bool().ok_or_else(|| Error::TypeMismatch {
            path: path.to_string(),
            expected: "boolean",
        })
    }

    /// Read a non-negative integer value
    pub fn get_u32(&self, path: &str) -> Result<u32> {
        self.get(path)?
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| Error::TypeMismatch {
                path: path.to_string(),
                expected: "non-negative integer",
            })
    }

    /// Read the alarm section
    pub fn alarm(&self) -> Result<AlarmSettings> {
        Ok(AlarmSettings {
            on: self.get_bool("alarm/on")?,
            hour: self.get_u32("alarm/hour")?,
            min: self.get_u32("alarm/min")?,
        })
    }

    /// Set wake hour and minute with a single flush
    ///
    /// Range checking is the caller's job; see `api::alarm`.
    pub fn set_alarm_time(&self, hour: u32, min: u32) -> Result<()> {
        let mut document = self.lock();
        assign(&mut document, "alarm/hour", hour.into())?;
        assign(&mut document, "alarm/min", min.into())?;
        self.write(&document)
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        // A panic while holding the lock leaves the document intact
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, document: &Value) -> Result<()> {
        let content = serde_json::to_string_pretty(document)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(Error::Persist)?;
        }
        std::fs::write(&self.path, content).map_err(Error::Persist)
    }
}

fn assign(document: &mut Value, path: &str, value: Value) -> Result<Value> {
    let not_found = || Error::KeyNotFound(path.to_string());
    let (parents, last) = match path.rsplit_once('/') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };

    let mut current = document;
    if let Some(parents) = parents {
        for segment in parents.split('/') {
            current = current
                .as_object_mut()
                .and_then(|map| map.get_mut(segment))
                .ok_or_else(not_found)?;
        }
    }

    let map: &mut Map<String, Value> = current.as_object_mut().ok_or_else(not_found)?;
    Ok(map.insert(last.to_string(), value).unwrap_or(Value::Null))
}

/// Copy every key of `defaults` that `target` lacks, recursing into mappings
///
/// A section that should be a mapping but holds a scalar or array is
/// replaced wholesale by its default.
fn fill_missing(target: &mut Value, defaults: &Value) {
    let (Some(target), Some(defaults)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };
    for (key, default) in defaults {
        match target.get_mut(key) {
            Some(existing) if default.is_object() && !existing.is_object() => {
                warn!("Config section {} is not a mapping, resetting to defaults", key);
                *existing = default.clone();
            }
            Some(existing) => fill_missing(existing, default),
            None => {
                target.insert(key.clone(), default.clone());
            }
        }
    }
}
