//! Header collection shared by a job's request template and an execution's
//! captured response.
//!
//! Internally an ordered sequence of (name, value) pairs — header names are
//! case-insensitive on the wire, and a naive `HashMap<String, String>` would
//! either silently collide two spellings of the same header or force the
//! caller to normalize case themselves. Stored on the row as a JSON object
//! (case-preserving, last-write-wins on a duplicate name).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            slot.1 = value.into();
        } else {
            self.0.push((name, value.into()));
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut h = Headers::new();
        for (k, v) in iter {
            h.insert(k, v);
        }
        h
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&str, &str> = self.0.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, String>::deserialize(deserializer)?;
        Ok(map.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_case_insensitive() {
        let mut h = Headers::new();
        h.insert("Content-Type", "application/json");
        assert_eq!(h.get("content-type"), Some("application/json"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn insert_overwrites_existing_case_insensitively() {
        let mut h = Headers::new();
        h.insert("X-Token", "first");
        h.insert("x-token", "second");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("X-Token"), Some("second"));
    }

    #[test]
    fn serde_roundtrip_preserves_pairs() {
        let mut h = Headers::new();
        h.insert("Authorization", "Bearer xyz");
        h.insert("X-Custom", "1");
        let json = serde_json::to_string(&h).unwrap();
        let back: Headers = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("authorization"), Some("Bearer xyz"));
        assert_eq!(back.get("x-custom"), Some("1"));
    }

    #[test]
    fn remove_is_case_insensitive() {
        let mut h = Headers::new();
        h.insert("X-Token", "v");
        h.remove("x-token");
        assert!(h.is_empty());
    }
}
