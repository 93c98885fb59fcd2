use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clip_preview::{Clip, MemoryHost, SceneDesc};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    scenes: HashMap<String, String>,
    clips: HashMap<String, String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a>(map: &'a HashMap<String, String>, kind: &str, name: &str) -> Result<&'a str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

/// Rig/graph scenes, loaded into a fresh [`MemoryHost`] on every call.
pub mod scenes {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.scenes.keys().cloned().collect()
    }

    pub fn desc(name: &str) -> Result<SceneDesc> {
        load_json(lookup(&MANIFEST.scenes, "scene", name)?)
    }

    pub fn host(name: &str) -> Result<MemoryHost> {
        Ok(MemoryHost::from_scene(desc(name)?))
    }
}

pub mod clips {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.clips.keys().cloned().collect()
    }

    pub fn load(name: &str) -> Result<Clip> {
        load_json(lookup(&MANIFEST.clips, "clip", name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_manifest_entry_loads() {
        for key in scenes::keys() {
            scenes::host(&key).unwrap_or_else(|e| panic!("scene {key}: {e:#}"));
        }
        for key in clips::keys() {
            clips::load(&key).unwrap_or_else(|e| panic!("clip {key}: {e:#}"));
        }
    }

    #[test]
    fn unknown_names_error() {
        assert!(scenes::host("missing").is_err());
        assert!(clips::load("missing").is_err());
    }
}
