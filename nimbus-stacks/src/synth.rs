//! Cloud assembly output
//!
//! Writes one `<StackId>.template.json` per stack and a `manifest.json`
//! listing the stacks in deployment order. Rendering is deterministic, so
//! synthesizing an unchanged topology twice produces identical files.

use std::fs;
use std::path::Path;

use nimbus_core::{Environment, StackId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::topology::Topology;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: StackId,
    pub template_file: String,
    /// Index of the wave the stack deploys in
    pub wave: usize,
    pub dependencies: Vec<StackId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub environment: Environment,
    /// Stacks in deployment order
    pub stacks: Vec<ManifestEntry>,
}

impl Manifest {
    /// Reads a previously written manifest
    pub fn load(out_dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(out_dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}

pub fn template_file(id: &StackId) -> String {
    format!("{}.template.json", id)
}

/// Renders every stack template and the manifest into `out_dir`
pub fn synth(topology: &Topology, out_dir: &Path) -> Result<Manifest> {
    fs::create_dir_all(out_dir)?;

    let waves = topology.waves()?;
    let mut stacks = Vec::new();

    for stack in topology.deployment_order()? {
        let wave = waves
            .iter()
            .position(|w| w.iter().any(|s| s.id() == stack.id()))
            .unwrap_or_default();

        let file = template_file(stack.id());
        let mut rendered = stack.template().to_pretty_string()?;
        rendered.push('\n');
        fs::write(out_dir.join(&file), rendered)?;
        debug!(stack = %stack.id(), file = %file, "Template written");

        stacks.push(ManifestEntry {
            id: stack.id().clone(),
            template_file: file,
            wave,
            dependencies: stack.dependencies().iter().cloned().collect(),
        });
    }

    let manifest = Manifest {
        version: MANIFEST_VERSION.to_string(),
        environment: topology.env().clone(),
        stacks,
    };

    let mut rendered = serde_json::to_string_pretty(&manifest)?;
    rendered.push('\n');
    fs::write(out_dir.join(MANIFEST_FILE), rendered)?;

    info!(
        out_dir = %out_dir.display(),
        stacks = manifest.stacks.len(),
        "Cloud assembly synthesized"
    );

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use tempfile::tempdir;

    fn topology() -> Topology {
        let env = Environment::new("039612877479", "us-east-1").unwrap();
        Topology::build(&env, &TopologyConfig::default()).unwrap()
    }

    #[test]
    fn test_synth_writes_templates_and_manifest() {
        let dir = tempdir().unwrap();
        let manifest = synth(&topology(), dir.path()).unwrap();

        assert_eq!(manifest.stacks.len(), 8);
        assert_eq!(manifest.stacks[0].id.as_str(), "NetworkStack");
        assert_eq!(manifest.stacks[7].wave, 4);

        for entry in &manifest.stacks {
            let path = dir.path().join(&entry.template_file);
            let template: serde_json::Value =
                serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
            assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
        }

        assert_eq!(Manifest::load(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn test_resynthesis_is_byte_identical() {
        let dir = tempdir().unwrap();
        let topology = topology();

        synth(&topology, dir.path()).unwrap();
        let first = fs::read(dir.path().join("EcsStack.template.json")).unwrap();
        let first_manifest = fs::read(dir.path().join(MANIFEST_FILE)).unwrap();

        synth(&topology, dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("EcsStack.template.json")).unwrap(), first);
        assert_eq!(fs::read(dir.path().join(MANIFEST_FILE)).unwrap(), first_manifest);
    }

    #[test]
    fn test_cross_stack_values_are_imports() {
        let dir = tempdir().unwrap();
        synth(&topology(), dir.path()).unwrap();

        let content = fs::read_to_string(dir.path().join("AlbStack.template.json")).unwrap();
        assert!(content.contains("\"Fn::ImportValue\": \"NetworkStack:VpcId\""));
    }
}
