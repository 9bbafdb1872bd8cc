//! Job files: bindings and dispatch extents for `fxvm run` / `fxvm play`.
//!
//! ```toml
//! groups = [2, 1, 1]
//! threads = [64, 1, 1]
//!
//! [constants]
//! scale = 0.5
//! tint = [1.0, 0.5, 0.25]
//!
//! [[buffers]]
//! slot = 5
//! kind = "f32"
//! data = [1.0, 2.0]
//!
//! [[uavs]]
//! name = "out"
//! element_size = 4
//! length = 128
//! register = 0
//! format = "f32"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use fxvm_core::bundle::{ConstantType, find_entry};
use fxvm_core::{Bundle, Uav};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    pub groups: Option<[u32; 3]>,
    pub threads: Option<[u32; 3]>,
    pub validate: Option<bool>,
    pub step_limit: Option<u64>,
    #[serde(default)]
    pub constants: BTreeMap<String, JobValue>,
    #[serde(default)]
    pub buffers: Vec<BufferSpec>,
    #[serde(default)]
    pub uavs: Vec<UavSpec>,
}

/// Number or list of numbers as written in a job file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JobValue {
    Int(i64),
    Float(f64),
    List(Vec<JobValue>),
}

/// How a 32-bit word is read from or written to a job file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemKind {
    #[default]
    U32,
    I32,
    F32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferSpec {
    pub slot: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: ElemKind,
    pub data: Vec<JobValue>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UavSpec {
    pub name: String,
    #[serde(default = "default_element_size")]
    pub element_size: u32,
    pub length: u32,
    pub register: u32,
    /// Bind the whole buffer (counter first) instead of the data view.
    #[serde(default)]
    pub with_counter: bool,
    #[serde(default)]
    pub format: ElemKind,
}

fn default_element_size() -> u32 {
    4
}

/// UAV created from a job, remembered for dumping after the run.
#[derive(Debug)]
pub struct BoundUav {
    pub uav: Uav,
    pub format: ElemKind,
}

impl Job {
    /// Loads a job from TOML, YAML or JSON, picked by file extension.
    pub fn load(path: &Path) -> anyhow::Result<Job> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read job '{}'", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let job = match ext.as_str() {
            "toml" => toml::from_str(&text).with_context(|| format!("Invalid TOML job '{}'", path.display()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&text).with_context(|| format!("Invalid YAML job '{}'", path.display()))?
            }
            "json" => serde_json::from_str(&text).with_context(|| format!("Invalid JSON job '{}'", path.display()))?,
            other => bail!("Unsupported job file extension '{}' (expected toml, yaml, yml or json)", other),
        };
        Ok(job)
    }

    /// Writes constants, creates and binds buffers and UAVs.
    pub fn apply(&self, bundle: &mut Bundle) -> anyhow::Result<Vec<BoundUav>> {
        for (name, value) in &self.constants {
            let ty = match find_entry(bundle.layout(), name) {
                Some(entry) => entry.ty.clone(),
                None => bail!("Job sets constant '{}' which is not in the bundle layout", name),
            };
            let bytes = constant_bytes(&ty, value).with_context(|| format!("Invalid value for constant '{}'", name))?;
            bundle.set_constant(name, &bytes)?;
        }

        for spec in &self.buffers {
            let words = spec
                .data
                .iter()
                .map(|v| to_word(spec.kind, v))
                .collect::<anyhow::Result<Vec<_>>>()
                .with_context(|| format!("Invalid data for buffer at slot {}", spec.slot))?;
            let name = spec.name.clone().unwrap_or_else(|| format!("slot{}", spec.slot));
            let view = bundle.create_buffer(&name, &words);
            bundle.set_input(spec.slot, view)?;
            tracing::debug!(target: "fxvm::cli", buffer = %name, slot = spec.slot, words = words.len(), "bound buffer");
        }

        let mut uavs = Vec::with_capacity(self.uavs.len());
        for spec in &self.uavs {
            let uav = bundle.create_uav(&spec.name, spec.element_size, spec.length, spec.register)?;
            let view = if spec.with_counter { uav.buffer } else { uav.data };
            bundle.set_input(uav.index, view)?;
            uavs.push(BoundUav {
                uav,
                format: spec.format,
            });
        }
        Ok(uavs)
    }
}

fn scalars(value: &JobValue) -> anyhow::Result<Vec<&JobValue>> {
    match value {
        JobValue::List(items) => {
            if let Some(nested) = items.iter().find(|v| matches!(v, JobValue::List(_))) {
                bail!("Nested lists are not supported: {:?}", nested);
            }
            Ok(items.iter().collect())
        }
        scalar => Ok(vec![scalar]),
    }
}

fn to_word(kind: ElemKind, value: &JobValue) -> anyhow::Result<u32> {
    let word = match (kind, value) {
        (_, JobValue::List(_)) => bail!("Expected a number, found a list"),
        (ElemKind::F32, JobValue::Int(v)) => (*v as f32).to_bits(),
        (ElemKind::F32, JobValue::Float(v)) => (*v as f32).to_bits(),
        (ElemKind::I32, JobValue::Int(v)) => i32::try_from(*v).with_context(|| format!("{} does not fit in i32", v))? as u32,
        (ElemKind::U32, JobValue::Int(v)) => u32::try_from(*v).with_context(|| format!("{} does not fit in u32", v))?,
        (ElemKind::I32 | ElemKind::U32, JobValue::Float(v)) => bail!("Expected an integer, found {}", v),
    };
    Ok(word)
}

/// Little-endian bytes for a constant, converted by the layout's type tag.
pub fn constant_bytes(ty: &ConstantType, value: &JobValue) -> anyhow::Result<Vec<u8>> {
    let kind = match ty {
        ConstantType::Float | ConstantType::Float3 | ConstantType::Float4 => ElemKind::F32,
        ConstantType::Int => ElemKind::I32,
        ConstantType::Uint => ElemKind::U32,
        ConstantType::Other(tag) => bail!("Constants of type '{}' cannot be set", tag),
    };
    let mut bytes = Vec::new();
    for scalar in scalars(value)? {
        bytes.extend_from_slice(&to_word(kind, scalar)?.to_le_bytes());
    }
    Ok(bytes)
}

/// Renders words for output according to `kind`.
pub fn render_words(kind: ElemKind, words: &[u32]) -> Vec<serde_json::Value> {
    words
        .iter()
        .map(|w| match kind {
            ElemKind::U32 => serde_json::Value::from(*w),
            ElemKind::I32 => serde_json::Value::from(*w as i32),
            ElemKind::F32 => serde_json::Value::from(f32::from_bits(*w) as f64),
        })
        .collect()
}
