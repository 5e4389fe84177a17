//! XML material assignment manifest.
//!
//! ```xml
//! <assignments>
//!   <node path="/root/body">
//!     <shader name="skin">0-9,12</shader>
//!     <shader surface="cloth" instance="1"/>
//!   </node>
//! </assignments>
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::util::{Error, Result};

#[derive(Debug, Deserialize)]
struct AssignmentsXml {
    #[serde(rename = "node", default)]
    nodes: Vec<NodeXml>,
}

#[derive(Debug, Deserialize)]
struct NodeXml {
    #[serde(rename = "@path")]
    path: String,
    #[serde(rename = "shader", default)]
    shaders: Vec<ShaderXml>,
}

#[derive(Debug, Deserialize)]
struct ShaderXml {
    #[serde(rename = "@surface", default)]
    surface: Option<String>,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@instance", default)]
    instance: Option<usize>,
    #[serde(rename = "$text", default)]
    faces: String,
}

/// One `<shader>` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderAssignment {
    pub material: String,
    /// Which mesh sharing the node path receives the assignment.
    pub instance: usize,
    /// Face indices; empty for a whole-object assignment.
    pub faces: Vec<u32>,
}

/// Assignments for one node path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeAssignments {
    pub path: String,
    pub shaders: Vec<ShaderAssignment>,
}

/// Parsed manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssignmentDocument {
    pub nodes: Vec<NodeAssignments>,
}

impl AssignmentDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc: AssignmentsXml = quick_xml::de::from_str(xml)?;
        let mut nodes = Vec::with_capacity(doc.nodes.len());

        for node in doc.nodes {
            let mut shaders = Vec::with_capacity(node.shaders.len());
            for shader in node.shaders {
                // `surface` wins over `name`; shaders with neither are skipped.
                let Some(material) = shader.surface.or(shader.name) else {
                    tracing::debug!(path = %node.path, "shader without name skipped");
                    continue;
                };
                shaders.push(ShaderAssignment {
                    material,
                    instance: shader.instance.unwrap_or(0),
                    faces: parse_face_ranges(&shader.faces)?,
                });
            }
            nodes.push(NodeAssignments {
                path: node.path,
                shaders,
            });
        }

        Ok(Self { nodes })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    /// Total number of shader assignments.
    pub fn assignment_count(&self) -> usize {
        self.nodes.iter().map(|n| n.shaders.len()).sum()
    }
}

/// Upper bound on the faces one shader entry may list.
pub const MAX_ASSIGNED_FACES: usize = 1 << 24;

/// Parse `"0,3-5,9"` into `[0, 3, 4, 5, 9]`. Ranges are inclusive; empty
/// entries are ignored and an empty string yields no faces. Lists expanding
/// past [`MAX_ASSIGNED_FACES`] are rejected.
pub fn parse_face_ranges(text: &str) -> Result<Vec<u32>> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|_| Error::InvalidFaceRange(text.trim().to_string()))
    };

    let mut faces = Vec::new();
    for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let bounds: Vec<&str> = item.split('-').filter(|s| !s.trim().is_empty()).collect();
        match bounds.as_slice() {
            [single] => faces.push(parse(single)?),
            [first, last] => {
                let (first, last) = (parse(first)?, parse(last)?);
                let len = (last as usize + 1).saturating_sub(first as usize);
                if faces.len() + len > MAX_ASSIGNED_FACES {
                    return Err(Error::InvalidFaceRange(item.to_string()));
                }
                faces.extend(first..=last);
            }
            _ => return Err(Error::InvalidFaceRange(item.to_string())),
        }
    }
    Ok(faces)
}
