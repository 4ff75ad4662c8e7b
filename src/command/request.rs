use std::collections::BTreeMap;
use std::fmt;

use crate::command::fingerprint::{CacheKey, hash_cmd, hash_stack};
use crate::foundation::error::{MapAnimError, MapAnimResult};

/// Program name of the 3D view renderer. Commands invoking it are [`CmdKind::View3d`].
pub const VIEW_3D_PROGRAM: &str = "m.nviz.image";

/// How a command is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmdKind {
    /// Raster/vector layer drawn by a display module into a transparent image with a mask.
    Layer2d,
    /// Full 3D view rendered to an opaque image. Never composed.
    View3d,
}

/// One external rendering command: a program name followed by `key=value` parameters or flags.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct RenderCmd {
    argv: Vec<String>,
}

impl RenderCmd {
    /// Build a command from its argument vector. The first element is the program name.
    pub fn new<I, S>(argv: I) -> MapAnimResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv = argv.into_iter().map(Into::into).collect::<Vec<String>>();
        match argv.first() {
            None => Err(MapAnimError::validation("render command must not be empty")),
            Some(p) if p.trim().is_empty() => Err(MapAnimError::validation(
                "render command program name must not be blank",
            )),
            Some(_) => Ok(Self { argv }),
        }
    }

    /// Program name.
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments after the program name.
    pub fn params(&self) -> &[String] {
        &self.argv[1..]
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Rendering kind, decided by the program name.
    pub fn kind(&self) -> CmdKind {
        if self.program() == VIEW_3D_PROGRAM {
            CmdKind::View3d
        } else {
            CmdKind::Layer2d
        }
    }

    /// Value of the `key=value` parameter named `key`, if present.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params().iter().find_map(|p| {
            let (k, v) = p.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// Copy of this command with `key=value` set, replacing an existing `key=` parameter.
    pub fn with_param(&self, key: &str, value: &str) -> Self {
        let mut argv = self.argv.clone();
        let entry = format!("{key}={value}");
        let existing = argv
            .iter()
            .skip(1)
            .position(|p| p.split_once('=').is_some_and(|(k, _)| k == key));
        match existing {
            Some(i) => argv[i + 1] = entry,
            None => argv.push(entry),
        }
        Self { argv }
    }
}

impl TryFrom<Vec<String>> for RenderCmd {
    type Error = MapAnimError;

    fn try_from(argv: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(argv)
    }
}

impl From<RenderCmd> for Vec<String> {
    fn from(cmd: RenderCmd) -> Self {
        cmd.argv
    }
}

impl fmt::Display for RenderCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// Computational region a 2D layer (or the 3D view) is rendered in.
///
/// Keys are region parameter names (`n`, `s`, `e`, `w`, `res`, ...). Ordering is stable so equal
/// regions always hash and serialize identically.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Region(BTreeMap<String, String>);

impl Region {
    /// Empty region.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Value of one region parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `key=value` arguments for the region resolver (`g.region`).
    pub fn to_args(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Region {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A single render to perform: one command in an optional region.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderRequest {
    cmd: RenderCmd,
    region: Option<Region>,
    key: CacheKey,
}

impl RenderRequest {
    /// Build a request. 3D commands ignore `region`: their view region is session-wide.
    pub fn new(cmd: RenderCmd, region: Option<Region>) -> Self {
        let region = match cmd.kind() {
            CmdKind::View3d => None,
            CmdKind::Layer2d => region.filter(|r| !r.is_empty()),
        };
        let key = hash_cmd(&cmd, region.as_ref());
        Self { cmd, region, key }
    }

    /// The command.
    pub fn cmd(&self) -> &RenderCmd {
        &self.cmd
    }

    /// Region the command is rendered in.
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    /// Rendering kind of the command.
    pub fn kind(&self) -> CmdKind {
        self.cmd.kind()
    }

    /// File cache key.
    pub fn key(&self) -> CacheKey {
        self.key
    }
}

/// One output frame: a stack of 2D layers blended with per-layer opacity.
///
/// Layers are listed top first, the order in which a layer list is presented to the user.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeRequest {
    layers: Vec<RenderRequest>,
    opacities: Vec<f64>,
    region: Option<Region>,
    key: CacheKey,
}

impl CompositeRequest {
    /// Validate a layer stack and derive its bitmap cache key.
    pub fn new(
        cmds: Vec<RenderCmd>,
        opacities: Vec<f64>,
        region: Option<Region>,
    ) -> MapAnimResult<Self> {
        if cmds.is_empty() {
            return Err(MapAnimError::validation(
                "composite stack must have at least one layer",
            ));
        }
        if cmds.len() != opacities.len() {
            return Err(MapAnimError::validation(format!(
                "composite stack has {} layers but {} opacities",
                cmds.len(),
                opacities.len()
            )));
        }
        if let Some(o) = opacities
            .iter()
            .find(|o| !o.is_finite() || !(0.0..=1.0).contains(*o))
        {
            return Err(MapAnimError::validation(format!(
                "layer opacity must be within [0, 1], got {o}"
            )));
        }
        if let Some(c) = cmds.iter().find(|c| c.kind() == CmdKind::View3d) {
            return Err(MapAnimError::validation(format!(
                "3D view command cannot be composed: {c}"
            )));
        }

        let region = region.filter(|r| !r.is_empty());
        let key = hash_stack(&cmds, &opacities, region.as_ref());
        let layers = cmds
            .into_iter()
            .map(|cmd| RenderRequest::new(cmd, region.clone()))
            .collect();
        Ok(Self {
            layers,
            opacities,
            region,
            key,
        })
    }

    /// Layer requests, top first.
    pub fn layers(&self) -> &[RenderRequest] {
        &self.layers
    }

    /// Opacity per layer, aligned with [`Self::layers`].
    pub fn opacities(&self) -> &[f64] {
        &self.opacities
    }

    /// Region shared by all layers of the stack.
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    /// Bitmap cache key of the composed frame.
    pub fn key(&self) -> CacheKey {
        self.key
    }
}

#[cfg(test)]
#[path = "../../tests/unit/command/request.rs"]
mod tests;
