use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::command::request::Region;
use crate::tools::{CompositeJob, Render2dJob, Render3dJob, RenderTools, ToolStatus};

/// Program blending layer images into a composite.
pub const COMPOSITE_PROGRAM: &str = "g.pnmcomp";
/// Program resolving region parameters into full region bounds.
pub const REGION_PROGRAM: &str = "g.region";
/// Program reporting the session's database, location and mapset.
pub const GISENV_PROGRAM: &str = "g.gisenv";

const REGION_KEYS_2D: [(&str, &str); 8] = [
    ("north", "n"),
    ("south", "s"),
    ("east", "e"),
    ("west", "w"),
    ("cols", "cols"),
    ("rows", "rows"),
    ("e-w resol", "ewres"),
    ("n-s resol", "nsres"),
];

const REGION_KEYS_3D: [(&str, &str); 8] = [
    ("top", "t"),
    ("bottom", "b"),
    ("cols3", "cols3"),
    ("rows3", "rows3"),
    ("depths", "depths"),
    ("e-w resol3", "ewres3"),
    ("n-s resol3", "nsres3"),
    ("t-b resol", "tbres"),
];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Options for [`CommandTools`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ToolOpts {
    /// Display driver used for 2D renders (`GRASS_RENDER_IMMEDIATE`).
    pub driver: String,
    /// Kill a program after this many milliseconds. `None` waits indefinitely.
    pub timeout_ms: Option<u64>,
}

impl Default for ToolOpts {
    fn default() -> Self {
        Self {
            driver: "cairo".to_string(),
            timeout_ms: None,
        }
    }
}

impl ToolOpts {
    /// Per-invocation timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// [`RenderTools`] backed by the system's rendering programs.
///
/// The rendering environment is passed to each child process; the parent environment is never
/// modified, so concurrent workers cannot observe each other's settings.
#[derive(Clone, Debug, Default)]
pub struct CommandTools {
    opts: ToolOpts,
}

impl CommandTools {
    /// Create with `opts`.
    pub fn new(opts: ToolOpts) -> Self {
        Self { opts }
    }

    /// Options in use.
    pub fn opts(&self) -> &ToolOpts {
        &self.opts
    }

    fn run(&self, program: &str, args: &[String], envs: &[(&'static str, String)]) -> ToolStatus {
        tracing::debug!(program, ?args, "spawn");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        run_child(cmd, program, self.opts.timeout())
    }

    /// Run a short query program and return its standard output.
    fn read_command(&self, program: &str, args: &[String]) -> Result<String, String> {
        let out = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("failed to run {program}: {e}"))?;
        if !out.status.success() {
            return Err(format!(
                "{program} failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    /// `GRASS_REGION` value for `region`: projection and zone from the mapset's `WIND` file,
    /// bounds and resolution as resolved by `g.region`.
    fn region_env(&self, region: &Region, region3d: bool) -> Result<String, String> {
        let gisenv = parse_key_val(&self.read_command(GISENV_PROGRAM, &["-n".to_string()])?);
        let wind_file = wind_path(&gisenv)?;
        let wind = std::fs::read_to_string(&wind_file)
            .map_err(|e| format!("failed to read '{}': {e}", wind_file.display()))?;

        let mut args = vec![if region3d { "-ug3" } else { "-ug" }.to_string()];
        args.extend(region.to_args());
        let resolved = parse_key_val(&self.read_command(REGION_PROGRAM, &args)?);
        grass_region(&wind, &resolved, region3d)
    }

    fn region_var(
        &self,
        region: Option<&Region>,
        region3d: bool,
    ) -> Result<Option<(&'static str, String)>, ToolStatus> {
        let Some(region) = region else {
            return Ok(None);
        };
        match self.region_env(region, region3d) {
            Ok(value) => Ok(Some(("GRASS_REGION", value))),
            Err(e) => Err(ToolStatus::failed(format!("cannot resolve region: {e}"))),
        }
    }
}

impl RenderTools for CommandTools {
    fn render_2d(&self, job: &Render2dJob) -> ToolStatus {
        let mut envs = render_2d_env(job, &self.opts.driver);
        match self.region_var(job.region.as_ref(), false) {
            Ok(var) => envs.extend(var),
            Err(status) => return status,
        }
        self.run(job.cmd.program(), job.cmd.params(), &envs)
    }

    fn render_3d(&self, job: &Render3dJob) -> ToolStatus {
        let cmd = render_3d_cmd(job);
        let envs = match self.region_var(job.view_region.as_ref(), true) {
            Ok(var) => var.into_iter().collect::<Vec<_>>(),
            Err(status) => return status,
        };
        self.run(cmd.program(), cmd.params(), &envs)
    }

    fn composite(&self, job: &CompositeJob) -> ToolStatus {
        let envs = display_env(
            &self.opts.driver,
            job.size.width,
            job.size.height,
            &job.bgcolor.to_hex(),
            false,
            &job.output,
        );
        self.run(COMPOSITE_PROGRAM, &composite_args(job), &envs)
    }
}

fn display_env(
    driver: &str,
    width: u32,
    height: u32,
    bg_hex: &str,
    transparent: bool,
    output: &Path,
) -> Vec<(&'static str, String)> {
    vec![
        ("GRASS_RENDER_WIDTH", width.to_string()),
        ("GRASS_RENDER_HEIGHT", height.to_string()),
        ("GRASS_RENDER_IMMEDIATE", driver.to_string()),
        ("GRASS_RENDER_BACKGROUNDCOLOR", bg_hex.to_string()),
        ("GRASS_RENDER_TRUECOLOR", "TRUE".to_string()),
        (
            "GRASS_RENDER_TRANSPARENT",
            if transparent { "TRUE" } else { "FALSE" }.to_string(),
        ),
        ("GRASS_RENDER_FILE", output.display().to_string()),
    ]
}

pub(crate) fn render_2d_env(job: &Render2dJob, driver: &str) -> Vec<(&'static str, String)> {
    display_env(
        driver,
        job.size.width,
        job.size.height,
        &job.bgcolor.to_hex(),
        job.transparent,
        &job.output,
    )
}

/// `key=value` lines of a query program's output.
pub(crate) fn parse_key_val(s: &str) -> BTreeMap<String, String> {
    s.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

pub(crate) fn wind_path(gisenv: &BTreeMap<String, String>) -> Result<PathBuf, String> {
    let var = |key: &str| {
        gisenv
            .get(key)
            .ok_or_else(|| format!("{GISENV_PROGRAM} does not report {key}"))
    };
    Ok(PathBuf::from(var("GISDBASE")?)
        .join(var("LOCATION_NAME")?)
        .join(var("MAPSET")?)
        .join("WIND"))
}

/// Build the `GRASS_REGION` string: `proj` and `zone` from `wind`, then the resolved bounds in
/// region file key names.
pub(crate) fn grass_region(
    wind: &str,
    resolved: &BTreeMap<String, String>,
    region3d: bool,
) -> Result<String, String> {
    let mut out = String::new();
    for line in wind.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key == "proj" || key == "zone" {
            out.push_str(&format!("{key}: {};", value.trim()));
        }
    }

    let extra: &[(&str, &str)] = if region3d { &REGION_KEYS_3D } else { &[] };
    for (wind_key, resolved_key) in REGION_KEYS_2D.iter().chain(extra) {
        let value = resolved
            .get(*resolved_key)
            .ok_or_else(|| format!("{REGION_PROGRAM} output lacks '{resolved_key}'"))?;
        out.push_str(&format!("{wind_key}: {value};"));
    }
    Ok(out)
}

pub(crate) fn render_3d_cmd(job: &Render3dJob) -> crate::command::request::RenderCmd {
    let stem = job.output.with_extension("");
    job.cmd
        .with_param("output", &stem.display().to_string())
        .with_param(
            "size",
            &format!("{},{}", job.size.width, job.size.height),
        )
        .with_param("format", "ppm")
        .with_param("bgcolor", &job.bgcolor.to_colon())
}

pub(crate) fn composite_args(job: &CompositeJob) -> Vec<String> {
    let join_paths = |paths: &[std::path::PathBuf]| {
        paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    let opacities = job
        .opacities
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    vec![
        "--overwrite".to_string(),
        format!("input={}", join_paths(&job.inputs)),
        format!("mask={}", join_paths(&job.masks)),
        format!("opacity={opacities}"),
        format!("bgcolor={}", job.bgcolor.to_colon()),
        format!("width={}", job.size.width),
        format!("height={}", job.size.height),
        format!("output={}", job.output.display()),
    ]
}

fn run_child(mut cmd: Command, program: &str, timeout: Option<Duration>) -> ToolStatus {
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return ToolStatus::failed(format!("failed to spawn {program}: {e}")),
    };

    let stderr_drain = child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok::<_, std::io::Error>(bytes)
        })
    });

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait(),
        Some(limit) => {
            let start = Instant::now();
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => break Ok(status),
                    Ok(None) if start.elapsed() >= limit => {
                        timed_out = true;
                        // The child may exit between try_wait and kill.
                        let _ = child.kill();
                        break child.wait();
                    }
                    Ok(None) => std::thread::sleep(POLL_INTERVAL),
                    Err(e) => break Err(e),
                }
            }
        }
    };

    let stderr = match stderr_drain.map(|h| h.join()) {
        Some(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Some(Ok(Err(e))) => format!("stderr read failed: {e}"),
        Some(Err(_)) => "stderr drain thread panicked".to_string(),
        None => String::new(),
    };

    match status {
        Err(e) => ToolStatus::failed(format!("failed to wait for {program}: {e}")),
        Ok(_) if timed_out => ToolStatus::failed(format!(
            "{program} killed after {}ms timeout{}{stderr}",
            timeout.map(|t| t.as_millis()).unwrap_or_default(),
            if stderr.is_empty() { "" } else { ": " },
        )),
        Ok(status) => ToolStatus {
            code: status.code(),
            diagnostics: stderr,
        },
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tools/process.rs"]
mod tests;
