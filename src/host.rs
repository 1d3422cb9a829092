//! Live host state through `systemctl` and `podman`.

use anyhow::{Context, Result};
use declarative::{
    ContainerInfo, HostStateManager, ImageInfo, NetworkInfo, ServiceOp, ServiceStatus, UnitState,
    VolumeInfo,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::runner;

/// Shells out to systemd and podman. `user_mode` targets the user's
/// systemd instance; podman is rootless for the same user either way.
pub struct SystemdHost {
    user_mode: bool,
}

impl SystemdHost {
    pub fn new(user_mode: bool) -> Self {
        Self { user_mode }
    }

    fn scope(&self) -> Vec<&'static str> {
        if self.user_mode {
            vec!["--user"]
        } else {
            Vec::new()
        }
    }

    fn systemctl_args<'a>(&self, rest: &[&'a str]) -> Vec<&'a str> {
        let mut args: Vec<&'a str> = self.scope();
        args.extend_from_slice(rest);
        args
    }

    fn podman_json<T: for<'de> Deserialize<'de>>(&self, args: &[&str]) -> Result<Vec<T>> {
        let output = runner::run_capture("podman", args)?;
        parse_json_list(&output)
            .with_context(|| format!("Unexpected output of podman {}", args.join(" ")))
    }

    /// Current value of a podman secret, if it exists.
    pub fn secret_value(&self, name: &str) -> Option<String> {
        runner::run_capture(
            "podman",
            &[
                "secret",
                "inspect",
                "--showsecret",
                "--format",
                "{{.SecretData}}",
                name,
            ],
        )
        .map_err(|e| log::debug!("secret {} not readable: {}", name, e))
        .ok()
    }
}

// ============================================================================
// podman JSON output
// ============================================================================

#[derive(Debug, Deserialize)]
struct PodmanVolume {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PodmanNetwork {
    #[serde(alias = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PodmanImage {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PodmanContainer {
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Image", default)]
    image: String,
}

/// podman prints `null` or nothing at all for empty lists
fn parse_json_list<T: for<'de> Deserialize<'de>>(output: &str) -> Result<Vec<T>> {
    let output = output.trim();
    if output.is_empty() || output == "null" {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(output)?)
}

/// Parse `systemctl show` output
fn parse_show(name: &str, output: &str) -> ServiceStatus {
    let mut status = ServiceStatus::missing(name);
    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "LoadState" if value == "not-found" => return ServiceStatus::missing(name),
            "ActiveState" => status.state = UnitState::from_systemd(value),
            "UnitFileState" => {
                status.enabled = matches!(value, "enabled" | "enabled-runtime");
            }
            _ => {}
        }
    }
    status
}

fn script_unit(component: &str, script: &str) -> String {
    let stem: String = script
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("materia-{}-{}", component, stem)
}

impl HostStateManager for SystemdHost {
    fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        let volumes: Vec<PodmanVolume> = self.podman_json(&["volume", "ls", "--format", "json"])?;
        Ok(volumes
            .into_iter()
            .map(|v| VolumeInfo { name: v.name })
            .collect())
    }

    fn list_networks(&self) -> Result<Vec<NetworkInfo>> {
        let networks: Vec<PodmanNetwork> =
            self.podman_json(&["network", "ls", "--format", "json"])?;
        Ok(networks
            .into_iter()
            .map(|n| NetworkInfo { name: n.name })
            .collect())
    }

    fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let images: Vec<PodmanImage> = self.podman_json(&["image", "ls", "--format", "json"])?;
        Ok(images
            .into_iter()
            .map(|i| ImageInfo {
                id: i.id,
                names: i.names.unwrap_or_default(),
            })
            .collect())
    }

    fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let containers: Vec<PodmanContainer> =
            self.podman_json(&["ps", "-a", "--format", "json"])?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                name: c.names.into_iter().next().unwrap_or_default(),
                image: c.image,
            })
            .collect())
    }

    fn get_service(&self, name: &str) -> Result<ServiceStatus> {
        let args = self.systemctl_args(&[
            "show",
            name,
            "--property=LoadState,ActiveState,UnitFileState",
        ]);
        let output = runner::run_capture("systemctl", &args)?;
        Ok(parse_show(name, &output))
    }

    fn apply_service(&self, name: &str, op: ServiceOp, timeout: Duration) -> Result<()> {
        // start-like jobs are queued; the executor waits for them afterwards
        let queued = matches!(op, ServiceOp::Start | ServiceOp::Restart | ServiceOp::Reload);
        let mut rest = Vec::new();
        if queued {
            rest.push("--no-block");
        }
        rest.extend([op.verb(), name]);
        let args = self.systemctl_args(&rest);
        runner::run_with_timeout("systemctl", &args, timeout)
    }

    fn daemon_reload(&self) -> Result<()> {
        let args = self.systemctl_args(&["daemon-reload"]);
        runner::run_checked("systemctl", &args)
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        runner::run_checked("podman", &["volume", "rm", name])
    }

    fn dump_volume(&self, name: &str, dest: &Path) -> Result<()> {
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        let dest = dest.to_string_lossy();
        runner::run_checked("podman", &["volume", "export", name, "--output", &dest])
    }

    fn import_volume(&self, name: &str, src: &Path) -> Result<()> {
        let src = src.to_string_lossy();
        runner::run_checked("podman", &["volume", "import", name, &src])
    }

    fn remove_network(&self, name: &str) -> Result<()> {
        runner::run_checked("podman", &["network", "rm", name])
    }

    fn remove_image(&self, name: &str) -> Result<()> {
        runner::run_checked("podman", &["image", "rm", name])
    }

    fn write_secret(&self, name: &str, value: &str) -> Result<()> {
        runner::run_with_input("podman", &["secret", "create", "--replace", name, "-"], value)
    }

    fn remove_secret(&self, name: &str) -> Result<()> {
        runner::run_checked("podman", &["secret", "rm", name])
    }

    fn run_script(
        &self,
        component: &str,
        script: &str,
        body: &str,
        timeout: Duration,
    ) -> Result<()> {
        let unit = format!("--unit={}", script_unit(component, script));
        let limit = format!("--property=RuntimeMaxSec={}", timeout.as_secs());
        let rest = [
            "--wait",
            "--collect",
            "--quiet",
            unit.as_str(),
            limit.as_str(),
            "/bin/sh",
            "-c",
            body,
        ];
        let mut args: Vec<&str> = self.scope();
        args.extend_from_slice(&rest);
        log::info!("running {} for {}", script, component);
        runner::run_checked("systemd-run", &args)
            .with_context(|| format!("{} of {} failed", script, component))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_show_running_enabled() {
        let status = parse_show(
            "hello.service",
            "LoadState=loaded\nActiveState=active\nUnitFileState=enabled\n",
        );
        assert_eq!(status.state, UnitState::Active);
        assert!(status.enabled);
    }

    #[test]
    fn test_parse_show_generated_unit() {
        let status = parse_show(
            "hello.service",
            "LoadState=loaded\nActiveState=activating\nUnitFileState=generated\n",
        );
        assert_eq!(status.state, UnitState::Activating);
        assert!(!status.enabled);
    }

    #[test]
    fn test_parse_show_missing_unit() {
        let status = parse_show(
            "gone.service",
            "LoadState=not-found\nActiveState=inactive\nUnitFileState=\n",
        );
        assert_eq!(status, ServiceStatus::missing("gone.service"));
    }

    #[test]
    fn test_parse_podman_lists() {
        let volumes: Vec<PodmanVolume> =
            parse_json_list(r#"[{"Name":"systemd-data","Driver":"local"}]"#).unwrap();
        assert_eq!(volumes[0].name, "systemd-data");

        let networks: Vec<PodmanNetwork> =
            parse_json_list(r#"[{"name":"podman","driver":"bridge"}]"#).unwrap();
        assert_eq!(networks[0].name, "podman");

        let images: Vec<PodmanImage> = parse_json_list(
            r#"[{"Id":"abc","Names":["localhost/web:latest"]},{"Id":"def","Names":null}]"#,
        )
        .unwrap();
        assert_eq!(images[0].names.as_deref(), Some(&["localhost/web:latest".to_string()][..]));
        assert!(images[1].names.is_none());

        let containers: Vec<PodmanContainer> =
            parse_json_list(r#"[{"Names":["web"],"Image":"localhost/web:latest"}]"#).unwrap();
        assert_eq!(containers[0].names, vec!["web"]);
    }

    #[test]
    fn test_empty_podman_output() {
        let none: Vec<PodmanVolume> = parse_json_list("").unwrap();
        assert!(none.is_empty());
        let none: Vec<PodmanVolume> = parse_json_list("null\n").unwrap();
        assert!(none.is_empty());
        assert!(parse_json_list::<PodmanVolume>("{oops").is_err());
    }

    #[test]
    fn test_script_unit_name() {
        assert_eq!(script_unit("db", "setup.sh"), "materia-db-setup-sh");
    }

    #[test]
    fn test_user_scope() {
        assert_eq!(
            SystemdHost::new(true).systemctl_args(&["daemon-reload"]),
            vec!["--user", "daemon-reload"]
        );
        assert_eq!(
            SystemdHost::new(false).systemctl_args(&["daemon-reload"]),
            vec!["daemon-reload"]
        );
    }
}
