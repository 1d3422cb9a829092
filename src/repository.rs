//! Components stored as directory trees.
//!
//! The source repository holds one directory per component under
//! `components/`, plus a repository `MANIFEST.toml` assigning components to
//! hosts. Installed components are split across two roots: quadlet units
//! under the quadlet root, everything else under the data root.

use anyhow::{Context, Result};
use components::{
    CURRENT_COMPONENT_VERSION, Component, ComponentManifest, MANIFEST_FILE, Resource,
    ResourceType, TEMPLATE_SUFFIX, template,
};
use declarative::{ComponentReader, ComponentWriter};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Marks a quadlet directory as ours
pub const MANAGED_MARKER: &str = ".materia_managed";

/// Schema version of an installed component
pub const VERSION_FILE: &str = ".component_version";

/// Directory of component trees inside the source repository
pub const COMPONENTS_DIR: &str = "components";

/// Looks up current podman secret values
pub trait SecretStore: Sync {
    fn secret_value(&self, name: &str) -> Option<String>;
}

impl SecretStore for crate::host::SystemdHost {
    fn secret_value(&self, name: &str) -> Option<String> {
        Self::secret_value(self, name)
    }
}

// ============================================================================
// Tree loading
// ============================================================================

fn is_bookkeeping(name: &str) -> bool {
    name == MANAGED_MARKER || name == VERSION_FILE
}

/// Path relative to `root`, always `/`-separated
fn relative(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn list_dirs(root: &Path) -> Result<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("Could not read {}", root.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Read `MANIFEST.toml` (or its template) from a component directory.
/// Returns the parsed manifest and the rendered text.
fn read_manifest(
    name: &str,
    dir: &Path,
    attributes: &BTreeMap<String, String>,
) -> Result<Option<(ComponentManifest, String)>> {
    let plain = dir.join(MANIFEST_FILE);
    let templated = dir.join(format!("{}{}", MANIFEST_FILE, TEMPLATE_SUFFIX));

    let content = if plain.is_file() {
        fs::read_to_string(&plain)?
    } else if templated.is_file() {
        let raw = fs::read_to_string(&templated)?;
        template::render(MANIFEST_FILE, &raw, &[attributes])?
    } else {
        return Ok(None);
    };
    let manifest = ComponentManifest::parse(name, &content)?;
    Ok(Some((manifest, content)))
}

/// Add every file and directory below `dir` to `component`.
fn load_tree(component: &mut Component, dir: &Path, scripts: &[String]) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Could not walk {}", dir.display()))?;
        let rel = relative(dir, entry.path())?;
        let file_name = entry.file_name().to_string_lossy();
        if is_bookkeeping(&file_name) {
            continue;
        }

        let resource = if entry.file_type().is_dir() {
            Resource::new(component.name.clone(), rel, ResourceType::Directory)
        } else {
            let mut resource = Resource::from_path(component.name.clone(), &rel);
            if resource.kind == ResourceType::Manifest {
                // added separately, already rendered
                continue;
            }
            if scripts.iter().any(|s| *s == resource.path) {
                resource.kind = ResourceType::Script;
            }
            let content = fs::read_to_string(entry.path())
                .with_context(|| format!("Could not read {}", entry.path().display()))?;
            resource.with_content(content)
        };

        if component.resources.contains(&resource.path) {
            continue;
        }
        component.add_resource(resource)?;
    }
    Ok(())
}

/// Build a component from its manifest and directory trees.
fn load_component(
    name: &str,
    dirs: &[PathBuf],
    attributes: &BTreeMap<String, String>,
    secret_value: impl Fn(&str) -> Result<String>,
) -> Result<Component> {
    let mut component = Component::new(name);
    let mut scripts = Vec::new();

    let manifest = dirs
        .iter()
        .map(|dir| read_manifest(name, dir, attributes))
        .find_map(|m| m.transpose())
        .transpose()?;
    let mut manifest_content = None;
    if let Some((manifest, content)) = manifest {
        component.apply_manifest(&manifest);
        scripts.clone_from(&manifest.scripts);
        for secret in &manifest.secrets {
            let value = secret_value(secret)?;
            component.add_resource(Resource::secret(name, secret.clone()).with_content(value))?;
        }
        manifest_content = Some(content);
    }

    for dir in dirs {
        load_tree(&mut component, dir, &scripts)?;
    }
    // the manifest installs after the units it describes
    if let Some(content) = manifest_content {
        component.add_resource(Resource::from_path(name, MANIFEST_FILE).with_content(content))?;
    }
    component
        .render_templates(attributes)
        .with_context(|| format!("Could not render {}", name))?;
    component.resolve_host_objects()?;
    component.validate()?;
    log::debug!("loaded {} ({} resources)", name, component.resources.len());
    Ok(component)
}

// ============================================================================
// Source repository
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RepoManifest {
    hosts: BTreeMap<String, HostAssignment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct HostAssignment {
    components: Vec<String>,
}

/// The checked-out repository describing every host
pub struct SourceRepository {
    root: PathBuf,
    attributes: BTreeMap<String, String>,
}

impl SourceRepository {
    pub fn new(root: impl Into<PathBuf>, attributes: BTreeMap<String, String>) -> Self {
        Self {
            root: root.into(),
            attributes,
        }
    }

    fn components_dir(&self) -> PathBuf {
        self.root.join(COMPONENTS_DIR)
    }

    /// Component names assigned to `hostname` by the repository manifest.
    pub fn assigned_names(&self, hostname: &str) -> Result<Vec<String>> {
        let path = self.root.join(MANIFEST_FILE);
        if !path.exists() {
            log::warn!("{} not found, no components assigned", path.display());
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let manifest: RepoManifest = toml::from_str(&content)
            .with_context(|| format!("Invalid repository manifest {}", path.display()))?;

        let Some(host) = manifest.hosts.get(hostname) else {
            log::info!("no components assigned to {}", hostname);
            return Ok(Vec::new());
        };
        let mut seen = BTreeSet::new();
        Ok(host
            .components
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect())
    }

    /// Load every component assigned to `hostname`.
    pub fn read_assigned(&self, hostname: &str) -> Result<Vec<Component>> {
        let available = self.list_components()?;
        self.assigned_names(hostname)?
            .iter()
            .map(|name| {
                if !available.contains(name) {
                    anyhow::bail!("{} is assigned to {} but not in the repository", name, hostname);
                }
                self.read_component(name)
            })
            .collect()
    }
}

impl ComponentReader for SourceRepository {
    fn list_components(&self) -> Result<Vec<String>> {
        list_dirs(&self.components_dir())
    }

    fn read_component(&self, name: &str) -> Result<Component> {
        let dir = self.components_dir().join(name);
        if !dir.is_dir() {
            anyhow::bail!("component {} not found in {}", name, self.root.display());
        }
        load_component(name, &[dir], &self.attributes, |secret| {
            self.attributes
                .get(secret)
                .cloned()
                .with_context(|| format!("no value for secret {} of {}", secret, name))
        })
        .with_context(|| format!("Could not load source component {}", name))
    }
}

// ============================================================================
// Host repository
// ============================================================================

/// Installed components
pub struct HostRepository<'a> {
    data: PathBuf,
    quadlets: PathBuf,
    secrets: Option<&'a dyn SecretStore>,
}

impl<'a> HostRepository<'a> {
    pub fn new(data: impl Into<PathBuf>, quadlets: impl Into<PathBuf>) -> Self {
        Self {
            data: data.into(),
            quadlets: quadlets.into(),
            secrets: None,
        }
    }

    /// Read secret values back from the host so unchanged secrets compare
    /// equal. Without a store they load empty.
    pub fn with_secrets(mut self, secrets: &'a dyn SecretStore) -> Self {
        self.secrets = Some(secrets);
        self
    }

    fn data_dir(&self, name: &str) -> PathBuf {
        self.data.join(name)
    }

    fn quadlet_dir(&self, name: &str) -> PathBuf {
        self.quadlets.join(name)
    }

    fn is_managed(&self, name: &str) -> bool {
        self.quadlet_dir(name).join(MANAGED_MARKER).is_file()
    }

    fn resource_path(&self, component: &str, resource: &Resource) -> PathBuf {
        let root = if resource.is_quadlet() {
            self.quadlet_dir(component)
        } else {
            self.data_dir(component)
        };
        root.join(&resource.path)
    }

    fn read_version(&self, name: &str) -> Result<u32> {
        let path = self.data_dir(name).join(VERSION_FILE);
        match fs::read_to_string(&path) {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid version in {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e).with_context(|| format!("Could not read {}", path.display())),
        }
    }

    fn write_version(&self, name: &str) -> Result<()> {
        let dir = self.data_dir(name);
        fs::create_dir_all(&dir).with_context(|| format!("Could not create {}", dir.display()))?;
        fs::write(dir.join(VERSION_FILE), format!("{}\n", CURRENT_COMPONENT_VERSION))?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Could not remove {}", path.display())),
    }
}

impl ComponentReader for HostRepository<'_> {
    fn list_components(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = list_dirs(&self.data)?.into_iter().collect();
        for name in list_dirs(&self.quadlets)? {
            if self.is_managed(&name) {
                names.insert(name);
            } else {
                log::debug!("skipping unmanaged quadlet directory {}", name);
            }
        }
        Ok(names.into_iter().collect())
    }

    fn read_component(&self, name: &str) -> Result<Component> {
        let mut dirs = vec![self.data_dir(name)];
        if self.is_managed(name) {
            dirs.push(self.quadlet_dir(name));
        }
        let mut component = load_component(name, &dirs, &BTreeMap::new(), |secret| {
            Ok(self
                .secrets
                .and_then(|store| store.secret_value(secret))
                .unwrap_or_default())
        })
        .with_context(|| format!("Could not load installed component {}", name))?;
        component.version = self.read_version(name)?;
        Ok(component)
    }
}

impl ComponentWriter for HostRepository<'_> {
    fn install_component(&self, component: &Component) -> Result<()> {
        self.write_version(&component.name)?;
        let quadlets = self.quadlet_dir(&component.name);
        fs::create_dir_all(&quadlets)
            .with_context(|| format!("Could not create {}", quadlets.display()))?;
        fs::write(quadlets.join(MANAGED_MARKER), "")?;
        Ok(())
    }

    fn update_component(&self, component: &Component) -> Result<()> {
        self.write_version(&component.name)
    }

    fn remove_component(&self, component: &Component) -> Result<()> {
        remove_if_exists(&self.quadlet_dir(&component.name))?;
        remove_if_exists(&self.data_dir(&component.name))
    }

    fn install_resource(&self, component: &Component, resource: &Resource) -> Result<()> {
        let path = self.resource_path(&component.name, resource);
        if resource.kind == ResourceType::Directory {
            fs::create_dir_all(&path)
                .with_context(|| format!("Could not create {}", path.display()))?;
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        fs::write(&path, &resource.content)
            .with_context(|| format!("Could not write {}", path.display()))
    }

    fn remove_resource(&self, component: &Component, resource: &Resource) -> Result<()> {
        if resource.kind == ResourceType::Directory {
            remove_if_exists(&self.data_dir(&component.name).join(&resource.path))?;
            return remove_if_exists(&self.quadlet_dir(&component.name).join(&resource.path));
        }
        remove_if_exists(&self.resource_path(&component.name, resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_UNIT: &str = "[Container]\nImage=docker.io/library/nginx:{{ .tag }}\n";
    const HELLO_MANIFEST: &str = r#"
Secrets = ["db_password"]

[Defaults]
tag = "latest"

[[Services]]
Service = "hello.service"
"#;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn source_repo(dir: &TempDir) -> SourceRepository {
        let root = dir.path();
        write(
            &root.join("MANIFEST.toml"),
            "[Hosts.box01]\nComponents = [\"hello\", \"hello\"]\n",
        );
        let hello = root.join("components/hello");
        write(&hello.join("MANIFEST.toml"), HELLO_MANIFEST);
        write(&hello.join("hello.container.gotmpl"), HELLO_UNIT);
        write(&hello.join("conf/site.conf"), "listen 80;\n");
        write(&root.join("components/other/other.env"), "A=1\n");

        let mut attributes = BTreeMap::new();
        attributes.insert("db_password".to_string(), "hunter2".to_string());
        SourceRepository::new(root, attributes)
    }

    #[test]
    fn test_source_assignment() {
        let dir = TempDir::new().unwrap();
        let repo = source_repo(&dir);
        assert_eq!(repo.list_components().unwrap(), vec!["hello", "other"]);
        assert_eq!(repo.assigned_names("box01").unwrap(), vec!["hello"]);
        assert!(repo.assigned_names("box02").unwrap().is_empty());
    }

    #[test]
    fn test_source_component_is_rendered() {
        let dir = TempDir::new().unwrap();
        let repo = source_repo(&dir);
        let hello = repo.read_component("hello").unwrap();

        let unit = hello.resources.get("hello.container").unwrap();
        assert_eq!(unit.content, "[Container]\nImage=docker.io/library/nginx:latest\n");
        assert_eq!(unit.host_object, "systemd-hello");
        assert!(!unit.template);

        assert_eq!(
            hello.resources.get("conf").unwrap().kind,
            ResourceType::Directory
        );
        assert_eq!(
            hello.resources.get("conf/site.conf").unwrap().kind,
            ResourceType::File
        );
        let secret = hello.resources.get("db_password").unwrap();
        assert_eq!(secret.kind, ResourceType::PodmanSecret);
        assert_eq!(secret.content, "hunter2");
        assert!(hello.services.contains("hello.service"));
        assert_eq!(hello.version, CURRENT_COMPONENT_VERSION);
    }

    #[test]
    fn test_manifest_loads_after_units() {
        let dir = TempDir::new().unwrap();
        let hello = source_repo(&dir).read_component("hello").unwrap();
        let paths: Vec<&str> = hello.resources.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths.last(), Some(&MANIFEST_FILE));
        let unit = paths.iter().position(|p| *p == "hello.container").unwrap();
        assert!(unit < paths.len() - 1);
    }

    #[test]
    fn test_missing_secret_value_is_an_error() {
        let dir = TempDir::new().unwrap();
        let repo = SourceRepository::new(source_repo(&dir).root, BTreeMap::new());
        let err = repo.read_component("hello").unwrap_err();
        assert!(format!("{:#}", err).contains("db_password"));
    }

    #[test]
    fn test_unknown_assignment_is_an_error() {
        let dir = TempDir::new().unwrap();
        let repo = source_repo(&dir);
        write(
            &dir.path().join("MANIFEST.toml"),
            "[Hosts.box01]\nComponents = [\"ghost\"]\n",
        );
        assert!(repo.read_assigned("box01").is_err());
    }

    #[test]
    fn test_host_round_trip() {
        let src_dir = TempDir::new().unwrap();
        let hello = source_repo(&src_dir).read_component("hello").unwrap();

        let host_dir = TempDir::new().unwrap();
        let host = HostRepository::new(host_dir.path().join("data"), host_dir.path().join("quadlets"));
        host.install_component(&hello).unwrap();
        for resource in hello.resources.iter() {
            if resource.kind != ResourceType::PodmanSecret {
                host.install_resource(&hello, resource).unwrap();
            }
        }

        assert!(host_dir.path().join("quadlets/hello/hello.container").is_file());
        assert!(host_dir.path().join("quadlets/hello/.materia_managed").is_file());
        assert!(host_dir.path().join("data/hello/MANIFEST.toml").is_file());
        assert!(host_dir.path().join("data/hello/conf/site.conf").is_file());

        assert_eq!(host.list_components().unwrap(), vec!["hello"]);
        let installed = host.read_component("hello").unwrap();
        assert_eq!(installed.version, CURRENT_COMPONENT_VERSION);
        assert_eq!(
            installed.resources.get("hello.container").unwrap().content,
            hello.resources.get("hello.container").unwrap().content
        );
        // without a secret store, secrets load empty
        assert_eq!(installed.resources.get("db_password").unwrap().content, "");

        host.remove_component(&installed).unwrap();
        assert!(host.list_components().unwrap().is_empty());
    }

    #[test]
    fn test_host_secrets_come_from_store() {
        struct Fixed;
        impl SecretStore for Fixed {
            fn secret_value(&self, name: &str) -> Option<String> {
                (name == "db_password").then(|| "hunter2".to_string())
            }
        }

        let host_dir = TempDir::new().unwrap();
        write(&host_dir.path().join("data/hello/MANIFEST.toml"), HELLO_MANIFEST);
        let store = Fixed;
        let host = HostRepository::new(host_dir.path().join("data"), host_dir.path().join("q"))
            .with_secrets(&store);
        let installed = host.read_component("hello").unwrap();
        assert_eq!(installed.resources.get("db_password").unwrap().content, "hunter2");
        // no version marker yet
        assert_eq!(installed.version, 0);
    }

    #[test]
    fn test_unmanaged_quadlet_dirs_are_ignored() {
        let host_dir = TempDir::new().unwrap();
        write(
            &host_dir.path().join("quadlets/foreign/x.container"),
            "[Container]\nImage=x\n",
        );
        let host = HostRepository::new(host_dir.path().join("data"), host_dir.path().join("quadlets"));
        assert!(host.list_components().unwrap().is_empty());
    }

    #[test]
    fn test_remove_resource_tolerates_missing_files() {
        let host_dir = TempDir::new().unwrap();
        let host = HostRepository::new(host_dir.path().join("data"), host_dir.path().join("quadlets"));
        let app = Component::new("app");
        let env = Resource::from_path("app", "app.env");
        host.remove_resource(&app, &env).unwrap();

        host.install_resource(&app, &env.clone().with_content("A=1\n")).unwrap();
        assert!(host_dir.path().join("data/app/app.env").is_file());
        host.remove_resource(&app, &env).unwrap();
        assert!(!host_dir.path().join("data/app/app.env").exists());
    }
}
