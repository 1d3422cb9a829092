//! Resources owned by a component.
//!
//! A [`Resource`] is one thing a component puts on the host: a quadlet
//! unit, a plain file, a directory, a podman secret, or one of the
//! synthetic entries (the component itself, the host, a service).
//!
//! Resources are identified by their logical `path` inside the component.
//! Quadlet kinds also have a `host_object`: the name podman/systemd know
//! them by, resolved from the unit content.

use crate::error::{Error, Result};
use crate::quadlet::UnitFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Suffix marking a source file as a template.
pub const TEMPLATE_SUFFIX: &str = ".gotmpl";

/// File name of the component manifest.
pub const MANIFEST_FILE: &str = "MANIFEST.toml";

/// Kind of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// The component itself
    Component,
    /// Host-wide sentinel (daemon reloads)
    Host,
    Container,
    Volume,
    Pod,
    Network,
    Kube,
    Build,
    Image,
    /// Multi-document bundle that still needs expanding
    Combined,
    File,
    Manifest,
    Script,
    Directory,
    /// A systemd service
    Service,
    PodmanSecret,
}

impl ResourceType {
    /// All kinds, in declaration order.
    pub const ALL: [ResourceType; 16] = [
        Self::Component,
        Self::Host,
        Self::Container,
        Self::Volume,
        Self::Pod,
        Self::Network,
        Self::Kube,
        Self::Build,
        Self::Image,
        Self::Combined,
        Self::File,
        Self::Manifest,
        Self::Script,
        Self::Directory,
        Self::Service,
        Self::PodmanSecret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Host => "host",
            Self::Container => "container",
            Self::Volume => "volume",
            Self::Pod => "pod",
            Self::Network => "network",
            Self::Kube => "kube",
            Self::Build => "build",
            Self::Image => "image",
            Self::Combined => "combined",
            Self::File => "file",
            Self::Manifest => "manifest",
            Self::Script => "script",
            Self::Directory => "directory",
            Self::Service => "service",
            Self::PodmanSecret => "podmansecret",
        }
    }

    /// File extension for quadlet kinds.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Container => Some("container"),
            Self::Volume => Some("volume"),
            Self::Pod => Some("pod"),
            Self::Network => Some("network"),
            Self::Kube => Some("kube"),
            Self::Build => Some("build"),
            Self::Image => Some("image"),
            _ => None,
        }
    }

    /// Infer a kind from a (template-stripped) file path.
    pub fn from_path(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        if name == MANIFEST_FILE {
            return Self::Manifest;
        }

        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("container") => Self::Container,
            Some("volume") => Self::Volume,
            Some("pod") => Self::Pod,
            Some("network") => Self::Network,
            Some("kube") => Self::Kube,
            Some("build") => Self::Build,
            Some("image") => Self::Image,
            Some("sh") => Self::Script,
            _ => Self::File,
        }
    }

    /// Whether this kind is a quadlet unit expanded by the podman generator.
    pub fn is_quadlet(&self) -> bool {
        self.extension().is_some()
    }

    /// Whether resources of this kind carry a content body.
    ///
    /// Updates on these kinds must carry a diff.
    pub fn has_content(&self) -> bool {
        self.is_quadlet()
            || matches!(
                self,
                Self::Combined | Self::File | Self::Manifest | Self::Script | Self::PodmanSecret
            )
    }

    /// Whether this kind lives on disk as a regular file.
    pub fn is_file(&self) -> bool {
        self.has_content() && *self != Self::PodmanSecret
    }

    /// Unit group and key naming the host object, if the kind has one.
    pub fn host_object_key(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Container => Some(("Container", "ContainerName")),
            Self::Pod => Some(("Pod", "PodName")),
            Self::Network => Some(("Network", "NetworkName")),
            Self::Volume => Some(("Volume", "VolumeName")),
            Self::Build => Some(("Build", "ImageTag")),
            Self::Image => Some(("Image", "ImageTag")),
            _ => None,
        }
    }

    /// Suffix the podman generator appends to the unit basename.
    fn service_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Container | Self::Kube => Some(""),
            Self::Pod => Some("-pod"),
            Self::Volume => Some("-volume"),
            Self::Network => Some("-network"),
            Self::Build => Some("-build"),
            Self::Image => Some("-image"),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// One resource owned by a component.
///
/// `content` is never serialized: plans leave the host through JSON and
/// podman secret values must not travel with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Logical path relative to the component (empty for the host)
    pub path: String,
    /// Runtime identity, empty until resolved
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_object: String,
    /// Owning component name
    pub parent: String,
    pub kind: ResourceType,
    /// Content must be rendered before use
    #[serde(default)]
    pub template: bool,
    #[serde(skip)]
    pub content: String,
}

impl Resource {
    /// Create a resource of an explicit kind.
    pub fn new(parent: impl Into<String>, path: impl Into<String>, kind: ResourceType) -> Self {
        Self {
            path: path.into(),
            host_object: String::new(),
            parent: parent.into(),
            kind,
            template: false,
            content: String::new(),
        }
    }

    /// Create a resource from a source path, inferring its kind.
    ///
    /// A `.gotmpl` suffix marks the resource as a template and is dropped
    /// from the stored path.
    pub fn from_path(parent: impl Into<String>, path: &str) -> Self {
        let (path, template) = match path.strip_suffix(TEMPLATE_SUFFIX) {
            Some(stripped) => (stripped, true),
            None => (path, false),
        };
        let mut resource = Self::new(parent, path, ResourceType::from_path(path));
        resource.template = template;
        resource
    }

    /// The host sentinel, target of daemon reloads.
    pub fn host(root: &str) -> Self {
        Self::new(root, "", ResourceType::Host)
    }

    /// A systemd service owned by `parent`.
    pub fn service(parent: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut resource = Self::new(parent, name.clone(), ResourceType::Service);
        resource.host_object = name;
        resource
    }

    /// A podman secret owned by `parent`.
    pub fn secret(parent: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut resource = Self::new(parent, name.clone(), ResourceType::PodmanSecret);
        resource.host_object = name;
        resource
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_host_object(mut self, host_object: impl Into<String>) -> Self {
        self.host_object = host_object.into();
        self
    }

    /// Check the shape invariants.
    pub fn validate(&self) -> Result<()> {
        if self.kind == ResourceType::Host {
            if !self.path.is_empty() {
                return Err(Error::invalid_resource(
                    &self.path,
                    &self.parent,
                    "host resources must not have a path",
                ));
            }
            return Ok(());
        }

        if self.path.is_empty() {
            return Err(Error::invalid_resource(
                &self.path,
                &self.parent,
                "missing path",
            ));
        }
        if self.parent.is_empty() {
            return Err(Error::invalid_resource(
                &self.path,
                &self.parent,
                "missing parent component",
            ));
        }
        Ok(())
    }

    /// File name without directories or extension.
    pub fn basename(&self) -> &str {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        match self.kind.extension() {
            Some(ext) => name
                .strip_suffix(ext)
                .and_then(|n| n.strip_suffix('.'))
                .unwrap_or(name),
            None => name,
        }
    }

    pub fn is_quadlet(&self) -> bool {
        self.kind.is_quadlet()
    }

    /// Name of the systemd service the podman generator produces for this
    /// quadlet. `None` for non-quadlet kinds.
    pub fn backing_service(&self) -> Option<String> {
        self.kind
            .service_suffix()
            .map(|suffix| format!("{}{}.service", self.basename(), suffix))
    }

    /// Parse the unit content.
    pub fn unit(&self) -> Result<UnitFile> {
        UnitFile::parse(&self.path, &self.content)
    }

    /// Resolve `host_object` from the unit content.
    ///
    /// Falls back to `systemd-<basename>`; image units fall back to their
    /// raw `Image=` value first. Non-quadlet kinds are left untouched.
    pub fn resolve_host_object(&mut self) -> Result<()> {
        if !self.is_quadlet() {
            return Ok(());
        }

        let unit = self.unit()?;
        let named = self
            .kind
            .host_object_key()
            .and_then(|(group, key)| unit.get(group, key))
            .filter(|v| !v.is_empty());

        let resolved = match (named, self.kind) {
            (Some(name), _) => name.to_string(),
            (None, ResourceType::Image) => match unit.get("Image", "Image") {
                Some(image) if !image.is_empty() => image.to_string(),
                _ => format!("systemd-{}", self.basename()),
            },
            (None, _) => format!("systemd-{}", self.basename()),
        };

        log::trace!("resolved {} -> {}", self.path, resolved);
        self.host_object = resolved;
        Ok(())
    }

    /// For containers, the `.image`/`.build` unit named by `Image=`.
    pub fn image_unit(&self) -> Result<Option<String>> {
        if self.kind != ResourceType::Container {
            return Ok(None);
        }
        let unit = self.unit()?;
        Ok(unit
            .get("Container", "Image")
            .filter(|image| image.ends_with(".image") || image.ends_with(".build"))
            .map(str::to_string))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceType::Host => write!(f, "host"),
            ResourceType::Component => write!(f, "component {}", self.parent),
            _ => write!(f, "{} {}/{}", self.kind, self.parent, self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(ResourceType::from_path("hello.container"), ResourceType::Container);
        assert_eq!(ResourceType::from_path("data/db.volume"), ResourceType::Volume);
        assert_eq!(ResourceType::from_path("MANIFEST.toml"), ResourceType::Manifest);
        assert_eq!(ResourceType::from_path("setup.sh"), ResourceType::Script);
        assert_eq!(ResourceType::from_path("app.env"), ResourceType::File);
        assert_eq!(ResourceType::from_path("README"), ResourceType::File);
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ResourceType::ALL {
            assert_eq!(kind.as_str().parse::<ResourceType>().unwrap(), kind);
        }
        assert!("bogus".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_template_suffix_is_stripped() {
        let res = Resource::from_path("hello", "hello.container.gotmpl");
        assert_eq!(res.path, "hello.container");
        assert_eq!(res.kind, ResourceType::Container);
        assert!(res.template);
    }

    #[test]
    fn test_validate_shapes() {
        assert!(Resource::host("root").validate().is_ok());
        assert!(Resource::new("root", "x", ResourceType::Host).validate().is_err());
        assert!(Resource::new("hello", "", ResourceType::File).validate().is_err());
        assert!(Resource::new("", "a.env", ResourceType::File).validate().is_err());
        assert!(Resource::new("hello", "a.env", ResourceType::File).validate().is_ok());
    }

    #[test]
    fn test_host_object_from_named_key() {
        let mut res = Resource::from_path("hello", "hello.container")
            .with_content("[Container]\nImage=nginx\nContainerName=web\n");
        res.resolve_host_object().unwrap();
        assert_eq!(res.host_object, "web");
    }

    #[test]
    fn test_host_object_default() {
        let mut res = Resource::from_path("hello", "conf/data.volume").with_content("[Volume]\n");
        res.resolve_host_object().unwrap();
        assert_eq!(res.host_object, "systemd-data");
    }

    #[test]
    fn test_image_host_object_falls_back_to_image_value() {
        let mut res = Resource::from_path("hello", "nginx.image")
            .with_content("[Image]\nImage=docker.io/library/nginx:1.27\n");
        res.resolve_host_object().unwrap();
        assert_eq!(res.host_object, "docker.io/library/nginx:1.27");

        let mut tagged = Resource::from_path("hello", "nginx.image")
            .with_content("[Image]\nImage=docker.io/library/nginx\nImageTag=local/nginx\n");
        tagged.resolve_host_object().unwrap();
        assert_eq!(tagged.host_object, "local/nginx");
    }

    #[test]
    fn test_non_quadlet_host_object_untouched() {
        let mut res = Resource::from_path("hello", "app.env").with_content("A=1");
        res.resolve_host_object().unwrap();
        assert!(res.host_object.is_empty());
    }

    #[test]
    fn test_backing_service_names() {
        let cases = [
            ("web.container", "web.service"),
            ("app.kube", "app.service"),
            ("group.pod", "group-pod.service"),
            ("data.volume", "data-volume.service"),
            ("lan.network", "lan-network.service"),
            ("img.build", "img-build.service"),
            ("img.image", "img-image.service"),
        ];
        for (path, service) in cases {
            let res = Resource::from_path("c", path);
            assert_eq!(res.backing_service().as_deref(), Some(service), "{path}");
        }
        assert_eq!(Resource::from_path("c", "a.env").backing_service(), None);
    }

    #[test]
    fn test_image_unit_reference() {
        let res = Resource::from_path("c", "web.container")
            .with_content("[Container]\nImage=web.build\n");
        assert_eq!(res.image_unit().unwrap().as_deref(), Some("web.build"));

        let plain = Resource::from_path("c", "web.container")
            .with_content("[Container]\nImage=docker.io/nginx\n");
        assert_eq!(plain.image_unit().unwrap(), None);
    }

    #[test]
    fn test_content_is_not_serialized() {
        let res = Resource::secret("hello", "db_password").with_content("hunter2");
        let json = serde_json::to_string(&res).unwrap();
        assert!(!json.contains("hunter2"));
        let back: Resource = serde_json::from_str(&json).unwrap();
        assert_eq!(back.path, "db_password");
        assert_eq!(back.kind, ResourceType::PodmanSecret);
        assert!(back.content.is_empty());
    }
}
