//! # components
//!
//! Data model for quadlet-based host configuration.
//!
//! A host runs a set of named [`Component`]s. Each component owns a
//! [`ResourceSet`] (quadlet units, plain files, directories, scripts,
//! podman secrets) and a [`ServiceSet`] describing how its systemd
//! services should be handled.
//!
//! Two views of the same component exist while planning: the one loaded
//! from the host (what is installed) and the one loaded from the source
//! repository (what should be installed). Everything in this crate is
//! plain data; diffing and ordering live in the `declarative` crate.
//!
//! ## Example
//!
//! ```
//! use components::{Component, Resource};
//!
//! let mut hello = Component::new("hello");
//! hello
//!     .add_resource(
//!         Resource::from_path("hello", "hello.container")
//!             .with_content("[Container]\nImage=nginx\nContainerName=web\n"),
//!     )
//!     .unwrap();
//! hello.resolve_host_objects().unwrap();
//!
//! let unit = hello.resources.get("hello.container").unwrap();
//! assert_eq!(unit.host_object, "web");
//! assert_eq!(unit.backing_service().as_deref(), Some("hello.service"));
//! ```

pub mod component;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod quadlet;
pub mod resource;
pub mod resource_set;
pub mod service;
pub mod template;

pub use component::{CURRENT_COMPONENT_VERSION, Component, ComponentState, ROOT_COMPONENT};
pub use diff::{ContentDiff, DiffOp, DiffSpan};
pub use error::{Error, Result};
pub use manifest::{BackupSettings, ComponentManifest, ComponentSettings};
pub use quadlet::UnitFile;
pub use resource::{MANIFEST_FILE, Resource, ResourceType, TEMPLATE_SUFFIX};
pub use resource_set::ResourceSet;
pub use service::{ServiceResourceConfig, ServiceSet};
