//! Parser for quadlet unit files.
//!
//! Quadlets use the systemd unit syntax:
//! ```text
//! [Unit]
//! Description=Hello
//!
//! [Container]
//! Image=docker.io/library/nginx:latest
//! ContainerName=hello
//! PublishPort=8080:80
//! ```
//!
//! Only what the planner needs is kept: groups, keys and raw values.
//! Values are never interpreted here.

use crate::error::{Error, Result};

/// One `[Group]` section of a unit file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitGroup {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

/// A parsed unit file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFile {
    groups: Vec<UnitGroup>,
}

impl UnitFile {
    /// Parse unit content. `path` is only used for error messages.
    pub fn parse(path: &str, content: &str) -> Result<Self> {
        let mut unit = UnitFile::default();
        let mut pending: Option<(usize, String)> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line_num = idx + 1;

            // Continuation lines are glued onto the previous logical line
            let (start, line) = match pending.take() {
                Some((start, mut acc)) => {
                    acc.push(' ');
                    acc.push_str(raw.trim());
                    (start, acc)
                }
                None => (line_num, raw.trim().to_string()),
            };

            if let Some(stripped) = line.strip_suffix('\\') {
                pending = Some((start, stripped.trim_end().to_string()));
                continue;
            }

            unit.parse_line(path, start, &line)?;
        }

        if let Some((start, line)) = pending {
            unit.parse_line(path, start, &line)?;
        }

        Ok(unit)
    }

    fn parse_line(&mut self, path: &str, line_num: usize, line: &str) -> Result<()> {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            return Ok(());
        }

        if let Some(header) = line.strip_prefix('[') {
            let name = header.strip_suffix(']').ok_or_else(|| Error::UnitParse {
                path: path.to_string(),
                line: line_num,
                message: "unterminated group header".to_string(),
            })?;
            self.groups.push(UnitGroup {
                name: name.trim().to_string(),
                entries: Vec::new(),
            });
            return Ok(());
        }

        let (key, value) = line.split_once('=').ok_or_else(|| Error::UnitParse {
            path: path.to_string(),
            line: line_num,
            message: format!("expected Key=Value, got {line:?}"),
        })?;

        let group = self.groups.last_mut().ok_or_else(|| Error::UnitParse {
            path: path.to_string(),
            line: line_num,
            message: "entry outside of any group".to_string(),
        })?;
        group
            .entries
            .push((key.trim().to_string(), value.trim().to_string()));
        Ok(())
    }

    /// Last value of `key` in any `[group]` section.
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.get_all(group, key).last().copied()
    }

    /// Every value of `key` across all `[group]` sections, in file order.
    pub fn get_all(&self, group: &str, key: &str) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|g| g.name == group)
            .flat_map(|g| g.entries.iter())
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn groups(&self) -> &[UnitGroup] {
        &self.groups
    }
}
