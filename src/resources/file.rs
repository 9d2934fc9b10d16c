//! File resource - manage regular files and directories.
//!
//! Content comes from an inline string, a local source file, or a rendered
//! template. Metadata (mode, owner, group) is managed when declared. All
//! reads and writes flow through the transport.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::platform::Platform;
use crate::resource::{Action, Plan, Resource, StateMap};
use crate::template;
use crate::transport::{NullTransport, Transport, run_checked};

/// What the path should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEnsure {
    #[default]
    File,
    Directory,
    Absent,
}

/// File resource.
///
/// ```ignore
/// File::new("/etc/motd").content("Welcome!\n").mode(0o644)
/// File::new("/var/www/app").ensure(FileEnsure::Directory).owner("www-data")
/// ```
pub struct File {
    path: String,
    content: Option<String>,
    source: Option<PathBuf>,
    template: Option<PathBuf>,
    vars: BTreeMap<String, String>,
    ensure: FileEnsure,
    mode: Option<u32>,
    owner: Option<String>,
    group: Option<String>,
    transport: Arc<dyn Transport>,
}

impl File {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            source: None,
            template: None,
            vars: BTreeMap::new(),
            ensure: FileEnsure::File,
            mode: None,
            owner: None,
            group: None,
            transport: Arc::new(NullTransport),
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Read content from a local file at plan time.
    pub fn source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Render content from a local template with variable bindings.
    pub fn template(
        mut self,
        template: impl Into<PathBuf>,
        vars: BTreeMap<String, String>,
    ) -> Self {
        self.template = Some(template.into());
        self.vars = vars;
        self
    }

    pub fn ensure(mut self, ensure: FileEnsure) -> Self {
        self.ensure = ensure;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    fn desired_content(&self) -> Result<Option<String>> {
        if let Some(content) = &self.content {
            return Ok(Some(content.clone()));
        }
        if let Some(source) = &self.source {
            let content = std::fs::read_to_string(source)
                .with_context(|| format!("source file not found: {}", source.display()))?;
            return Ok(Some(content));
        }
        if let Some(path) = &self.template {
            return Ok(Some(template::render(path, &self.vars)?));
        }
        Ok(None)
    }

    fn create(&self) -> Result<()> {
        match self.ensure {
            FileEnsure::Directory => {
                run_checked(
                    &*self.transport,
                    &["mkdir", "-p", &self.path],
                    &format!("failed to create directory {}", self.path),
                )?;
            }
            FileEnsure::File => {
                if let Some(parent) = std::path::Path::new(&self.path).parent() {
                    let parent = parent.to_string_lossy();
                    if !parent.is_empty() {
                        run_checked(
                            &*self.transport,
                            &["mkdir", "-p", &parent],
                            &format!("failed to create parent directory for {}", self.path),
                        )?;
                    }
                }
                match self.desired_content()? {
                    Some(content) => self.transport.write_file(&self.path, content.as_bytes())?,
                    None => {
                        run_checked(
                            &*self.transport,
                            &["touch", &self.path],
                            &format!("failed to create {}", self.path),
                        )?;
                    }
                }
            }
            FileEnsure::Absent => {}
        }
        self.set_metadata()
    }

    fn update(&self, plan: &Plan) -> Result<()> {
        for change in &plan.changes {
            match change.field.as_str() {
                "content" => {
                    if let Some(content) = change.to.as_str() {
                        self.transport.write_file(&self.path, content.as_bytes())?;
                    }
                }
                "mode" => {
                    if let Some(mode) = self.mode {
                        self.chmod(mode)?;
                    }
                }
                "owner" | "group" => self.set_metadata()?,
                _ => {}
            }
        }
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        run_checked(
            &*self.transport,
            &["rm", "-rf", &self.path],
            &format!("failed to remove {}", self.path),
        )?;
        Ok(())
    }

    fn chmod(&self, mode: u32) -> Result<()> {
        let octal = format!("{mode:o}");
        run_checked(
            &*self.transport,
            &["chmod", &octal, &self.path],
            &format!("failed to chmod {}", self.path),
        )?;
        Ok(())
    }

    fn set_metadata(&self) -> Result<()> {
        match (&self.owner, &self.group) {
            (Some(owner), Some(group)) => {
                let spec = format!("{owner}:{group}");
                run_checked(
                    &*self.transport,
                    &["chown", &spec, &self.path],
                    &format!("failed to chown {}", self.path),
                )?;
            }
            (Some(owner), None) => {
                run_checked(
                    &*self.transport,
                    &["chown", owner, &self.path],
                    &format!("failed to chown {}", self.path),
                )?;
            }
            (None, Some(group)) => {
                run_checked(
                    &*self.transport,
                    &["chgrp", group, &self.path],
                    &format!("failed to chgrp {}", self.path),
                )?;
            }
            (None, None) => {}
        }
        if let Some(mode) = self.mode {
            self.chmod(mode)?;
        }
        Ok(())
    }
}

impl Resource for File {
    fn resource_type(&self) -> &'static str {
        "file"
    }

    fn name(&self) -> &str {
        &self.path
    }

    fn check(&self, _platform: &Platform) -> Result<StateMap> {
        let mut state = StateMap::new();
        state.insert("exists".to_string(), json!(false));
        for key in ["type", "content", "mode", "owner", "group", "size"] {
            state.insert(key.to_string(), Value::Null);
        }

        if !self.transport.file_exists(&self.path)? {
            return Ok(state);
        }
        state.insert("exists".to_string(), json!(true));

        // GNU stat first, BSD stat as the fallback.
        let (output, code) = self.transport.run_shell(&format!(
            "stat -c '%F|%a|%s|%U|%G' '{path}' 2>/dev/null || stat -f '%HT|%Lp|%z|%Su|%Sg' '{path}'",
            path = self.path
        ))?;

        if code == 0 {
            let parts: Vec<&str> = output.trim().split('|').collect();
            if parts.len() >= 5 {
                let file_type = parts[0].to_lowercase();
                if file_type.contains("regular") {
                    state.insert("type".to_string(), json!("file"));
                } else if file_type.contains("directory") {
                    state.insert("type".to_string(), json!("directory"));
                } else if file_type.contains("symbolic link") {
                    state.insert("type".to_string(), json!("symlink"));
                }

                if let Ok(mode) = u32::from_str_radix(parts[1], 8) {
                    state.insert("mode".to_string(), json!(format!("{mode:#o}")));
                }
                if let Ok(size) = parts[2].parse::<u64>() {
                    state.insert("size".to_string(), json!(size));
                }
                state.insert("owner".to_string(), json!(parts[3]));
                state.insert("group".to_string(), json!(parts[4]));
            }
        }

        if state.get("type") == Some(&json!("file")) {
            // Binary content stays null rather than decoded.
            if let Ok(bytes) = self.transport.read_file(&self.path) {
                if let Ok(content) = String::from_utf8(bytes) {
                    state.insert("content".to_string(), json!(content));
                }
            }
        }

        Ok(state)
    }

    fn desired_state(&self) -> Result<StateMap> {
        let mut state = StateMap::new();
        state.insert("exists".to_string(), json!(self.ensure != FileEnsure::Absent));
        state.insert(
            "type".to_string(),
            match self.ensure {
                FileEnsure::File => json!("file"),
                FileEnsure::Directory => json!("directory"),
                FileEnsure::Absent => Value::Null,
            },
        );

        if self.ensure == FileEnsure::Absent {
            return Ok(state);
        }

        state.insert(
            "content".to_string(),
            match self.desired_content()? {
                Some(content) => json!(content),
                None => Value::Null,
            },
        );
        if let Some(mode) = self.mode {
            state.insert("mode".to_string(), json!(format!("{mode:#o}")));
        }
        if let Some(owner) = &self.owner {
            state.insert("owner".to_string(), json!(owner));
        }
        if let Some(group) = &self.group {
            state.insert("group".to_string(), json!(group));
        }
        Ok(state)
    }

    fn apply(&self, plan: &Plan, _platform: &Platform) -> Result<()> {
        match plan.action {
            Action::Create => self.create(),
            Action::Update => self.update(plan),
            Action::Delete => self.delete(),
            Action::None => Ok(()),
        }
    }

    fn bind_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = transport;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::plan_resource;
    use crate::transport::MemoryTransport;

    fn platform() -> Platform {
        Platform {
            system: "Linux".to_string(),
            distro: "ubuntu".to_string(),
            version: "24.04".to_string(),
            arch: "x86_64".to_string(),
        }
    }

    fn with_transport(file: File, transport: &Arc<MemoryTransport>) -> File {
        let mut file = file;
        file.bind_transport(transport.clone());
        file
    }

    #[test]
    fn missing_file_plans_create_with_content_and_mode() {
        let transport = Arc::new(MemoryTransport::new());
        let file = with_transport(
            File::new("/tmp/seed-a.txt").content("hi\n").mode(0o644),
            &transport,
        );

        let planned = plan_resource(&file, &platform()).unwrap();
        assert_eq!(planned.plan.action, Action::Create);
        let fields: Vec<&str> = planned
            .plan
            .changes
            .iter()
            .map(|c| c.field.as_str())
            .collect();
        assert!(fields.contains(&"type"));
        assert!(fields.contains(&"content"));
        assert!(fields.contains(&"mode"));
        assert!(
            planned
                .plan
                .changes
                .iter()
                .any(|c| c.field == "mode" && c.to == json!("0o644"))
        );
    }

    #[test]
    fn create_writes_through_transport_and_sets_mode() {
        let transport = Arc::new(MemoryTransport::new());
        let file = with_transport(
            File::new("/tmp/seed-a.txt").content("hi\n").mode(0o644),
            &transport,
        );

        let planned = plan_resource(&file, &platform()).unwrap();
        file.apply(&planned.plan, &platform()).unwrap();

        assert_eq!(
            transport.file_content("/tmp/seed-a.txt").as_deref(),
            Some("hi\n")
        );
        assert!(transport.ran("mkdir -p /tmp"));
        assert!(transport.ran("chmod 644 /tmp/seed-a.txt"));
    }

    #[test]
    fn matching_file_plans_none() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/tmp/seed-a.txt", "hi\n");
        transport.respond("stat -c", "regular file|644|3|root|root\n", 0);

        let file = with_transport(
            File::new("/tmp/seed-a.txt").content("hi\n").mode(0o644),
            &transport,
        );

        let planned = plan_resource(&file, &platform()).unwrap();
        assert_eq!(planned.plan.action, Action::None);
    }

    #[test]
    fn changed_content_plans_update_and_rewrites() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/etc/motd", "old");
        transport.respond("stat -c", "regular file|644|3|root|root\n", 0);

        let file = with_transport(File::new("/etc/motd").content("new").mode(0o644), &transport);

        let planned = plan_resource(&file, &platform()).unwrap();
        assert_eq!(planned.plan.action, Action::Update);
        assert_eq!(planned.plan.changes.len(), 1);
        assert_eq!(planned.plan.changes[0].field, "content");

        file.apply(&planned.plan, &platform()).unwrap();
        assert_eq!(transport.file_content("/etc/motd").as_deref(), Some("new"));
    }

    #[test]
    fn absent_file_plans_delete_and_removes() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/tmp/stale", "x");
        transport.respond("stat -c", "regular file|644|1|root|root\n", 0);

        let file = with_transport(File::new("/tmp/stale").ensure(FileEnsure::Absent), &transport);

        let planned = plan_resource(&file, &platform()).unwrap();
        assert_eq!(planned.plan.action, Action::Delete);

        file.apply(&planned.plan, &platform()).unwrap();
        assert!(transport.ran("rm -rf /tmp/stale"));
    }

    #[test]
    fn directory_create_uses_mkdir() {
        let transport = Arc::new(MemoryTransport::new());
        let dir = with_transport(
            File::new("/var/www/app")
                .ensure(FileEnsure::Directory)
                .mode(0o755),
            &transport,
        );

        let planned = plan_resource(&dir, &platform()).unwrap();
        assert_eq!(planned.plan.action, Action::Create);
        dir.apply(&planned.plan, &platform()).unwrap();
        assert!(transport.ran("mkdir -p /var/www/app"));
        assert!(transport.ran("chmod 755 /var/www/app"));
    }

    #[test]
    fn binary_content_is_unavailable_not_decoded() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/bin/blob", vec![0xff, 0xfe, 0x00]);
        transport.respond("stat -c", "regular file|755|3|root|root\n", 0);

        let file = with_transport(File::new("/bin/blob"), &transport);
        let state = file.check(&platform()).unwrap();
        assert_eq!(state.get("content"), Some(&Value::Null));
        assert_eq!(state.get("exists"), Some(&json!(true)));
    }

    #[test]
    fn template_content_is_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let tmpl = dir.path().join("site.tmpl");
        std::fs::write(&tmpl, "host {{ domain }}").unwrap();

        let mut vars = BTreeMap::new();
        vars.insert("domain".to_string(), "example.com".to_string());

        let file = File::new("/etc/site.conf").template(tmpl, vars);
        let desired = file.desired_state().unwrap();
        assert_eq!(desired.get("content"), Some(&json!("host example.com")));
    }

    #[test]
    fn owner_and_group_flow_into_chown() {
        let transport = Arc::new(MemoryTransport::new());
        let file = with_transport(
            File::new("/var/www/index.html")
                .content("<h1>Hello</h1>")
                .owner("www-data")
                .group("www-data"),
            &transport,
        );

        let planned = plan_resource(&file, &platform()).unwrap();
        file.apply(&planned.plan, &platform()).unwrap();
        assert!(transport.ran("chown www-data:www-data /var/www/index.html"));
    }
}
