//! Package resource - install, remove, and upgrade system packages.
//!
//! The package manager is selected from the probed platform: Debian family
//! uses apt, RHEL family dnf, Arch pacman, macOS brew. Debian installs run
//! with the non-interactive frontend so nothing prompts mid-apply.

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::TendError;
use crate::platform::Platform;
use crate::resource::{Action, Plan, Resource, StateMap};
use crate::transport::{NullTransport, Transport, run_checked, run_shell_checked};

/// Desired package presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PkgEnsure {
    #[default]
    Present,
    Absent,
    Latest,
}

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Pacman,
    Brew,
}

impl PackageManager {
    /// Select the manager for a probed platform.
    pub fn detect(platform: &Platform, resource_id: &str) -> Result<Self> {
        match platform.distro.as_str() {
            "ubuntu" | "debian" => Ok(Self::Apt),
            "fedora" | "rhel" | "centos" => Ok(Self::Dnf),
            "arch" => Ok(Self::Pacman),
            _ if platform.is_macos() => Ok(Self::Brew),
            other => Err(TendError::UnsupportedPlatform {
                resource: resource_id.to_string(),
                distro: other.to_string(),
            }
            .into()),
        }
    }
}

/// Package resource.
///
/// ```ignore
/// Package::new("nginx")
/// Package::new("nginx").version("1.18.0-1ubuntu1")
/// Package::group("build-tools", ["gcc", "make", "autoconf"])
/// Package::new("apache2").ensure(PkgEnsure::Absent)
/// ```
pub struct Package {
    name: String,
    packages: Vec<String>,
    version: Option<String>,
    ensure: PkgEnsure,
    transport: Arc<dyn Transport>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            packages: vec![name.clone()],
            name,
            version: None,
            ensure: PkgEnsure::Present,
            transport: Arc::new(NullTransport),
        }
    }

    /// A named group managing several packages as one resource.
    pub fn group(
        name: impl Into<String>,
        packages: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            packages: packages.into_iter().map(Into::into).collect(),
            version: None,
            ensure: PkgEnsure::Present,
            transport: Arc::new(NullTransport),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn ensure(mut self, ensure: PkgEnsure) -> Self {
        self.ensure = ensure;
        self
    }

    fn installed_version(&self, pkg: &str, manager: PackageManager) -> Result<Option<String>> {
        match manager {
            PackageManager::Apt => {
                let (output, code) = self
                    .transport
                    .run_command(&["dpkg-query", "-W", "-f=${Version}", pkg])?;
                Ok((code == 0).then(|| output.trim().to_string()))
            }
            PackageManager::Dnf => {
                let (output, code) = self
                    .transport
                    .run_command(&["rpm", "-q", "--queryformat", "%{VERSION}", pkg])?;
                Ok((code == 0).then(|| output.trim().to_string()))
            }
            PackageManager::Pacman => {
                let (output, code) = self.transport.run_command(&["pacman", "-Q", pkg])?;
                if code != 0 {
                    return Ok(None);
                }
                // Output: "package-name version"
                Ok(output.split_whitespace().nth(1).map(str::to_string))
            }
            PackageManager::Brew => {
                let (output, code) = self
                    .transport
                    .run_command(&["brew", "list", "--versions", pkg])?;
                if code != 0 {
                    return Ok(None);
                }
                Ok(output.split_whitespace().nth(1).map(str::to_string))
            }
        }
    }

    fn install(&self, manager: PackageManager) -> Result<()> {
        let packages = self.packages.join(" ");
        match manager {
            PackageManager::Apt => {
                run_shell_checked(
                    &*self.transport,
                    &format!("DEBIAN_FRONTEND=noninteractive apt-get install -y {packages}"),
                    &format!("package installation failed for {}", self.id()),
                )?;
            }
            PackageManager::Dnf => {
                self.run_manager(&["dnf", "install", "-y"], "package installation failed")?;
            }
            PackageManager::Pacman => {
                self.run_manager(&["pacman", "-S", "--noconfirm"], "package installation failed")?;
            }
            PackageManager::Brew => {
                self.run_manager(&["brew", "install"], "package installation failed")?;
            }
        }
        Ok(())
    }

    fn remove(&self, manager: PackageManager) -> Result<()> {
        let packages = self.packages.join(" ");
        match manager {
            PackageManager::Apt => {
                run_shell_checked(
                    &*self.transport,
                    &format!("DEBIAN_FRONTEND=noninteractive apt-get remove -y {packages}"),
                    &format!("package removal failed for {}", self.id()),
                )?;
            }
            PackageManager::Dnf => {
                self.run_manager(&["dnf", "remove", "-y"], "package removal failed")?;
            }
            PackageManager::Pacman => {
                self.run_manager(&["pacman", "-R", "--noconfirm"], "package removal failed")?;
            }
            PackageManager::Brew => {
                self.run_manager(&["brew", "uninstall"], "package removal failed")?;
            }
        }
        Ok(())
    }

    fn run_manager(&self, base: &[&str], context: &str) -> Result<()> {
        let mut args: Vec<&str> = base.to_vec();
        args.extend(self.packages.iter().map(String::as_str));
        run_checked(
            &*self.transport,
            &args,
            &format!("{context} for {}", self.id()),
        )?;
        Ok(())
    }
}

impl Resource for Package {
    fn resource_type(&self) -> &'static str {
        "pkg"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, platform: &Platform) -> Result<StateMap> {
        let manager = PackageManager::detect(platform, &self.id())?;

        let mut installed = serde_json::Map::new();
        let mut all_installed = true;
        for pkg in &self.packages {
            let version = self.installed_version(pkg, manager)?;
            all_installed &= version.is_some();
            installed.insert(
                pkg.clone(),
                json!({ "installed": version.is_some(), "version": version }),
            );
        }

        let mut state = StateMap::new();
        state.insert("exists".to_string(), json!(all_installed));
        state.insert("packages".to_string(), json!(installed));
        Ok(state)
    }

    fn desired_state(&self) -> Result<StateMap> {
        let mut state = StateMap::new();
        state.insert(
            "exists".to_string(),
            json!(matches!(self.ensure, PkgEnsure::Present | PkgEnsure::Latest)),
        );
        state.insert("version".to_string(), json!(self.version));
        Ok(state)
    }

    fn apply(&self, plan: &Plan, platform: &Platform) -> Result<()> {
        let manager = PackageManager::detect(platform, &self.id())?;
        match plan.action {
            Action::Create => self.install(manager),
            Action::Delete => self.remove(manager),
            // Version pin or `latest`: reinstall through the manager.
            Action::Update => self.install(manager),
            Action::None => Ok(()),
        }
    }

    fn bind_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = transport;
    }
}
