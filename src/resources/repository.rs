//! Repository resource - package-manager sources, cache refresh, and
//! full upgrades.
//!
//! Three actions share one resource type:
//! - `update`: refresh package metadata when the local cache is stale.
//! - `upgrade`: upgrade all installed packages when any are upgradable.
//! - `add`: declare a source (Debian repo line, PPA shorthand, or brew tap),
//!   optionally with a signing key.
//!
//! For update/upgrade the desired state declares "nothing pending", so a
//! stale cache or a non-empty upgradable set surfaces as a change in a
//! read-only plan.

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::error::TendError;
use crate::platform::Platform;
use crate::resource::{Action, Plan, Resource, StateMap};
use crate::resources::pkg::PackageManager;
use crate::transport::{NullTransport, Transport, run_checked, run_shell_checked};

/// Cache is considered fresh for this long.
const CACHE_FRESH_SECS: i64 = 3600;

/// What a repository resource does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoAction {
    #[default]
    Add,
    Update,
    Upgrade,
}

/// Presence of an added source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoEnsure {
    #[default]
    Present,
    Absent,
}

/// Options for a [`Repository`] resource with action `add`.
#[derive(Debug, Clone, Default)]
pub struct RepositoryOptions {
    /// Repository line (e.g. `deb https://... stable main`), or a dnf baseurl.
    pub repo: Option<String>,
    /// URL to a GPG signing key.
    pub key_url: Option<String>,
    /// GPG key id fetched from the key server.
    pub key_id: Option<String>,
    /// Key server for `key_id`. Defaults to keyserver.ubuntu.com.
    pub key_server: Option<String>,
    /// Personal-archive shorthand (`ppa:user/name`).
    pub ppa: Option<String>,
    /// Homebrew tap (`user/repo`).
    pub tap: Option<String>,
    /// Filename for the sources fragment. Defaults to `<name>.list`.
    pub filename: Option<String>,
    pub ensure: RepoEnsure,
}

/// Repository resource.
///
/// ```ignore
/// Repository::new("apt-update", RepoAction::Update, Default::default())?
/// Repository::new("nodesource", RepoAction::Add, RepositoryOptions {
///     repo: Some("deb https://deb.nodesource.com/node_20.x nodistro main".into()),
///     key_url: Some("https://deb.nodesource.com/gpgkey/nodesource.gpg.key".into()),
///     ..Default::default()
/// })?
/// ```
pub struct Repository {
    name: String,
    action: RepoAction,
    repo: Option<String>,
    key_url: Option<String>,
    key_id: Option<String>,
    key_server: String,
    ppa: Option<String>,
    tap: Option<String>,
    filename: String,
    ensure: RepoEnsure,
    transport: Arc<dyn Transport>,
}

impl Repository {
    /// Validate and construct. `add` needs a source; the other actions
    /// reject stray source attributes silently (they are simply unused).
    pub fn new(
        name: impl Into<String>,
        action: RepoAction,
        options: RepositoryOptions,
    ) -> Result<Self> {
        let name = name.into();

        if action == RepoAction::Add
            && options.repo.is_none()
            && options.ppa.is_none()
            && options.tap.is_none()
        {
            return Err(TendError::Validation {
                resource: format!("repository:{name}"),
                message: "action 'add' requires one of: repo, ppa, or tap".to_string(),
            }
            .into());
        }

        let filename = options.filename.unwrap_or_else(|| format!("{name}.list"));
        Ok(Self {
            action,
            repo: options.repo,
            key_url: options.key_url,
            key_id: options.key_id,
            key_server: options
                .key_server
                .unwrap_or_else(|| "keyserver.ubuntu.com".to_string()),
            ppa: options.ppa,
            tap: options.tap,
            filename,
            ensure: options.ensure,
            name,
            transport: Arc::new(NullTransport),
        })
    }

    fn cache_age_state(&self, stamp_file: &str) -> Result<StateMap> {
        let mut state = StateMap::new();
        state.insert("exists".to_string(), json!(true));

        if self.transport.file_exists(stamp_file)? {
            let (output, code) = self.transport.run_shell(&format!(
                "echo $(($(date +%s) - $(stat -c %Y {stamp_file})))"
            ))?;
            if code == 0 {
                if let Ok(age) = output.trim().parse::<i64>() {
                    state.insert("needs_update".to_string(), json!(age > CACHE_FRESH_SECS));
                    state.insert("cache_age_seconds".to_string(), json!(age));
                    return Ok(state);
                }
            }
        }

        // Missing stamp or unreadable age: refresh.
        state.insert("needs_update".to_string(), json!(true));
        Ok(state)
    }

    fn check_update(&self, manager: PackageManager) -> Result<StateMap> {
        match manager {
            PackageManager::Apt => {
                self.cache_age_state("/var/lib/apt/periodic/update-success-stamp")
            }
            PackageManager::Pacman => self.cache_age_state("/var/lib/pacman/sync/core.db"),
            // dnf metadata checks are cheap and brew update is always advised.
            PackageManager::Dnf | PackageManager::Brew => {
                let mut state = StateMap::new();
                state.insert("exists".to_string(), json!(true));
                state.insert("needs_update".to_string(), json!(true));
                Ok(state)
            }
        }
    }

    fn check_upgrade(&self, manager: PackageManager) -> Result<StateMap> {
        let command = match manager {
            PackageManager::Apt => "apt list --upgradable 2>/dev/null | grep -vc 'Listing'",
            PackageManager::Dnf => "dnf check-update --quiet | wc -l",
            PackageManager::Pacman => "pacman -Qu | wc -l",
            PackageManager::Brew => "brew outdated | wc -l",
        };
        let (output, _) = self.transport.run_shell(command)?;
        let upgradable: i64 = output.trim().parse().unwrap_or(0);

        let mut state = StateMap::new();
        state.insert("exists".to_string(), json!(true));
        state.insert("needs_upgrade".to_string(), json!(upgradable > 0));
        state.insert("upgradable_count".to_string(), json!(upgradable));
        Ok(state)
    }

    /// Observe an added source. The key set mirrors [`Repository::desired_state`]
    /// for `add` so a converged source plans no changes: `repo_line` reports
    /// the declared line once its (codename-expanded) form is found on disk.
    fn check_source(&self, manager: PackageManager, platform: &Platform) -> Result<StateMap> {
        let mut state = StateMap::new();
        let mut has_key = false;

        let exists = match manager {
            PackageManager::Apt => {
                has_key = self.transport.file_exists(&self.trusted_key_path())?;
                if let Some(ppa) = &self.ppa {
                    let ppa_name = ppa.trim_start_matches("ppa:").replace('/', "-");
                    let (output, code) = self.transport.run_shell(&format!(
                        "ls /etc/apt/sources.list.d/{ppa_name}-*.list 2>/dev/null"
                    ))?;
                    state.insert(
                        "source_file".to_string(),
                        if code == 0 {
                            json!(output.trim())
                        } else {
                            json!(null)
                        },
                    );
                    code == 0
                } else {
                    let source_file = format!("/etc/apt/sources.list.d/{}", self.filename);
                    state.insert("source_file".to_string(), json!(source_file));
                    if !self.transport.file_exists(&source_file)? {
                        false
                    } else if let Some(repo) = &self.repo {
                        let content =
                            String::from_utf8_lossy(&self.transport.read_file(&source_file)?)
                                .into_owned();
                        let expanded = self.expand_repo_vars(repo, platform)?;
                        content.contains(&expanded)
                    } else {
                        true
                    }
                }
            }
            PackageManager::Dnf => {
                let repo_file = format!("/etc/yum.repos.d/{}.repo", self.name);
                state.insert("repo_file".to_string(), json!(repo_file.clone()));
                if self.transport.file_exists(&repo_file)? {
                    let content =
                        String::from_utf8_lossy(&self.transport.read_file(&repo_file)?)
                            .into_owned();
                    has_key = content.contains("gpgkey=");
                    true
                } else {
                    false
                }
            }
            PackageManager::Pacman => {
                if self.transport.file_exists("/etc/pacman.conf")? {
                    let content =
                        String::from_utf8_lossy(&self.transport.read_file("/etc/pacman.conf")?)
                            .into_owned();
                    content.contains(&format!("[{}]", self.name))
                } else {
                    false
                }
            }
            PackageManager::Brew => {
                state.insert("tap".to_string(), json!(self.tap));
                if let Some(tap) = &self.tap {
                    let (output, _) = self.transport.run_command(&["brew", "tap"])?;
                    output.lines().any(|line| line.trim() == tap)
                } else {
                    false
                }
            }
        };

        state.insert("exists".to_string(), json!(exists));
        state.insert(
            "repo_line".to_string(),
            if exists { json!(self.repo) } else { json!(null) },
        );
        state.insert("has_key".to_string(), json!(has_key));
        Ok(state)
    }

    fn do_update(&self, manager: PackageManager) -> Result<()> {
        info!(repository = %self.name, manager = ?manager, "refreshing package cache");
        match manager {
            PackageManager::Apt => {
                run_shell_checked(
                    &*self.transport,
                    "DEBIAN_FRONTEND=noninteractive apt-get update -y",
                    "apt-get update failed",
                )?;
            }
            PackageManager::Dnf => {
                // Exit 100 means updates are available, which is fine here.
                let (output, code) = self.transport.run_command(&["dnf", "check-update", "-y"])?;
                if code != 0 && code != 100 {
                    return Err(TendError::CommandFailed {
                        context: "dnf check-update failed".to_string(),
                        code,
                        output,
                    }
                    .into());
                }
            }
            PackageManager::Pacman => {
                run_checked(&*self.transport, &["pacman", "-Sy"], "pacman -Sy failed")?;
            }
            PackageManager::Brew => {
                run_checked(&*self.transport, &["brew", "update"], "brew update failed")?;
            }
        }
        Ok(())
    }

    fn do_upgrade(&self, manager: PackageManager) -> Result<()> {
        info!(repository = %self.name, manager = ?manager, "upgrading packages");
        match manager {
            PackageManager::Apt => {
                run_shell_checked(
                    &*self.transport,
                    "DEBIAN_FRONTEND=noninteractive apt-get upgrade -y",
                    "apt-get upgrade failed",
                )?;
            }
            PackageManager::Dnf => {
                run_checked(
                    &*self.transport,
                    &["dnf", "upgrade", "-y"],
                    "dnf upgrade failed",
                )?;
            }
            PackageManager::Pacman => {
                run_checked(
                    &*self.transport,
                    &["pacman", "-Su", "--noconfirm"],
                    "pacman -Su failed",
                )?;
            }
            PackageManager::Brew => {
                run_checked(&*self.transport, &["brew", "upgrade"], "brew upgrade failed")?;
            }
        }
        Ok(())
    }

    fn add_source(&self, manager: PackageManager, platform: &Platform) -> Result<()> {
        info!(repository = %self.name, "adding repository");
        match manager {
            PackageManager::Apt => {
                if let Some(ppa) = &self.ppa {
                    run_shell_checked(
                        &*self.transport,
                        &format!("DEBIAN_FRONTEND=noninteractive add-apt-repository -y {ppa}"),
                        &format!("failed to add PPA {ppa}"),
                    )?;
                    return Ok(());
                }

                if let Some(key_url) = &self.key_url {
                    self.add_apt_key_from_url(key_url)?;
                } else if let Some(key_id) = &self.key_id {
                    self.add_apt_key_from_keyserver(key_id)?;
                }

                let repo = self.repo.as_deref().unwrap_or_default();
                let expanded = self.expand_repo_vars(repo, platform)?;
                let source_file = format!("/etc/apt/sources.list.d/{}", self.filename);
                let content = format!("# {}\n{expanded}\n", self.name);
                self.transport.write_file(&source_file, content.as_bytes())?;
                info!(repository = %self.name, file = %source_file, "repository source written");
            }
            PackageManager::Dnf => {
                let repo_file = format!("/etc/yum.repos.d/{}.repo", self.name);
                self.transport
                    .write_file(&repo_file, self.dnf_repo_file().as_bytes())?;
            }
            PackageManager::Pacman => {
                if let Some(repo) = &self.repo {
                    let block = format!("\\n[{}]\\n{repo}\\n", self.name);
                    run_shell_checked(
                        &*self.transport,
                        &format!("printf '{block}' >> /etc/pacman.conf"),
                        "failed to append pacman repository",
                    )?;
                }
            }
            PackageManager::Brew => {
                if let Some(tap) = &self.tap {
                    run_checked(
                        &*self.transport,
                        &["brew", "tap", tap],
                        &format!("failed to add tap {tap}"),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn remove_source(&self, manager: PackageManager) -> Result<()> {
        info!(repository = %self.name, "removing repository");
        match manager {
            PackageManager::Apt => {
                if let Some(ppa) = &self.ppa {
                    run_shell_checked(
                        &*self.transport,
                        &format!(
                            "DEBIAN_FRONTEND=noninteractive add-apt-repository --remove -y {ppa}"
                        ),
                        &format!("failed to remove PPA {ppa}"),
                    )?;
                } else {
                    let source_file = format!("/etc/apt/sources.list.d/{}", self.filename);
                    run_checked(
                        &*self.transport,
                        &["rm", "-f", &source_file],
                        "failed to remove repository source",
                    )?;
                }
            }
            PackageManager::Dnf => {
                let repo_file = format!("/etc/yum.repos.d/{}.repo", self.name);
                run_checked(
                    &*self.transport,
                    &["rm", "-f", &repo_file],
                    "failed to remove repository definition",
                )?;
            }
            PackageManager::Pacman => {}
            PackageManager::Brew => {
                if let Some(tap) = &self.tap {
                    run_checked(
                        &*self.transport,
                        &["brew", "untap", tap],
                        &format!("failed to remove tap {tap}"),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn trusted_key_path(&self) -> String {
        format!("/etc/apt/trusted.gpg.d/{}.gpg", self.name)
    }

    fn add_apt_key_from_url(&self, key_url: &str) -> Result<()> {
        let key_path = self.trusted_key_path();
        run_shell_checked(
            &*self.transport,
            &format!("curl -fsSL {key_url} | gpg --dearmor -o {key_path}"),
            "failed to fetch GPG key",
        )?;
        info!(repository = %self.name, key = %key_path, "GPG key installed");
        Ok(())
    }

    fn add_apt_key_from_keyserver(&self, key_id: &str) -> Result<()> {
        let key_path = self.trusted_key_path();
        run_shell_checked(
            &*self.transport,
            &format!(
                "gpg --keyserver {server} --recv-keys {key_id} && gpg --export {key_id} > {key_path}",
                server = self.key_server
            ),
            "failed to fetch GPG key from keyserver",
        )?;
        info!(repository = %self.name, key_id = %key_id, "GPG key installed");
        Ok(())
    }

    /// Substitute the release codename where the standard placeholder
    /// appears in a Debian repository line.
    fn expand_repo_vars(&self, repo_line: &str, _platform: &Platform) -> Result<String> {
        const PLACEHOLDER: &str = "$(lsb_release -cs)";
        if !repo_line.contains(PLACEHOLDER) {
            return Ok(repo_line.to_string());
        }
        let (output, code) = self.transport.run_shell("lsb_release -cs")?;
        if code != 0 {
            return Ok(repo_line.to_string());
        }
        Ok(repo_line.replace(PLACEHOLDER, output.trim()))
    }

    fn dnf_repo_file(&self) -> String {
        let mut content = format!("[{name}]\nname={name}\n", name = self.name);
        if let Some(repo) = &self.repo {
            content.push_str(&format!("baseurl={repo}\n"));
        }
        if let Some(key_url) = &self.key_url {
            content.push_str(&format!("gpgkey={key_url}\ngpgcheck=1\n"));
        } else {
            content.push_str("gpgcheck=0\n");
        }
        content.push_str("enabled=1\n");
        content
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

impl Resource for Repository {
    fn resource_type(&self) -> &'static str {
        "repository"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, platform: &Platform) -> Result<StateMap> {
        let manager = PackageManager::detect(platform, &self.id())?;
        match self.action {
            RepoAction::Update => self.check_update(manager),
            RepoAction::Upgrade => self.check_upgrade(manager),
            RepoAction::Add => self.check_source(manager, platform),
        }
    }

    fn desired_state(&self) -> Result<StateMap> {
        let mut state = StateMap::new();
        match self.action {
            RepoAction::Update => {
                state.insert("exists".to_string(), json!(true));
                state.insert("needs_update".to_string(), json!(false));
            }
            RepoAction::Upgrade => {
                state.insert("exists".to_string(), json!(true));
                state.insert("needs_upgrade".to_string(), json!(false));
            }
            RepoAction::Add => {
                state.insert(
                    "exists".to_string(),
                    json!(self.ensure == RepoEnsure::Present),
                );
                state.insert("repo_line".to_string(), json!(self.repo));
                state.insert(
                    "has_key".to_string(),
                    json!(self.key_url.is_some() || self.key_id.is_some()),
                );
            }
        }
        Ok(state)
    }

    fn apply(&self, plan: &Plan, platform: &Platform) -> Result<()> {
        let manager = PackageManager::detect(platform, &self.id())?;
        // Maintenance actions dispatch on the declared action, not the plan's
        // create/update/delete verdict.
        match self.action {
            RepoAction::Update => self.do_update(manager),
            RepoAction::Upgrade => self.do_upgrade(manager),
            RepoAction::Add => match plan.action {
                Action::Create => self.add_source(manager, platform),
                Action::Delete => self.remove_source(manager),
                Action::Update | Action::None => Ok(()),
            },
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

    fn ubuntu() -> Platform {
        Platform {
            system: "Linux".to_string(),
            distro: "ubuntu".to_string(),
            version: "24.04".to_string(),
            arch: "x86_64".to_string(),
        }
    }

    fn with_transport(repo: Repository, transport: &Arc<MemoryTransport>) -> Repository {
        let mut repo = repo;
        repo.bind_transport(transport.clone());
        repo
    }

    #[test]
    fn add_without_source_is_rejected() {
        let err = Repository::new("bare", RepoAction::Add, RepositoryOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("requires one of"));
    }

    #[test]
    fn stale_cache_plans_update_and_apply_refreshes() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/var/lib/apt/periodic/update-success-stamp", "");
        transport.respond("date +%s", "7200\n", 0);
        let repo = with_transport(
            Repository::new("apt-update", RepoAction::Update, RepositoryOptions::default())
                .unwrap(),
            &transport,
        );

        let planned = plan_resource(&repo, &ubuntu()).unwrap();
        assert_eq!(planned.plan.action, Action::Update);
        assert!(
            planned
                .plan
                .changes
                .iter()
                .any(|c| c.field == "needs_update" && c.to == json!(false))
        );

        repo.apply(&planned.plan, &ubuntu()).unwrap();
        assert!(transport.ran("apt-get update -y"));
    }

    #[test]
    fn fresh_cache_plans_none() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/var/lib/apt/periodic/update-success-stamp", "");
        transport.respond("date +%s", "120\n", 0);
        let repo = with_transport(
            Repository::new("apt-update", RepoAction::Update, RepositoryOptions::default())
                .unwrap(),
            &transport,
        );

        let planned = plan_resource(&repo, &ubuntu()).unwrap();
        assert_eq!(planned.plan.action, Action::None);
    }

    #[test]
    fn missing_cache_stamp_needs_update() {
        let transport = Arc::new(MemoryTransport::new());
        let repo = with_transport(
            Repository::new("apt-update", RepoAction::Update, RepositoryOptions::default())
                .unwrap(),
            &transport,
        );

        let state = repo.check(&ubuntu()).unwrap();
        assert_eq!(state.get("needs_update"), Some(&json!(true)));
    }

    #[test]
    fn upgradable_packages_plan_upgrade() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond("apt list --upgradable", "4\n", 0);
        let repo = with_transport(
            Repository::new("apt-upgrade", RepoAction::Upgrade, RepositoryOptions::default())
                .unwrap(),
            &transport,
        );

        let planned = plan_resource(&repo, &ubuntu()).unwrap();
        assert_eq!(planned.plan.action, Action::Update);
        assert_eq!(planned.actual.get("upgradable_count"), Some(&json!(4)));

        repo.apply(&planned.plan, &ubuntu()).unwrap();
        assert!(transport.ran("apt-get upgrade -y"));
    }

    #[test]
    fn add_writes_key_and_sources_fragment() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond("lsb_release -cs", "noble\n", 0);
        let repo = with_transport(
            Repository::new(
                "docker",
                RepoAction::Add,
                RepositoryOptions {
                    repo: Some(
                        "deb https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable"
                            .to_string(),
                    ),
                    key_url: Some("https://download.docker.com/linux/ubuntu/gpg".to_string()),
                    ..Default::default()
                },
            )
            .unwrap(),
            &transport,
        );

        let planned = plan_resource(&repo, &ubuntu()).unwrap();
        assert_eq!(planned.plan.action, Action::Create);

        repo.apply(&planned.plan, &ubuntu()).unwrap();
        assert!(transport.ran("gpg --dearmor -o /etc/apt/trusted.gpg.d/docker.gpg"));
        let fragment = transport
            .file_content("/etc/apt/sources.list.d/docker.list")
            .unwrap();
        assert!(fragment.contains("noble stable"));
        assert!(!fragment.contains("$(lsb_release -cs)"));
    }

    #[test]
    fn matching_fragment_plans_none() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file(
            "/etc/apt/sources.list.d/nodesource.list",
            "# nodesource\ndeb https://deb.nodesource.com/node_20.x nodistro main\n",
        );
        let repo = with_transport(
            Repository::new(
                "nodesource",
                RepoAction::Add,
                RepositoryOptions {
                    repo: Some("deb https://deb.nodesource.com/node_20.x nodistro main".to_string()),
                    ..Default::default()
                },
            )
            .unwrap(),
            &transport,
        );

        let planned = plan_resource(&repo, &ubuntu()).unwrap();
        assert_eq!(planned.plan.action, Action::None);
    }

    #[test]
    fn absent_source_is_removed() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file(
            "/etc/apt/sources.list.d/old.list",
            "# old\ndeb https://old.example.com stable main\n",
        );
        let repo = with_transport(
            Repository::new(
                "old",
                RepoAction::Add,
                RepositoryOptions {
                    repo: Some("deb https://old.example.com stable main".to_string()),
                    ensure: RepoEnsure::Absent,
                    ..Default::default()
                },
            )
            .unwrap(),
            &transport,
        );

        let planned = plan_resource(&repo, &ubuntu()).unwrap();
        assert_eq!(planned.plan.action, Action::Delete);
        repo.apply(&planned.plan, &ubuntu()).unwrap();
        assert!(transport.ran("rm -f /etc/apt/sources.list.d/old.list"));
    }

    #[test]
    fn dnf_repo_definition_is_synthesized() {
        let fedora = Platform {
            system: "Linux".to_string(),
            distro: "fedora".to_string(),
            version: "40".to_string(),
            arch: "x86_64".to_string(),
        };
        let transport = Arc::new(MemoryTransport::new());
        let repo = with_transport(
            Repository::new(
                "hashicorp",
                RepoAction::Add,
                RepositoryOptions {
                    repo: Some("https://rpm.releases.hashicorp.com/fedora/$releasever/stable".to_string()),
                    key_url: Some("https://rpm.releases.hashicorp.com/gpg".to_string()),
                    ..Default::default()
                },
            )
            .unwrap(),
            &transport,
        );

        let planned = plan_resource(&repo, &fedora).unwrap();
        repo.apply(&planned.plan, &fedora).unwrap();

        let definition = transport
            .file_content("/etc/yum.repos.d/hashicorp.repo")
            .unwrap();
        assert!(definition.contains("[hashicorp]"));
        assert!(definition.contains("baseurl=https://rpm.releases.hashicorp.com"));
        assert!(definition.contains("gpgcheck=1"));
        assert!(definition.contains("enabled=1"));
    }

    #[test]
    fn brew_tap_check_and_add() {
        let macos = Platform {
            system: "Darwin".to_string(),
            distro: "macos".to_string(),
            version: "14.5".to_string(),
            arch: "arm64".to_string(),
        };
        let transport = Arc::new(MemoryTransport::new());
        transport.respond("brew tap", "homebrew/core\n", 0);
        let repo = with_transport(
            Repository::new(
                "fonts",
                RepoAction::Add,
                RepositoryOptions {
                    tap: Some("homebrew/cask-fonts".to_string()),
                    ..Default::default()
                },
            )
            .unwrap(),
            &transport,
        );

        let planned = plan_resource(&repo, &macos).unwrap();
        assert_eq!(planned.plan.action, Action::Create);
        repo.apply(&planned.plan, &macos).unwrap();
        assert!(transport.ran("brew tap homebrew/cask-fonts"));
    }
}
