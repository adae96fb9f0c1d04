//! sites-available / sites-enabled lifecycle.
//!
//! A site is a file `<sites_available>/<domain>`; it is enabled by a symlink
//! of the same name in `sites_enabled`. Every change that nginx would see is
//! checked with `nginx -t` before the service is reloaded, and undone when
//! the check fails.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use super::template::{render, SiteParams, TemplateKind, TemplateSettings};
use crate::backup::{self, BackupStore};
use crate::cmd_abstraction::{CommandResult, Runner};
use crate::error::ZappyError;
use crate::fs_abstraction::FileSystem;
use crate::validation::validate_domain;

/// Everything needed to generate one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSpec {
    pub domain: String,
    pub kind: TemplateKind,
    pub params: SiteParams,
}

/// One entry of [`SiteManager::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainInfo {
    pub name: String,
    pub enabled: bool,
    pub ssl: bool,
    pub path: PathBuf,
}

pub struct SiteManager<'a> {
    fs: &'a dyn FileSystem,
    runner: Runner,
    sites_available: PathBuf,
    sites_enabled: PathBuf,
    settings: TemplateSettings,
    backups: BackupStore<'a>,
}

impl<'a> SiteManager<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        runner: Runner,
        sites_available: impl Into<PathBuf>,
        sites_enabled: impl Into<PathBuf>,
        settings: TemplateSettings,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs,
            runner,
            sites_available: sites_available.into(),
            sites_enabled: sites_enabled.into(),
            settings,
            backups: BackupStore::new(fs, backup_dir),
        }
    }

    pub fn available_path(&self, domain: &str) -> PathBuf {
        self.sites_available.join(domain)
    }

    pub fn enabled_path(&self, domain: &str) -> PathBuf {
        self.sites_enabled.join(domain)
    }

    pub fn exists(&self, domain: &str) -> bool {
        self.fs.is_file(&self.available_path(domain))
    }

    pub fn is_enabled(&self, domain: &str) -> bool {
        self.fs.is_symlink(&self.enabled_path(domain))
    }

    /// All configured sites, sorted by name.
    pub fn list(&self) -> Result<Vec<DomainInfo>> {
        if !self.fs.exists(&self.sites_available) {
            return Ok(Vec::new());
        }

        let entries = self
            .fs
            .read_dir(&self.sites_available)
            .with_context(|| format!("Failed to list {:?}", self.sites_available))?;

        let mut sites: Vec<DomainInfo> = entries
            .into_iter()
            .filter(|path| self.fs.is_file(path))
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().to_string();
                if name.starts_with('.') {
                    return None;
                }
                let content = self.fs.read_to_string(&path).unwrap_or_default();
                Some(DomainInfo {
                    enabled: self.is_enabled(&name),
                    ssl: has_ssl(&content),
                    name,
                    path,
                })
            })
            .collect();

        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    /// Render and write a site. Returns the written path.
    ///
    /// Nothing is touched if rendering fails. When the site is already
    /// enabled the new file must pass `nginx -t`; otherwise the previous
    /// version is restored and [`ZappyError::ConfigSyntax`] is returned.
    pub fn create(&self, spec: &SiteSpec, overwrite: bool) -> Result<PathBuf> {
        let config = render(spec.kind, &spec.domain, &spec.params, &self.settings)?;

        let path = self.available_path(&spec.domain);
        let previous = if self.fs.exists(&path) {
            if !overwrite {
                return Err(ZappyError::SiteExists(spec.domain.clone()).into());
            }
            Some(self.backups.backup(backup::NGINX, &spec.domain, &path)?)
        } else {
            None
        };

        self.fs
            .create_dir_all(&self.sites_available)
            .with_context(|| format!("Failed to create {:?}", self.sites_available))?;
        self.fs
            .write(&path, config.as_bytes())
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!("Wrote {} config to {:?}", spec.kind, path);

        if self.is_enabled(&spec.domain) {
            if let Err(e) = self.check_syntax() {
                match &previous {
                    Some(backup) => self.backups.restore(backup, &path)?,
                    None => self
                        .fs
                        .remove_file(&path)
                        .with_context(|| format!("Failed to remove {:?}", path))?,
                }
                warn!("New config for {} rejected by nginx, previous version kept", spec.domain);
                return Err(e);
            }
            self.reload_checked()?;
        }

        Ok(path)
    }

    /// Link the site into sites-enabled, test, then reload.
    ///
    /// A failed test removes the link again, so sites-enabled is left as it
    /// was and nginx is not reloaded.
    pub fn enable(&self, domain: &str) -> Result<()> {
        validate_domain(domain)?;
        let available = self.available_path(domain);
        if !self.fs.is_file(&available) {
            return Err(ZappyError::SiteNotFound(domain.to_string()).into());
        }
        let link = self.enabled_path(domain);
        if self.fs.is_symlink(&link) {
            return Err(ZappyError::AlreadyEnabled(domain.to_string()).into());
        }

        self.fs
            .create_dir_all(&self.sites_enabled)
            .with_context(|| format!("Failed to create {:?}", self.sites_enabled))?;
        self.fs
            .symlink(&available, &link)
            .with_context(|| format!("Failed to link {:?} to {:?}", link, available))?;

        if let Err(e) = self.check_syntax() {
            self.fs
                .remove_file(&link)
                .with_context(|| format!("Failed to remove {:?}", link))?;
            return Err(e);
        }

        self.reload_checked()?;
        info!("Enabled {}", domain);
        Ok(())
    }

    /// Remove the sites-enabled link, test, then reload.
    pub fn disable(&self, domain: &str) -> Result<()> {
        validate_domain(domain)?;
        let link = self.enabled_path(domain);
        if !self.fs.is_symlink(&link) {
            return Err(ZappyError::SiteNotEnabled(domain.to_string()).into());
        }

        self.fs
            .remove_file(&link)
            .with_context(|| format!("Failed to remove {:?}", link))?;
        self.check_syntax()?;
        self.reload_checked()?;
        info!("Disabled {}", domain);
        Ok(())
    }

    /// Back up, unlink and remove a site. Returns the backup path.
    ///
    /// Nothing is touched when the backup fails. A failing `nginx -t`
    /// afterwards is only a warning: the removed site cannot be the cause,
    /// and reloading is skipped.
    pub fn delete(&self, domain: &str) -> Result<PathBuf> {
        validate_domain(domain)?;
        let path = self.available_path(domain);
        if !self.fs.exists(&path) {
            return Err(ZappyError::SiteNotFound(domain.to_string()).into());
        }

        let backup = self.backups.backup(backup::NGINX, domain, &path)?;

        let was_enabled = self.is_enabled(domain);
        if was_enabled {
            let link = self.enabled_path(domain);
            self.fs
                .remove_file(&link)
                .with_context(|| format!("Failed to remove {:?}", link))?;
        }

        self.fs
            .remove_file(&path)
            .with_context(|| format!("Failed to remove {:?}", path))?;
        info!("Deleted {} (backup: {:?})", domain, backup);

        if was_enabled {
            match self.check_syntax() {
                Ok(()) => self.reload_checked()?,
                Err(e) => warn!("nginx configuration still invalid, not reloading: {}", e),
            }
        }
        Ok(backup)
    }

    /// Backups of site configurations, newest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        self.backups.list(backup::NGINX)
    }

    /// Contents of a site's config file.
    pub fn view(&self, domain: &str) -> Result<String> {
        validate_domain(domain)?;
        let path = self.available_path(domain);
        if !self.fs.exists(&path) {
            return Err(ZappyError::SiteNotFound(domain.to_string()).into());
        }
        self.fs
            .read_to_string(&path)
            .with_context(|| format!("Failed to read {:?}", path))
    }

    /// `nginx -t`
    pub fn test_config(&self) -> CommandResult {
        self.runner.run(&["nginx", "-t"], true)
    }

    /// `nginx -t`, as an error carrying nginx's diagnostics on failure.
    pub fn check_syntax(&self) -> Result<()> {
        let result = self.test_config();
        if result.success {
            Ok(())
        } else {
            Err(ZappyError::ConfigSyntax(result.output_text().trim().to_string()).into())
        }
    }

    pub fn reload(&self) -> CommandResult {
        self.runner.run(&["systemctl", "reload", "nginx"], true)
    }

    fn reload_checked(&self) -> Result<()> {
        self.runner
            .run_checked(&["systemctl", "reload", "nginx"], true)?;
        Ok(())
    }

    pub fn status(&self) -> CommandResult {
        self.runner
            .run(&["systemctl", "status", "nginx", "--no-pager"], false)
    }
}

fn has_ssl(content: &str) -> bool {
    content.contains("listen 443") || content.contains("ssl_certificate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{MockCommandExecutor, Privilege};
    use crate::fs_abstraction::{MockFileSystem, RealFileSystem};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Layout {
        dir: TempDir,
    }

    impl Layout {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("available")).unwrap();
            std::fs::create_dir_all(dir.path().join("enabled")).unwrap();
            Self { dir }
        }

        fn available(&self) -> PathBuf {
            self.dir.path().join("available")
        }

        fn enabled(&self) -> PathBuf {
            self.dir.path().join("enabled")
        }

        fn manager<'a>(&self, fs: &'a dyn FileSystem, mock: MockCommandExecutor) -> SiteManager<'a> {
            SiteManager::new(
                fs,
                Runner::new(Arc::new(mock), Privilege::None),
                self.available(),
                self.enabled(),
                TemplateSettings::default(),
                self.dir.path().join("backups"),
            )
        }

        fn enabled_entries(&self) -> Vec<PathBuf> {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(self.enabled())
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect();
            entries.sort();
            entries
        }
    }

    fn proxy_spec(domain: &str, upstream: &str) -> SiteSpec {
        SiteSpec {
            domain: domain.to_string(),
            kind: TemplateKind::Proxy,
            params: SiteParams {
                upstream: Some(upstream.to_string()),
                ..Default::default()
            },
        }
    }

    fn expect_nginx_test(mock: &mut MockCommandExecutor, ok: bool) {
        mock.expect_execute()
            .withf(|cmd, args, _| cmd == "nginx" && args == ["-t".to_string()])
            .times(1)
            .returning(move |_, _, _| {
                Ok(if ok {
                    CommandResult::ok("")
                } else {
                    CommandResult::failed(
                        "nginx: [emerg] unknown directive \"proxy_passs\"\nnginx: configuration file /etc/nginx/nginx.conf test failed",
                    )
                })
            });
    }

    fn expect_reload(mock: &mut MockCommandExecutor, times: usize) {
        mock.expect_execute()
            .withf(|cmd, args, _| {
                cmd == "systemctl" && args == ["reload".to_string(), "nginx".to_string()]
            })
            .times(times)
            .returning(|_, _, _| Ok(CommandResult::ok("")));
    }

    #[test]
    fn test_enable_with_failing_syntax_leaves_sites_enabled_unchanged() {
        let layout = Layout::new();
        std::fs::write(layout.available().join("example.com"), "server { proxy_passs x; }\n").unwrap();
        std::fs::write(layout.enabled().join("other.com"), "").unwrap();
        let before = layout.enabled_entries();

        let mut mock = MockCommandExecutor::new();
        expect_nginx_test(&mut mock, false);
        expect_reload(&mut mock, 0);

        let fs = RealFileSystem;
        let manager = layout.manager(&fs, mock);
        let err = manager.enable("example.com").unwrap_err();

        match err.downcast_ref::<ZappyError>() {
            Some(ZappyError::ConfigSyntax(msg)) => assert!(msg.contains("unknown directive")),
            other => panic!("expected ConfigSyntax, got {:?}", other),
        }
        assert_eq!(layout.enabled_entries(), before);
        assert!(!manager.is_enabled("example.com"));
    }

    #[test]
    fn test_enable_success_links_and_reloads() {
        let layout = Layout::new();
        let fs = RealFileSystem;

        let mut mock = MockCommandExecutor::new();
        expect_nginx_test(&mut mock, true);
        expect_reload(&mut mock, 1);
        let manager = layout.manager(&fs, mock);

        manager.create(&proxy_spec("app.example.com", "3000"), false).unwrap();
        manager.enable("app.example.com").unwrap();

        let link = layout.enabled().join("app.example.com");
        assert!(fs.is_symlink(&link));
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            layout.available().join("app.example.com")
        );
    }

    #[test]
    fn test_enable_errors() {
        let layout = Layout::new();
        let fs = RealFileSystem;
        let manager = layout.manager(&fs, MockCommandExecutor::new());

        let err = manager.enable("missing.example.com").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::SiteNotFound(_))
        ));

        let err = manager.enable("../etc/passwd").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::InvalidDomain { .. })
        ));

        std::fs::write(layout.available().join("example.com"), "").unwrap();
        std::os::unix::fs::symlink(
            layout.available().join("example.com"),
            layout.enabled().join("example.com"),
        )
        .unwrap();
        let err = manager.enable("example.com").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::AlreadyEnabled(_))
        ));
    }

    #[test]
    fn test_create_invalid_domain_has_no_side_effect() {
        let fs = MockFileSystem::new();
        let layout = Layout::new();
        // No filesystem or command expectations: any call would panic
        let manager = layout.manager(&fs, MockCommandExecutor::new());

        let err = manager.create(&proxy_spec("not a domain", "3000"), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::InvalidDomain { .. })
        ));

        let err = manager.create(&proxy_spec("example.com", "99999"), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::InvalidUpstream(_))
        ));
    }

    #[test]
    fn test_create_refuses_overwrite() {
        let layout = Layout::new();
        let fs = RealFileSystem;
        let manager = layout.manager(&fs, MockCommandExecutor::new());

        manager.create(&proxy_spec("example.com", "3000"), false).unwrap();
        let err = manager.create(&proxy_spec("example.com", "4000"), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::SiteExists(_))
        ));

        let content = manager.view("example.com").unwrap();
        assert!(content.contains("proxy_pass http://127.0.0.1:3000;"));
    }

    #[test]
    fn test_overwrite_enabled_site_restores_on_syntax_failure() {
        let layout = Layout::new();
        let fs = RealFileSystem;

        let mut mock = MockCommandExecutor::new();
        expect_nginx_test(&mut mock, false);
        expect_reload(&mut mock, 0);
        let manager = layout.manager(&fs, mock);

        let original = "server { listen 80; server_name example.com; }\n";
        std::fs::write(layout.available().join("example.com"), original).unwrap();
        std::os::unix::fs::symlink(
            layout.available().join("example.com"),
            layout.enabled().join("example.com"),
        )
        .unwrap();

        let err = manager.create(&proxy_spec("example.com", "4000"), true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::ConfigSyntax(_))
        ));
        assert_eq!(manager.view("example.com").unwrap(), original);

        let backups = std::fs::read_dir(layout.dir.path().join("backups").join("nginx"))
            .unwrap()
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_overwrite_enabled_site_reloads() {
        let layout = Layout::new();
        let fs = RealFileSystem;

        let mut mock = MockCommandExecutor::new();
        expect_nginx_test(&mut mock, true);
        expect_reload(&mut mock, 1);
        let manager = layout.manager(&fs, mock);

        std::fs::write(layout.available().join("example.com"), "old").unwrap();
        std::os::unix::fs::symlink(
            layout.available().join("example.com"),
            layout.enabled().join("example.com"),
        )
        .unwrap();

        manager.create(&proxy_spec("example.com", "4000"), true).unwrap();
        assert!(manager
            .view("example.com")
            .unwrap()
            .contains("proxy_pass http://127.0.0.1:4000;"));
    }

    #[test]
    fn test_disable() {
        let layout = Layout::new();
        let fs = RealFileSystem;

        let mut mock = MockCommandExecutor::new();
        expect_nginx_test(&mut mock, true);
        expect_reload(&mut mock, 1);
        let manager = layout.manager(&fs, mock);

        let err = manager.disable("example.com").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::SiteNotEnabled(_))
        ));

        std::fs::write(layout.available().join("example.com"), "").unwrap();
        std::os::unix::fs::symlink(
            layout.available().join("example.com"),
            layout.enabled().join("example.com"),
        )
        .unwrap();

        manager.disable("example.com").unwrap();
        assert!(!manager.is_enabled("example.com"));
        assert!(manager.exists("example.com"));
    }

    #[test]
    fn test_delete_enabled_site() {
        let layout = Layout::new();
        let fs = RealFileSystem;

        let mut mock = MockCommandExecutor::new();
        expect_nginx_test(&mut mock, true);
        expect_reload(&mut mock, 1);
        let manager = layout.manager(&fs, mock);

        manager.create(&proxy_spec("example.com", "3000"), false).unwrap();
        std::os::unix::fs::symlink(
            layout.available().join("example.com"),
            layout.enabled().join("example.com"),
        )
        .unwrap();

        let backup = manager.delete("example.com").unwrap();
        assert!(backup.exists());
        assert!(!manager.exists("example.com"));
        assert!(!manager.is_enabled("example.com"));
        assert_eq!(manager.backups().unwrap(), vec![backup.clone()]);
        assert!(std::fs::read_to_string(backup).unwrap().contains("server_name example.com;"));
    }

    #[test]
    fn test_delete_keeps_site_when_backup_fails() {
        let layout = Layout::new();
        // The backup directory cannot be created under a regular file
        let blocker = layout.dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let fs = RealFileSystem;
        let manager = SiteManager::new(
            &fs,
            Runner::new(Arc::new(MockCommandExecutor::new()), Privilege::None),
            layout.available(),
            layout.enabled(),
            TemplateSettings::default(),
            blocker.join("backups"),
        );

        std::fs::write(layout.available().join("example.com"), "server {}\n").unwrap();
        std::os::unix::fs::symlink(
            layout.available().join("example.com"),
            layout.enabled().join("example.com"),
        )
        .unwrap();

        assert!(manager.delete("example.com").is_err());
        assert!(layout.available().join("example.com").exists());
        assert!(manager.is_enabled("example.com"));
    }

    #[test]
    fn test_delete_disabled_site_skips_nginx() {
        let layout = Layout::new();
        let fs = RealFileSystem;
        let manager = layout.manager(&fs, MockCommandExecutor::new());

        manager.create(&proxy_spec("example.com", "3000"), false).unwrap();
        manager.delete("example.com").unwrap();
        assert!(!manager.exists("example.com"));

        let err = manager.delete("example.com").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::SiteNotFound(_))
        ));
    }

    #[test]
    fn test_list_reports_enabled_and_ssl() {
        let layout = Layout::new();
        std::fs::write(layout.available().join("b.example.com"), "listen 443 ssl;").unwrap();
        std::fs::write(layout.available().join("a.example.com"), "listen 80;").unwrap();
        std::fs::write(layout.available().join(".hidden"), "").unwrap();
        std::fs::create_dir(layout.available().join("subdir")).unwrap();
        std::os::unix::fs::symlink(
            layout.available().join("b.example.com"),
            layout.enabled().join("b.example.com"),
        )
        .unwrap();

        let fs = RealFileSystem;
        let manager = layout.manager(&fs, MockCommandExecutor::new());
        let sites = manager.list().unwrap();

        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].name, "a.example.com");
        assert!(!sites[0].enabled);
        assert!(!sites[0].ssl);
        assert_eq!(sites[1].name, "b.example.com");
        assert!(sites[1].enabled);
        assert!(sites[1].ssl);
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let fs = RealFileSystem;
        let manager = SiteManager::new(
            &fs,
            Runner::new(Arc::new(MockCommandExecutor::new()), Privilege::None),
            dir.path().join("nope"),
            dir.path().join("nope-enabled"),
            TemplateSettings::default(),
            dir.path().join("backups"),
        );
        assert!(manager.list().unwrap().is_empty());
    }
}
