//! Extension code that is mounted into the workload: fetched remote sources and an
//! optional local extension directory.

use crate::config::{JobNames, ProvisionConfig};
use crate::store::JobRecorder;

use stagehand_core::prelude::{defaults, *};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use walkdir::WalkDir;

/// Clones sources with `git clone --depth 1`.
#[derive(Clone, Debug, Default)]
pub struct GitFetcher;

impl SourceFetcher for GitFetcher {
    async fn fetch(&self, source: &str, dest: &Path) -> Result<(), StorageError> {
        let output = Command::new("git")
            .args(["clone", "--depth", "1", source])
            .arg(dest)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StorageError::System(format!(
                "git clone {source} failed: {}",
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// What gets mounted into the workload and what gets installed when.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionPlan {
    /// Installed by the workload on first boot.
    pub capabilities: Vec<String>,
    /// Installed after boot. Empty means "discover from `scan_dirs`".
    pub extensions: Vec<String>,
    pub mounts: Vec<Mount>,
    /// Host directories searched for extension manifests.
    pub scan_dirs: Vec<PathBuf>,
    /// Directory holding fetched sources, removed again if the job fails.
    pub sources_dir: Option<PathBuf>,
}

impl ExtensionPlan {
    pub fn has_mounts(&self) -> bool {
        !self.mounts.is_empty()
    }
}

/// Directory name a source is cloned into: the last path segment without `.git`.
pub fn source_dir_name(source: &str) -> Option<String> {
    let last = source.trim_end_matches('/').rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    (!name.is_empty()).then(|| name.to_string())
}

pub fn has_manifest(dir: &Path) -> bool {
    dir.is_dir() && dir.join(defaults::MANIFEST_MARKER).is_file()
}

/// Names of every directory below `roots` that carries a manifest, in walk order.
pub fn discover_extensions(roots: &[PathBuf]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for root in roots {
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() || entry.file_name() != defaults::MANIFEST_MARKER {
                continue;
            }
            let name = entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().to_string());
            if let Some(name) = name
                && !found.contains(&name)
            {
                found.push(name);
            }
        }
    }
    found
}

/// Fetches remote sources, detects the local extension directory and works out the
/// first-boot capability list. Fetch problems are logged and skipped.
pub async fn prepare_extensions<F: SourceFetcher>(
    fetcher: &F,
    recorder: &JobRecorder,
    config: &ProvisionConfig,
    names: &JobNames,
    request: &ProvisionRequest,
) -> ExtensionPlan {
    let mut plan = ExtensionPlan {
        capabilities: request.capabilities.clone(),
        extensions: request.extensions.clone(),
        ..Default::default()
    };

    if !request.extension_sources.is_empty() {
        let dir = names.sources_dir(config);
        recorder.note(format!(
            "Preparing extension sources ({})...",
            request.extension_sources.len()
        ));
        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => {
                fetch_sources(fetcher, recorder, config, &dir, &request.extension_sources).await;
                plan.mounts
                    .push(Mount::read_write(&dir, config.extension_mount.clone()));
                plan.scan_dirs.push(dir.clone());
                plan.sources_dir = Some(dir);
            }
            Err(e) => recorder.warn(
                LogCode::SourceFetchFailed,
                format!("Could not create {}: {e}", dir.display()),
            ),
        }
    }

    if let Some(local) = config.local_extension_dir.as_deref().filter(|d| has_manifest(d)) {
        add_local_extension(&mut plan, recorder, config, local);
    }

    plan
}

async fn fetch_sources<F: SourceFetcher>(
    fetcher: &F,
    recorder: &JobRecorder,
    config: &ProvisionConfig,
    dir: &Path,
    sources: &[String],
) {
    for source in sources {
        let Some(name) = source_dir_name(source) else {
            recorder.warn(
                LogCode::SourceFetchFailed,
                format!("Skipping source with no usable name: {source}"),
            );
            continue;
        };
        let dest = dir.join(&name);
        if dest.exists() {
            recorder.note(format!("Extension source already present: {name}"));
            continue;
        }

        recorder.note(format!("Fetching extension source: {source}"));
        match tokio::time::timeout(config.fetch_timeout, fetcher.fetch(source, &dest)).await {
            Ok(Ok(())) => recorder.info(LogCode::SourceFetched, format!("Fetched {name}")),
            Ok(Err(e)) => recorder.warn(
                LogCode::SourceFetchFailed,
                format!("Failed to fetch {source}: {e}"),
            ),
            Err(_) => {
                recorder.warn(
                    LogCode::SourceFetchFailed,
                    format!(
                        "Gave up fetching {source} after {}s",
                        config.fetch_timeout.as_secs()
                    ),
                );
                // A partial checkout would be taken as present next time.
                let _ = tokio::fs::remove_dir_all(&dest).await;
            }
        }
    }
}

fn add_local_extension(
    plan: &mut ExtensionPlan,
    recorder: &JobRecorder,
    config: &ProvisionConfig,
    local: &Path,
) {
    let Some(name) = local.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return;
    };

    recorder.info(
        LogCode::LocalExtensionDetected,
        format!("Detected local extension '{name}'; it will be mounted into the workload."),
    );
    plan.mounts.push(Mount::read_write(
        local,
        format!("{}/{name}", config.extension_mount),
    ));
    plan.scan_dirs.push(local.to_path_buf());

    if !plan.extensions.is_empty() && !plan.extensions.contains(&name) {
        plan.extensions.push(name.clone());
    }

    for required in config.local_extension_requires.iter().rev() {
        if !plan.capabilities.contains(required) {
            plan.capabilities.insert(0, required.clone());
            recorder.info(
                LogCode::CapabilityAdded,
                format!("Added '{required}' as a prerequisite of '{name}'."),
            );
        }
    }

    if plan.capabilities.contains(&name) {
        plan.capabilities.retain(|c| c != &name);
        recorder.note(format!(
            "Deferring '{name}' installation to the post-start phase."
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JobStore;

    fn write_manifest(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(defaults::MANIFEST_MARKER), "{'name': 'x'}").unwrap();
    }

    fn recorder() -> (JobStore, JobRecorder) {
        let store = JobStore::new();
        let id = store.create(ProvisionRequest::new(["base"])).unwrap();
        let recorder = store.recorder(&id);
        (store, recorder)
    }

    #[test]
    fn source_names_strip_git_suffix() {
        assert_eq!(
            source_dir_name("https://github.com/acme/brand_theme.git").as_deref(),
            Some("brand_theme")
        );
        assert_eq!(
            source_dir_name("git@github.com:acme/tools/").as_deref(),
            Some("tools")
        );
        assert_eq!(source_dir_name("").as_deref(), None);
    }

    #[test]
    fn discovery_finds_manifest_directories() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(&tmp.path().join("repo_a/theme_blue"));
        write_manifest(&tmp.path().join("repo_a/theme_red"));
        std::fs::create_dir_all(tmp.path().join("repo_a/docs")).unwrap();
        write_manifest(&tmp.path().join("solo"));

        let found = discover_extensions(&[tmp.path().to_path_buf()]);
        assert_eq!(found, vec!["theme_blue", "theme_red", "solo"]);
    }

    #[test]
    fn discovery_of_missing_dirs_is_empty() {
        assert!(discover_extensions(&[PathBuf::from("/no/such/dir")]).is_empty());
    }

    #[tokio::test]
    async fn local_extension_is_mounted_and_deferred() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("brand_theme");
        write_manifest(&local);

        let config = ProvisionConfig {
            local_extension_dir: Some(local.clone()),
            work_dir: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let (_store, recorder) = recorder();
        let names = JobNames::new(&config, recorder.id());
        let request = ProvisionRequest::new(["crm", "brand_theme"]);

        let plan = prepare_extensions(&GitFetcher, &recorder, &config, &names, &request).await;

        assert_eq!(plan.capabilities, vec!["website", "crm"]);
        assert_eq!(plan.mounts.len(), 1);
        assert_eq!(plan.mounts[0].target, "/mnt/extra-addons/brand_theme");
        assert_eq!(plan.scan_dirs, vec![local]);
        assert!(plan.extensions.is_empty());
        assert!(plan.sources_dir.is_none());
    }

    #[tokio::test]
    async fn directory_without_manifest_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ProvisionConfig {
            local_extension_dir: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        let (_store, recorder) = recorder();
        let names = JobNames::new(&config, recorder.id());

        let plan = prepare_extensions(
            &GitFetcher,
            &recorder,
            &config,
            &names,
            &ProvisionRequest::new(["crm"]),
        )
        .await;

        assert_eq!(plan.capabilities, vec!["crm"]);
        assert!(!plan.has_mounts());
    }
}
