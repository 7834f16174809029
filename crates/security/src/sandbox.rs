//! Process-wide filesystem sandbox backed by Linux Landlock.
//!
//! After activation, neither this process nor any child it spawns
//! (shell commands from the model included) can touch files outside
//! the allowed directories. Landlock is unprivileged and available
//! since Linux 5.13; on unsupported kernels or other platforms the
//! sandbox degrades to a documented no-op and the rest of the system
//! keeps running.
//!
//! The lifecycle has two phases, both of which must complete before
//! any plugin loads a shared library:
//! 1. `init()` — resolve `~/.opencrank`, create the directory layout,
//!    probe kernel support
//! 2. `activate()` — build and enforce the ruleset; irreversible for
//!    the life of the process

use opencrank_core::error::SandboxError;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info, warn};

/// System directories children still need read/execute access to
/// (dynamic linking, DNS resolution, SSL certs, /dev/null, ...).
const READ_ONLY_DIRS: &[&str] = &[
    "/usr", "/lib", "/lib64", "/bin", "/sbin", "/etc", "/dev", "/proc", "/sys", "/run",
];

#[derive(Default)]
struct SandboxState {
    initialized: bool,
    active: bool,
    supported: bool,
    base_dir: PathBuf,
    db_dir: PathBuf,
    jail_dir: PathBuf,
    plugins_dir: PathBuf,
    extra_allowed: Vec<PathBuf>,
}

/// The process-wide sandbox singleton.
///
/// Obtain it with [`Sandbox::global`]. All state is behind one mutex;
/// every operation completes in bounded time.
pub struct Sandbox {
    state: Mutex<SandboxState>,
}

static GLOBAL: OnceLock<Sandbox> = OnceLock::new();

impl Sandbox {
    /// The process-wide instance.
    pub fn global() -> &'static Sandbox {
        GLOBAL.get_or_init(|| Sandbox {
            state: Mutex::new(SandboxState::default()),
        })
    }

    /// Phase one: resolve the base directory and create the layout.
    ///
    /// Base is `$HOME/.opencrank`, or `/tmp/.opencrank` when HOME is
    /// unset. Creates `base/`, `base/db/`, `base/jail/`,
    /// `base/jail/memory/`, and `base/plugins/`. Idempotent.
    pub fn init(&self) -> Result<(), SandboxError> {
        let mut state = self.state.lock().expect("sandbox state poisoned");

        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        state.base_dir = Path::new(&home).join(".opencrank");
        state.db_dir = state.base_dir.join("db");
        state.jail_dir = state.base_dir.join("jail");
        state.plugins_dir = state.base_dir.join("plugins");

        for dir in [
            state.base_dir.clone(),
            state.db_dir.clone(),
            state.jail_dir.clone(),
            state.jail_dir.join("memory"),
            state.plugins_dir.clone(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| SandboxError::DirectoryCreation {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        state.supported = probe_support();
        state.initialized = true;

        info!(
            supported = state.supported,
            base = %state.base_dir.display(),
            "Sandbox initialized"
        );
        Ok(())
    }

    /// Phase two: enforce the ruleset on this process and all future
    /// descendants.
    ///
    /// Grants read+write beneath the base directory, `/tmp`, and every
    /// path passed to [`Sandbox::allow_path`] before this call;
    /// read-only (plus execute) beneath the fixed system directories.
    /// New-privilege acquisition is disabled as part of restriction.
    ///
    /// Returns `Ok(true)` when enforcement is in place, `Ok(false)` on
    /// platforms or kernels without Landlock (logged, non-fatal).
    pub fn activate(&self) -> Result<bool, SandboxError> {
        let mut state = self.state.lock().expect("sandbox state poisoned");
        if !state.initialized {
            return Err(SandboxError::NotInitialized);
        }
        if state.active {
            return Ok(true);
        }
        if !state.supported {
            warn!("Landlock not supported by this kernel; sandbox NOT active");
            return Ok(false);
        }

        let enforced = restrict_process(
            &state.base_dir,
            &state.plugins_dir,
            &state.extra_allowed,
        )?;
        if !enforced {
            warn!("Landlock restriction was not enforced; sandbox NOT active");
            return Ok(false);
        }

        state.active = true;
        info!(base = %state.base_dir.display(), "Sandbox active; process and children confined");
        Ok(true)
    }

    /// Allow read+write access beneath an extra directory.
    ///
    /// Must be called before [`Sandbox::activate`]; additions after
    /// activation are ignored (the kernel ruleset is immutable).
    pub fn allow_path(&self, path: impl Into<PathBuf>) {
        let mut state = self.state.lock().expect("sandbox state poisoned");
        let path = path.into();
        if state.active {
            warn!(path = %path.display(), "allow_path after activation ignored");
            return;
        }
        debug!(path = %path.display(), "Extra sandbox path allowed");
        state.extra_allowed.push(path);
    }

    /// Whether activation has been performed successfully.
    pub fn is_active(&self) -> bool {
        self.state.lock().expect("sandbox state poisoned").active
    }

    /// Whether the kernel supports Landlock (meaningful after init).
    pub fn is_supported(&self) -> bool {
        self.state.lock().expect("sandbox state poisoned").supported
    }

    /// Check whether a path, after resolution, lies beneath any
    /// allowed directory. Everything is allowed while the sandbox is
    /// inactive.
    pub fn is_path_allowed(&self, path: &Path) -> bool {
        let state = self.state.lock().expect("sandbox state poisoned");
        if !state.active {
            return true;
        }

        // Resolve symlinks where possible; fall back to the raw path
        // for files that do not exist yet.
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if resolved.starts_with(&state.base_dir) {
            return true;
        }
        state
            .extra_allowed
            .iter()
            .any(|allowed| resolved.starts_with(allowed))
    }

    /// The workspace root (`~/.opencrank`).
    pub fn base_dir(&self) -> PathBuf {
        self.state.lock().expect("sandbox state poisoned").base_dir.clone()
    }

    /// The jail directory tools are confined to (`~/.opencrank/jail`).
    pub fn jail_dir(&self) -> PathBuf {
        self.state.lock().expect("sandbox state poisoned").jail_dir.clone()
    }

    /// The plugin directory (`~/.opencrank/plugins`, read-only once active).
    pub fn plugins_dir(&self) -> PathBuf {
        self.state
            .lock()
            .expect("sandbox state poisoned")
            .plugins_dir
            .clone()
    }

    /// Location of the memory database (`~/.opencrank/db/memory.db`).
    pub fn memory_db_path(&self) -> PathBuf {
        self.state
            .lock()
            .expect("sandbox state poisoned")
            .db_dir
            .join("memory.db")
    }

    /// Resolve a relative path against the jail directory. Absolute
    /// paths pass through unchanged.
    pub fn resolve_in_jail(&self, relative: &str) -> PathBuf {
        let state = self.state.lock().expect("sandbox state poisoned");
        if relative.is_empty() || relative == "." {
            return state.jail_dir.clone();
        }
        let p = Path::new(relative);
        if p.is_absolute() {
            return p.to_path_buf();
        }
        state.jail_dir.join(relative)
    }
}

#[cfg(target_os = "linux")]
fn probe_support() -> bool {
    use landlock::{ABI, Access, AccessFs, CompatLevel, Compatible, Ruleset, RulesetAttr};

    Ruleset::default()
        .set_compatibility(CompatLevel::HardRequirement)
        .handle_access(AccessFs::from_all(ABI::V1))
        .and_then(|r| r.create())
        .is_ok()
}

#[cfg(not(target_os = "linux"))]
fn probe_support() -> bool {
    false
}

/// Build the Landlock ruleset and restrict the current process.
/// Returns whether enforcement actually took effect.
#[cfg(target_os = "linux")]
fn restrict_process(
    base_dir: &Path,
    plugins_dir: &Path,
    extra_allowed: &[PathBuf],
) -> Result<bool, SandboxError> {
    use landlock::{
        ABI, Access, AccessFs, Ruleset, RulesetAttr, RulesetCreatedAttr, RulesetStatus,
        path_beneath_rules,
    };

    let abi = ABI::V1;
    let rw = AccessFs::from_all(abi);
    let ro = AccessFs::from_read(abi);

    let mut rw_paths: Vec<PathBuf> = vec![base_dir.to_path_buf(), PathBuf::from("/tmp")];
    rw_paths.extend(extra_allowed.iter().cloned());

    let mut ro_paths: Vec<PathBuf> = READ_ONLY_DIRS.iter().map(PathBuf::from).collect();
    ro_paths.push(plugins_dir.to_path_buf());

    // path_beneath_rules silently skips paths that cannot be opened,
    // matching the contract that missing system dirs are not fatal.
    let status = Ruleset::default()
        .handle_access(rw)
        .map_err(|e| SandboxError::Ruleset(e.to_string()))?
        .create()
        .map_err(|e| SandboxError::Ruleset(e.to_string()))?
        .add_rules(path_beneath_rules(&rw_paths, rw))
        .map_err(|e| SandboxError::Ruleset(e.to_string()))?
        .add_rules(path_beneath_rules(&ro_paths, ro))
        .map_err(|e| SandboxError::Ruleset(e.to_string()))?
        // restrict_self also sets no_new_privs for this process
        .restrict_self()
        .map_err(|e| SandboxError::Ruleset(e.to_string()))?;

    for path in &rw_paths {
        debug!(path = %path.display(), "Sandbox rule: read+write");
    }
    for path in &ro_paths {
        debug!(path = %path.display(), "Sandbox rule: read-only");
    }

    Ok(!matches!(status.ruleset, RulesetStatus::NotEnforced))
}

#[cfg(not(target_os = "linux"))]
fn restrict_process(
    _base_dir: &Path,
    _plugins_dir: &Path,
    _extra_allowed: &[PathBuf],
) -> Result<bool, SandboxError> {
    warn!("Landlock is only available on Linux; sandbox NOT active");
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Activation is irreversible for the process, so tests only cover
    // init, path bookkeeping, and the inactive-sandbox contract.

    #[test]
    fn init_creates_directory_layout() {
        let sandbox = Sandbox::global();
        sandbox.init().unwrap();

        let base = sandbox.base_dir();
        assert!(base.ends_with(".opencrank"));
        assert!(base.is_dir());
        assert!(base.join("db").is_dir());
        assert!(base.join("jail").is_dir());
        assert!(base.join("jail/memory").is_dir());
        assert!(base.join("plugins").is_dir());
        assert_eq!(sandbox.memory_db_path(), base.join("db/memory.db"));
    }

    #[test]
    fn inactive_sandbox_allows_everything() {
        let sandbox = Sandbox::global();
        sandbox.init().unwrap();
        assert!(!sandbox.is_active());
        assert!(sandbox.is_path_allowed(Path::new("/etc/passwd")));
        assert!(sandbox.is_path_allowed(Path::new("/nonexistent/deep/path")));
    }

    #[test]
    fn resolve_in_jail_handles_relative_and_absolute() {
        let sandbox = Sandbox::global();
        sandbox.init().unwrap();
        let jail = sandbox.jail_dir();

        assert_eq!(sandbox.resolve_in_jail(""), jail);
        assert_eq!(sandbox.resolve_in_jail("."), jail);
        assert_eq!(sandbox.resolve_in_jail("notes.md"), jail.join("notes.md"));
        assert_eq!(
            sandbox.resolve_in_jail("/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }

    #[test]
    fn allow_path_recorded_before_activation() {
        let sandbox = Sandbox::global();
        sandbox.init().unwrap();
        // No activation in tests; just confirm the call is accepted.
        sandbox.allow_path("/workspace/shared");
        assert!(!sandbox.is_active());
    }
}
