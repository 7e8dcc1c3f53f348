//! Caller identity resolution (process id -> application identity).

/// Failure to resolve an identity for a process id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupError {
    pub pid: u32,
    pub reason: String,
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cannot resolve identity of pid {}: {}", self.pid, self.reason)
    }
}

impl std::error::Error for LookupError {}

/// Maps a process id to the application identity used as `caller_id`.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, pid: u32) -> Result<String, LookupError>;
}

impl<F> IdentityResolver for F
where
    F: Fn(u32) -> Result<String, LookupError> + Send + Sync,
{
    fn resolve(&self, pid: u32) -> Result<String, LookupError> {
        self(pid)
    }
}

/// Resolves identities from the kernel's process name (`/proc/<pid>/comm`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessNameResolver;

impl IdentityResolver for ProcessNameResolver {
    fn resolve(&self, pid: u32) -> Result<String, LookupError> {
        let path = format!("/proc/{}/comm", pid);
        let name = std::fs::read_to_string(&path).map_err(|e| LookupError {
            pid,
            reason: e.to_string(),
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(LookupError {
                pid,
                reason: "empty process name".to_string(),
            });
        }
        Ok(name.to_string())
    }
}

/// Resolves `pid` and falls back to an empty identity on failure.
pub fn resolve_or_empty(resolver: &dyn IdentityResolver, pid: u32) -> String {
    match resolver.resolve(pid) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("{}", e);
            crate::daemon_log::daemon_log("identity", &e.to_string());
            String::new()
        }
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
