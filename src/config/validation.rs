use super::defaults::{
    HEADLESS_ENV, MAX_CLIENT_QUEUE_CAPACITY, MAX_DELAY_MS, MIN_CLIENT_QUEUE_CAPACITY,
};
use super::{BridgeConfig, EngineCommand};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

impl BridgeConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        split_engine_command(&self.sclang_cmd)?;

        self.startup_script = canonical_file(&self.startup_script)
            .with_context(|| "--startup-script must name an existing file".to_string())?;

        for entry in &self.engine_env {
            parse_env_pair(entry)?;
        }

        fs::create_dir_all(&self.staging_dir).with_context(|| {
            format!(
                "failed to create --staging-dir {}",
                self.staging_dir.display()
            )
        })?;
        self.staging_dir = self.staging_dir.canonicalize().with_context(|| {
            format!("failed to resolve --staging-dir {}", self.staging_dir.display())
        })?;

        if !(MIN_CLIENT_QUEUE_CAPACITY..=MAX_CLIENT_QUEUE_CAPACITY)
            .contains(&self.client_queue_capacity)
        {
            bail!(
                "--client-queue-capacity must be between {MIN_CLIENT_QUEUE_CAPACITY} and {MAX_CLIENT_QUEUE_CAPACITY}, got {}",
                self.client_queue_capacity
            );
        }
        if !(1..=MAX_DELAY_MS).contains(&self.restart_delay_ms) {
            bail!(
                "--restart-delay-ms must be between 1 and {MAX_DELAY_MS}, got {}",
                self.restart_delay_ms
            );
        }
        if !(1..=MAX_DELAY_MS).contains(&self.artifact_ttl_ms) {
            bail!(
                "--artifact-ttl-ms must be between 1 and {MAX_DELAY_MS}, got {}",
                self.artifact_ttl_ms
            );
        }

        Ok(())
    }

    /// Engine launch parameters. Call after [`BridgeConfig::validate`].
    pub fn engine_command(&self) -> Result<EngineCommand> {
        let (program, args) = split_engine_command(&self.sclang_cmd)?;
        let mut env: Vec<(String, String)> = HEADLESS_ENV
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        for entry in &self.engine_env {
            let (key, value) = parse_env_pair(entry)?;
            env.retain(|(existing, _)| existing != &key);
            env.push((key, value));
        }
        Ok(EngineCommand {
            program,
            args,
            env,
            startup_script: self.startup_script.clone(),
            restart_delay: self.restart_delay(),
        })
    }
}

pub(super) fn split_engine_command(raw: &str) -> Result<(String, Vec<String>)> {
    let mut words = shell_words::split(raw)
        .map_err(|err| anyhow!("--sclang-cmd is not a valid command line: {err}"))?;
    if words.is_empty() {
        bail!("--sclang-cmd cannot be empty");
    }
    let program = words.remove(0);
    if program.contains('\0') || words.iter().any(|arg| arg.contains('\0')) {
        bail!("--sclang-cmd cannot contain NUL bytes");
    }
    Ok((program, words))
}

pub(super) fn parse_env_pair(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("--engine-env expects KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        bail!("--engine-env key cannot be empty ({raw:?})");
    }
    if key.contains('\0') || value.contains('\0') {
        bail!("--engine-env cannot contain NUL bytes");
    }
    Ok((key.to_string(), value.to_string()))
}

pub(super) fn canonical_file(path: &Path) -> Result<PathBuf> {
    let resolved = path
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", path.display()))?;
    if !resolved.is_file() {
        bail!("{} is not a file", resolved.display());
    }
    Ok(resolved)
}
