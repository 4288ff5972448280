use std::process::ExitCode;

use ranger_core::config;
use ranger_exec::CacheProvisioner;

/// Print published Chrome-for-Testing versions, newest first.
pub async fn list_chrome(latest: Option<u32>) -> anyhow::Result<ExitCode> {
    let versions = CacheProvisioner::new(config::default_cache_dir())
        .known_versions()
        .await?;
    let limit = latest.map_or(versions.len(), |n| n as usize);
    for v in versions.iter().take(limit) {
        println!("{}", v.version);
    }
    Ok(ExitCode::SUCCESS)
}
