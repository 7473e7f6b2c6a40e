//! `tally count`: build a request from the command line and run it

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tally_config::path::normalize_or_original;
use tally_config::{log_cli_debug, log_cli_info, log_scan_info, log_scan_warn};
use tally_core::{RootRequest, ScanOptions, WordCountResult, WordCounter};
use tally_ipc::client::DaemonClient;

/// Split `KEY=PATH`; anything else is a bare path
///
/// A `=` only separates a key when the text before it contains no path
/// separator, so `./a=b` stays a path.
pub fn parse_root_arg(arg: &str) -> (Option<&str>, &str) {
    match arg.split_once('=') {
        Some((key, path)) if !key.is_empty() && !key.contains('/') => (Some(key), path),
        _ => (None, arg),
    }
}

/// Merge `--request` file entries and positional roots into one request
///
/// Bare paths are keyed `"1"`, `"2"`, … in the order given. A key may only
/// appear once across both sources.
pub fn build_request(roots: &[String], request_file: Option<&Path>) -> Result<RootRequest> {
    let mut entries: Vec<(String, PathBuf)> = Vec::new();

    if let Some(file) = request_file {
        let contents = fs::read_to_string(file)
            .with_context(|| format!("Failed to read request file {}", file.display()))?;
        let from_file: RootRequest = serde_json::from_str(&contents)
            .with_context(|| format!("Request file {} is not a JSON object of paths", file.display()))?;
        entries.extend(from_file.iter().map(|(k, p)| (k.clone(), p.clone())));
    }

    let mut bare = 0usize;
    for arg in roots {
        let (key, path) = match parse_root_arg(arg) {
            (Some(key), path) => (key.to_string(), path),
            (None, path) => {
                bare += 1;
                (bare.to_string(), path)
            }
        };
        entries.push((key, PathBuf::from(path)));
    }

    let mut request = RootRequest::new();
    for (key, path) in entries {
        if request.iter().any(|(existing, _)| existing == &key) {
            bail!("Root key '{}' given more than once", key);
        }
        let resolved = normalize_or_original(&path);
        log_cli_debug!("Root", key = key.as_str(), path = resolved.display().to_string());
        request.insert(key, resolved);
    }
    Ok(request)
}

/// Count in this process on a fresh worker pool
pub fn count_local(request: &RootRequest, options: ScanOptions, show_stats: bool) -> Result<WordCountResult> {
    let counter = WordCounter::new(options)?;
    log_cli_info!("Counting locally", roots = request.len(), threads = counter.threads());

    let outcomes = counter.traverse(request);
    if show_stats {
        for (key, outcome) in &outcomes {
            let stats = serde_json::to_string(&outcome.stats)?;
            eprintln!("{}: {} (completed: {})", key, stats, outcome.completed);
        }
    }
    for (key, outcome) in &outcomes {
        log_scan_info!(
            "Root finished",
            key = key.as_str(),
            files = outcome.stats.files_counted,
            words = outcome.frequencies.len(),
        );
        if !outcome.completed {
            log_scan_warn!("Deadline reached, result is partial", key = key.as_str());
        }
    }

    Ok(outcomes
        .into_iter()
        .map(|(key, outcome)| (key, outcome.frequencies))
        .collect())
}

/// Send the request to a running tallyd
pub async fn count_via_daemon(request: RootRequest, socket: &Path) -> Result<WordCountResult> {
    let mut client = DaemonClient::connect_to(socket)
        .await
        .with_context(|| format!("Failed to connect to tallyd at {}", socket.display()))?;
    let server_version = client.handshake().await?;
    log_cli_info!(
        "Counting via daemon",
        roots = request.len(),
        server_version = server_version.as_str(),
    );
    Ok(client.count_words(request).await?)
}

pub fn print_result(result: &WordCountResult, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{}", json);
    Ok(())
}
