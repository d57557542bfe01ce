//! Scheduler handoff: claim a task, execute it, report the outcome.

use std::time::Duration;

use analyzer_core::api::{ClaimRequest, ClaimResponse, CompleteRequest, CompleteResponse};
use analyzer_core::{Analyzer, Storage};
use analyzer_plugins::Registry;
use anyhow::Result;

pub struct PollOptions {
    pub scheduler: String,
    pub analyzers: Vec<String>,
    pub poll_ms: u64,
    pub once: bool,
}

/// Round-robins claims over the selected analyzers until interrupted. With
/// `once`, returns after the first claim attempt that yields a task, or after a
/// full round with none.
pub async fn poll_loop(registry: &Registry, storage: &Storage, opts: PollOptions) -> Result<()> {
    let analyzers: Vec<String> = if opts.analyzers.is_empty() {
        registry.names().map(String::from).collect()
    } else {
        opts.analyzers.clone()
    };
    for name in &analyzers {
        if registry.get(name).is_none() {
            anyhow::bail!("analyzer {name} is not registered");
        }
    }

    let client = reqwest::Client::new();
    let idle = Duration::from_millis(opts.poll_ms);

    loop {
        let mut claimed_any = false;
        for name in &analyzers {
            let claimed = tokio::select! {
                res = poll_once(&client, registry, storage, &opts.scheduler, name) => res?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("interrupted, abandoning current analysis");
                    return Ok(());
                }
            };
            claimed_any |= claimed;
            if claimed && opts.once {
                return Ok(());
            }
        }
        if opts.once {
            return Ok(());
        }
        if !claimed_any {
            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = tokio::signal::ctrl_c() => return Ok(()),
            }
        }
    }
}

/// One claim for `name`. Returns whether a task was claimed.
async fn poll_once(
    client: &reqwest::Client,
    registry: &Registry,
    storage: &Storage,
    scheduler: &str,
    name: &str,
) -> Result<bool> {
    let claim_url = format!("{scheduler}/v1/analyzer/claim");
    let resp = client
        .post(&claim_url)
        .json(&ClaimRequest {
            analyzer: name.to_string(),
        })
        .send()
        .await?;

    if !resp.status().is_success() {
        tracing::warn!(status = %resp.status(), analyzer = %name, "claim failed");
        return Ok(false);
    }

    let ClaimResponse { task } = resp.json::<ClaimResponse>().await?;
    let Some(task) = task else {
        return Ok(false);
    };

    tracing::info!(
        analyzer = %name,
        case = %task.case_id(),
        collection = %task.collection_id(),
        priority = ?task.analysis.priority,
        "claimed task"
    );

    // a task for another analyzer fails its precondition check and is reported
    let analyzer = registry
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("analyzer {name} is not registered"))?;
    let result = analyzer.execute(storage, &task).await;

    let complete_url = format!("{scheduler}/v1/analyzer/complete");
    let resp = client
        .post(&complete_url)
        .json(&CompleteRequest::from_result(&task, &result))
        .send()
        .await?;

    if resp.status().is_success() {
        let ack = resp.json::<CompleteResponse>().await?;
        if ack.ok {
            tracing::info!(analyzer = %name, success = result.is_success(), "completed task");
        } else {
            tracing::warn!(analyzer = %name, message = ?ack.message, "completion not acknowledged");
        }
    } else {
        tracing::warn!(status = %resp.status(), analyzer = %name, "completion rejected");
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyzer_plugins::Config;

    #[tokio::test]
    async fn unknown_analyzer_is_rejected_before_claiming() {
        let registry = Registry::from_config(&Config::with_storage_root("/srv/evidence"));
        let storage = Storage::new("/srv/evidence");
        let opts = PollOptions {
            // nothing listens here; the loop must fail before connecting
            scheduler: "http://127.0.0.1:9".into(),
            analyzers: vec!["plaso".into()],
            poll_ms: 10,
            once: true,
        };

        let err = poll_loop(&registry, &storage, opts).await.unwrap_err();
        assert!(err.to_string().contains("plaso"));
    }
}
