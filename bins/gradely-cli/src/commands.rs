// Command implementations for the Gradely CLI

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use gradely_common::status::SolutionStatus;
use gradely_common::types::SolutionKind;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Shape of the API's solution responses that the CLI cares about.
#[derive(Debug, Deserialize)]
struct SolutionView {
    solution_id: Uuid,
    status: SolutionStatus,
    test_output: Option<String>,
    return_code: Option<i32>,
}

fn parse_kind(kind: &str) -> Result<SolutionKind> {
    kind.parse()
        .map_err(|_| anyhow::anyhow!("invalid kind '{}', expected education or competition", kind))
}

fn parse_id(id: Option<&str>) -> Result<Uuid> {
    match id {
        Some(id) => Uuid::parse_str(id).context("invalid uuid"),
        None => Ok(Uuid::new_v4()),
    }
}

fn print_view(view: &SolutionView) {
    println!("solution: {}", view.solution_id);
    println!("status:   {}", view.status);
    if let Some(return_code) = view.return_code {
        println!("return:   {}", return_code);
    }
    if let Some(output) = &view.test_output {
        println!("output:\n{}", output);
    }
}

pub async fn submit(
    api: &str,
    kind: &str,
    student: Option<&str>,
    task: Option<&str>,
    code: Option<String>,
    file: Option<&str>,
    url: Option<String>,
    gradable: bool,
    watch_after: bool,
) -> Result<()> {
    let kind = parse_kind(kind)?;

    let file_payload = match file {
        Some(path) => {
            let content = std::fs::read(path)
                .with_context(|| format!("failed to read submission file {}", path))?;
            let name = std::path::Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "submission".to_string());
            Some(json!({
                "name": name,
                "content_b64": general_purpose::STANDARD.encode(content),
            }))
        }
        None => None,
    };

    let body = json!({
        "student_id": parse_id(student)?,
        "task_id": parse_id(task)?,
        "kind": kind,
        "gradable": gradable,
        "code": code,
        "file": file_payload,
        "url": url,
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/solutions", api.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("failed to reach the Gradely API")?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        bail!("submission rejected ({}): {}", status, detail);
    }

    let view: SolutionView = response.json().await.context("undecodable API response")?;
    println!("✓ Solution submitted");
    print_view(&view);

    if watch_after && !view.status.is_terminal() {
        watch(api, kind.as_str(), &view.solution_id.to_string(), 2).await?;
    }

    Ok(())
}

pub async fn status(api: &str, kind: &str, id: &str) -> Result<()> {
    let view = fetch(api, kind, id).await?;
    print_view(&view);
    Ok(())
}

pub async fn watch(api: &str, kind: &str, id: &str, interval_secs: u64) -> Result<()> {
    let mut last: Option<SolutionStatus> = None;
    loop {
        let view = fetch(api, kind, id).await?;
        if last != Some(view.status) {
            println!("status: {}", view.status);
            last = Some(view.status);
        }
        if view.status.is_terminal() {
            print_view(&view);
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;
    }
}

async fn fetch(api: &str, kind: &str, id: &str) -> Result<SolutionView> {
    let kind = parse_kind(kind)?;
    let id = Uuid::parse_str(id).context("invalid solution id")?;

    let response = reqwest::get(format!(
        "{}/solutions/{}/{}",
        api.trim_end_matches('/'),
        kind,
        id
    ))
    .await
    .context("failed to reach the Gradely API")?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        bail!("lookup failed ({}): {}", status, detail);
    }

    response.json().await.context("undecodable API response")
}
