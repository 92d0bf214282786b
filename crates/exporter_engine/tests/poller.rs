mod common;

use std::time::Duration;

use common::{node, ClickEffect, FakeDom, FakeScope, NodeId};
use exporter_engine::{fetch_latest_artifact, ArtifactCache, ExportError, PollSettings};
use pretty_assertions::assert_eq;

const LAYOUT: &str = "Active Recruits Export";
const CSV_WITH_BOM: &[u8] = b"\xef\xbb\xbfName,Status\r\nAvery,Committed\r\nBlake,Signed\r\n";

fn job_table_headers(dom: &mut FakeDom) {
    for text in ["Submit Date", "Status", "File / Data Set"] {
        dom.add(node().hook("table thead th").text(text));
    }
}

/// Adds one job row; the third cell holds the download link.
fn job_row(dom: &mut FakeDom, row_text: &str, filename: &str, bytes: Option<&[u8]>) -> NodeId {
    let row = dom.add(node().hook("table tbody tr").text(row_text));
    dom.add(node().parent(row).hook("td"));
    dom.add(node().parent(row).hook("td"));
    let cell = dom.add(node().parent(row).hook("td"));
    let link = dom.add(node().parent(cell).hook("a").text(filename));
    if let Some(bytes) = bytes {
        dom.downloads.insert(link, bytes.to_vec());
    }
    link
}

fn short_poll() -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(1),
        deadline: Duration::from_secs(5),
        dedup: true,
    }
}

#[tokio::test(start_paused = true)]
async fn downloads_the_newest_matching_complete_row() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    job_table_headers(&mut dom);
    // Newest row first after the sort; an incomplete twin must be skipped.
    job_row(&mut dom, "08/29/2026 09:00 Incomplete", "active_recruits_export_9.csv", None);
    job_row(
        &mut dom,
        "08/29/2026 08:00 Complete",
        "active_recruits_export_8.csv",
        Some(CSV_WITH_BOM),
    );
    job_row(&mut dom, "08/28/2026 23:00 Complete", "coaches_export_7.csv", None);
    let scope = FakeScope::new(dom);

    let dir = tempfile::TempDir::new().unwrap();
    let mut cache = ArtifactCache::load(&dir.path().join("cache.json"));
    let artifact = fetch_latest_artifact(&scope, LAYOUT, &mut cache, &short_poll())
        .await
        .unwrap();

    assert_eq!(artifact.headers, vec!["Name", "Status"]);
    assert_eq!(
        artifact.rows,
        vec![
            vec!["Avery".to_string(), "Committed".to_string()],
            vec!["Blake".to_string(), "Signed".to_string()],
        ]
    );
    assert_eq!(cache.last_filename(LAYOUT), Some("active_recruits_export_8.csv"));
}

#[tokio::test(start_paused = true)]
async fn second_poll_for_the_same_file_is_deduplicated() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    job_table_headers(&mut dom);
    job_row(
        &mut dom,
        "08/29/2026 08:00 Complete",
        "active_recruits_export_8.csv",
        Some(CSV_WITH_BOM),
    );
    let scope = FakeScope::new(dom);

    let dir = tempfile::TempDir::new().unwrap();
    let cache_path = dir.path().join("cache.json");
    let mut cache = ArtifactCache::load(&cache_path);

    let first = fetch_latest_artifact(&scope, LAYOUT, &mut cache, &short_poll())
        .await
        .unwrap();
    assert_eq!(first.row_count(), 2);
    let persisted = std::fs::read_to_string(&cache_path).unwrap();

    let second = fetch_latest_artifact(&scope, LAYOUT, &mut cache, &short_poll())
        .await
        .unwrap();
    assert!(second.is_empty());
    assert_eq!(std::fs::read_to_string(&cache_path).unwrap(), persisted);
}

#[tokio::test(start_paused = true)]
async fn dedup_survives_a_process_restart() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    job_table_headers(&mut dom);
    job_row(
        &mut dom,
        "08/29/2026 08:00 Complete",
        "active_recruits_export_8.csv",
        Some(CSV_WITH_BOM),
    );
    let scope = FakeScope::new(dom);

    let dir = tempfile::TempDir::new().unwrap();
    let cache_path = dir.path().join("cache.json");

    let mut cache = ArtifactCache::load(&cache_path);
    fetch_latest_artifact(&scope, LAYOUT, &mut cache, &short_poll())
        .await
        .unwrap();

    // Fresh load, as a new process would see it.
    let mut reloaded = ArtifactCache::load(&cache_path);
    let again = fetch_latest_artifact(&scope, LAYOUT, &mut reloaded, &short_poll())
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test(start_paused = true)]
async fn times_out_when_no_matching_job_completes() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    job_table_headers(&mut dom);
    job_row(&mut dom, "08/29/2026 09:00 Incomplete", "active_recruits_export_9.csv", None);
    let scope = FakeScope::new(dom);

    let dir = tempfile::TempDir::new().unwrap();
    let mut cache = ArtifactCache::load(&dir.path().join("cache.json"));
    let err = fetch_latest_artifact(&scope, LAYOUT, &mut cache, &short_poll())
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::PollTimeout { .. }));
    assert!(err.to_string().contains(LAYOUT));
    assert_eq!(cache.last_filename(LAYOUT), None);
}

#[tokio::test(start_paused = true)]
async fn waits_for_a_job_that_completes_mid_poll() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    job_table_headers(&mut dom);
    let row = dom.add(node().hook("table tbody tr").text("08/29/2026 10:00 Pending"));
    dom.add(node().parent(row).hook("td"));
    dom.add(node().parent(row).hook("td"));
    let cell = dom.add(node().parent(row).hook("td"));
    let link = dom.add(node().parent(cell).hook("a").text("active_recruits_export_10.csv"));
    dom.downloads.insert(link, CSV_WITH_BOM.to_vec());
    let scope = FakeScope::new(dom);

    let dom_handle = scope.dom.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        dom_handle.lock().unwrap().nodes[row as usize].text =
            "08/29/2026 10:00 Complete".to_string();
    });

    let dir = tempfile::TempDir::new().unwrap();
    let mut cache = ArtifactCache::load(&dir.path().join("cache.json"));
    let artifact = fetch_latest_artifact(&scope, LAYOUT, &mut cache, &short_poll())
        .await
        .unwrap();

    assert_eq!(artifact.row_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn auto_refresh_toggle_is_switched_off() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    // A pressed button elsewhere on the page must never be the one clicked.
    let decoy = dom.add(node().hook("button[aria-pressed]").attr("aria-pressed", "true"));
    let banner_row = dom.add(node().hook("div").text("Note: this page will auto-refresh every minute"));
    dom.add(
        node()
            .parent(banner_row)
            .text("Note: this page will auto-refresh every minute"),
    );
    let toggle = dom.add(
        node()
            .parent(banner_row)
            .hook("button[aria-pressed]")
            .attr("aria-pressed", "true")
            .on_click(ClickEffect::SetAttr {
                id: 3,
                name: "aria-pressed",
                value: "false",
            }),
    );
    job_table_headers(&mut dom);
    job_row(
        &mut dom,
        "08/29/2026 08:00 Complete",
        "active_recruits_export_8.csv",
        Some(CSV_WITH_BOM),
    );
    let scope = FakeScope::new(dom);

    let dir = tempfile::TempDir::new().unwrap();
    let mut cache = ArtifactCache::load(&dir.path().join("cache.json"));
    fetch_latest_artifact(&scope, LAYOUT, &mut cache, &short_poll())
        .await
        .unwrap();

    let dom = scope.dom.lock().unwrap();
    assert_eq!(dom.clicks_on(toggle), 1);
    assert_eq!(dom.clicks_on(decoy), 0);
}

#[tokio::test(start_paused = true)]
async fn sort_header_is_clicked_twice_for_descending_order() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    job_table_headers(&mut dom);
    job_row(
        &mut dom,
        "08/29/2026 08:00 Complete",
        "active_recruits_export_8.csv",
        Some(CSV_WITH_BOM),
    );
    let scope = FakeScope::new(dom);

    let dir = tempfile::TempDir::new().unwrap();
    let mut cache = ArtifactCache::load(&dir.path().join("cache.json"));
    fetch_latest_artifact(&scope, LAYOUT, &mut cache, &short_poll())
        .await
        .unwrap();

    // The "Submit Date" header is node 0.
    assert_eq!(scope.dom.lock().unwrap().clicks_on(0), 2);
}
