mod common;

use std::time::Duration;

use common::{node, ClickEffect, FakeDom, FakeScope, FakeSink};
use exporter_core::ExportSpec;
use exporter_engine::{run_batch, ArtifactCache, ExportError, PollSettings};
use pretty_assertions::assert_eq;

const RECRUITS_CSV: &[u8] = b"\xef\xbb\xbfName,Status\r\nAvery,Committed\r\nBlake,Signed\r\n";

fn spec(name: &str, tab: &str, layout: &str) -> ExportSpec {
    ExportSpec {
        name: name.to_string(),
        destination_tab: tab.to_string(),
        grad_year: None,
        statuses: Vec::new(),
        layout_display_name: layout.to_string(),
    }
}

fn short_poll(dedup: bool) -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(1),
        deadline: Duration::from_secs(3),
        dedup,
    }
}

/// The whole site in one fake document: left navigation, filter panel,
/// toolbar export menu with two layouts, and the admin job table holding one
/// finished recruits artifact.
fn full_site(dom: &mut FakeDom) {
    dom.add(node().role("link").label("Recruiting"));
    dom.add(node().role("link").label("Recruits"));
    dom.add(node().text("Grad. Year"));
    let status_section = dom.add(node().hook("div").text("Status"));
    dom.add(node().parent(status_section).role("link").label("all"));

    let dropdown = dom.add(node().hook("#exportLayout").hidden());
    let recruits_option = dom.add(node().role("option").label("Active Recruits Export").hidden());
    let coaches_option = dom.add(node().role("option").label("Coaches Export").hidden());
    let submit = dom.add(node().role("button").label("Export").hidden());
    dom.nodes[dropdown as usize].on_click.push(ClickEffect::Reveal(recruits_option));
    dom.nodes[dropdown as usize].on_click.push(ClickEffect::Reveal(coaches_option));

    let surface = dom.add(node().hook("[role='menu']").hidden());
    dom.add(
        node()
            .hook("div[role='toolbar'] button")
            .at(620.0, 40.0)
            .on_click(ClickEffect::Reveal(surface)),
    );
    dom.add(
        node()
            .parent(surface)
            .hook("[data-cy='export']")
            .on_click(ClickEffect::Hide(surface))
            .on_click(ClickEffect::Reveal(dropdown))
            .on_click(ClickEffect::Reveal(submit)),
    );

    for text in ["Submit Date", "Status", "File / Data Set"] {
        dom.add(node().hook("table thead th").text(text));
    }
    let row = dom.add(node().hook("table tbody tr").text("08/29/2026 Complete"));
    dom.add(node().parent(row).hook("td"));
    dom.add(node().parent(row).hook("td"));
    let cell = dom.add(node().parent(row).hook("td"));
    let link = dom.add(node().parent(cell).hook("a").text("active_recruits_export_8.csv"));
    dom.downloads.insert(link, RECRUITS_CSV.to_vec());
}

#[tokio::test(start_paused = true)]
async fn one_failed_spec_does_not_stop_the_batch() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    full_site(&mut dom);
    let scope = FakeScope::new(dom);

    let specs = vec![
        // No coaches artifact ever appears, so this one times out.
        spec("coaches_export", "Coaches", "Coaches Export"),
        spec("active_recruits", "Recruits2026", "Active Recruits Export"),
    ];
    let dir = tempfile::TempDir::new().unwrap();
    let mut cache = ArtifactCache::load(&dir.path().join("cache.json"));
    let sink = FakeSink::default();

    let reports = run_batch(&scope, &specs, &mut cache, &sink, &short_poll(false)).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].name, "coaches_export");
    assert!(matches!(
        reports[0].outcome,
        Err(ExportError::PollTimeout { .. })
    ));
    assert_eq!(reports[1].outcome.as_ref().copied().unwrap(), 2);

    let writes = sink.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "Recruits2026");
    assert_eq!(writes[0].1.rows.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn sink_refusal_is_contained_to_its_spec() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    full_site(&mut dom);
    let scope = FakeScope::new(dom);

    let specs = vec![
        spec("first", "Broken", "Active Recruits Export"),
        spec("second", "Recruits2026", "Active Recruits Export"),
    ];
    let dir = tempfile::TempDir::new().unwrap();
    let mut cache = ArtifactCache::load(&dir.path().join("cache.json"));
    let sink = FakeSink {
        fail_tabs: vec!["Broken".to_string()],
        ..FakeSink::default()
    };

    let reports = run_batch(&scope, &specs, &mut cache, &sink, &short_poll(false)).await;

    assert!(matches!(reports[0].outcome, Err(ExportError::Sink(_))));
    assert_eq!(reports[1].outcome.as_ref().copied().unwrap(), 2);
    assert_eq!(sink.writes.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dedup_skips_the_write_on_a_repeat_run() {
    let mut dom = FakeDom::new("https://app.example/admin/exports");
    full_site(&mut dom);
    let scope = FakeScope::new(dom);

    let specs = vec![spec("active_recruits", "Recruits2026", "Active Recruits Export")];
    let dir = tempfile::TempDir::new().unwrap();
    let mut cache = ArtifactCache::load(&dir.path().join("cache.json"));
    let sink = FakeSink::default();

    let first = run_batch(&scope, &specs, &mut cache, &sink, &short_poll(true)).await;
    assert_eq!(first[0].outcome.as_ref().copied().unwrap(), 2);

    let second = run_batch(&scope, &specs, &mut cache, &sink, &short_poll(true)).await;
    assert_eq!(second[0].outcome.as_ref().copied().unwrap(), 0);
    assert_eq!(sink.writes.lock().unwrap().len(), 1);
}
