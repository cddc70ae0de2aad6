//! Crawler behavior across thread counts.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use sysobj::{CrawlOptions, Engine, EngineConfig, EndReason, VirtualObject, crawl};

fn init_logging() {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::TRACE)
        .without_time()
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(sub);
}

/// `:/t` with `width` directories of `width` leaves each, plus a link to
/// the first directory. Returns the engine and how many distinct requested
/// paths a full crawl visits.
fn tree(width: usize) -> (Engine, usize) {
    init_logging();
    let mut b = Engine::builder(EngineConfig::default().with_builtins(false));
    b.add_virtual(VirtualObject::auto_dir(":/t"));
    let mut count = 1;
    for d in 0..width {
        b.add_virtual(VirtualObject::auto_dir(format!(":/t/d{d}")));
        count += 1;
        for l in 0..width {
            b.add_virtual(VirtualObject::string(format!(":/t/d{d}/l{l}"), l.to_string()));
            count += 1;
        }
    }
    b.add_virtual(VirtualObject::symlink(":/t/alias", ":/t/d0"));
    count += 1;
    (b.build().unwrap(), count)
}

#[test]
fn visits_each_node_once_for_any_thread_count() {
    let (engine, expected) = tree(6);
    for threads in [1, 2, 4, 8] {
        let options = CrawlOptions::default()
            .with_roots([":/t"])
            .with_threads(threads);
        let mut seen = Vec::new();
        let report = crawl::foreach(&engine, &[], &options, |node, _| {
            seen.push(node.path_req().to_string());
            true
        });

        let unique: HashSet<&String> = seen.iter().collect();
        assert_eq!(unique.len(), seen.len(), "duplicate visit with {threads} threads");
        assert_eq!(seen.len(), expected, "wrong count with {threads} threads");
        assert_eq!(report.stats.visited as usize, expected);
        assert_eq!(report.stats.threads, threads);
        assert_eq!(report.end, EndReason::Exhausted);
    }
}

#[test]
fn linked_directories_are_not_descended() {
    let (engine, _) = tree(3);
    let options = CrawlOptions::default().with_roots([":/t"]).with_threads(2);
    let mut seen = Vec::new();
    crawl::foreach(&engine, &[], &options, |node, _| {
        seen.push((node.path_req().to_string(), node.path().to_string()));
        true
    });

    assert!(seen.contains(&(":/t/alias".to_string(), ":/t/d0".to_string())));
    assert!(!seen.iter().any(|(req, _)| req.starts_with(":/t/alias/")));
}

#[test]
fn stop_after_first_visit() {
    let (engine, _) = tree(6);
    for threads in [1, 4] {
        let options = CrawlOptions::default()
            .with_roots([":/t"])
            .with_threads(threads);
        let mut calls = 0u64;
        let report = crawl::foreach(&engine, &[], &options, |_, _| {
            calls += 1;
            false
        });
        assert_eq!(report.end, EndReason::Interrupted);
        assert!((1..=threads as u64).contains(&report.stats.visited));
        assert_eq!(calls, report.stats.visited);
    }
}

#[test]
fn stop_after_n_visits() {
    let (engine, _) = tree(6);
    let options = CrawlOptions::default().with_roots([":/t"]).with_threads(4);
    let report = crawl::foreach(&engine, &[], &options, |_, stats| stats.visited < 5);
    assert_eq!(report.end, EndReason::Interrupted);
    assert_eq!(report.stats.visited, 5);
}

#[test]
fn idle_workers_retire_at_wait_ceiling() {
    let (engine, expected) = tree(3);
    let mut options = CrawlOptions::default().with_roots([":/t"]).with_threads(4);
    options.wait_step = Duration::from_millis(1);
    options.wait_ceiling = Duration::from_millis(10);

    let mut visited = 0;
    let report = crawl::foreach(&engine, &[], &options, |node, _| {
        if node.path() == ":/t" {
            // hold the only item long enough for the idle workers to give up
            thread::sleep(Duration::from_millis(200));
        }
        visited += 1;
        true
    });

    // the busy worker still finishes the whole tree alone
    assert_eq!(visited, expected);
    assert_eq!(report.end, EndReason::Exhausted);
    assert!(report.stats.waited > options.wait_ceiling);
}

#[test]
fn multiple_roots_share_one_visit_set() {
    let (engine, expected) = tree(2);
    let options = CrawlOptions::default()
        .with_roots([":/t", ":/t/d1"])
        .with_threads(2);
    let mut seen = Vec::new();
    crawl::foreach(&engine, &[], &options, |node, _| {
        seen.push(node.path_req().to_string());
        true
    });
    let unique: HashSet<&String> = seen.iter().collect();
    assert_eq!(unique.len(), seen.len());
    assert_eq!(seen.len(), expected);
}
