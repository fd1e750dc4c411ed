use std::{
    fs::File,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use crossbeam_deque::{Injector, Worker};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    build_client,
    filter::{Comparison, ExclusionManager},
    listing::{DirArena, DirId, DirNode},
    parser::{HtmlParser, ParseContext},
    remote::RemoteRegistry,
    session::Session,
    utils::{self, again},
    IndexArgs,
};

#[derive(Debug, Clone)]
struct Task {
    dir: DirId,
    relative: Vec<String>,
    url: Url,
}

pub fn index(args: IndexArgs) -> ! {
    debug!("{:?}", args);

    if !matches!(args.upstream.scheme(), "http" | "https") {
        error!("Only HTTP(S) roots can be fetched");
        std::process::exit(2);
    }

    let exclusion_manager = ExclusionManager::new(args.exclude.clone(), args.include.clone());
    let client = build_client!(reqwest::blocking::Client, args);
    let session = Session::new(args.threads);
    let parser = HtmlParser::new(RemoteRegistry::default());

    let arena = Mutex::new(DirArena::new());
    let root = arena
        .lock()
        .unwrap()
        .alloc(args.upstream.clone(), None);

    let workers: Vec<_> = (0..args.threads)
        .map(|_| Worker::<Task>::new_fifo())
        .collect();
    let stealers: Vec<_> = workers.iter().map(|w| w.stealer()).collect();
    let global = Injector::<Task>::new();
    global.push(Task {
        dir: root,
        relative: vec![],
        url: args.upstream.clone(),
    });

    let active_cnt = AtomicUsize::new(0);
    let wake = AtomicUsize::new(0);
    let done = AtomicBool::new(false);
    let failure_listing = AtomicBool::new(false);

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );

    std::thread::scope(|scope| {
        for (worker_index, worker) in workers.into_iter().enumerate() {
            let stealers = &stealers;
            let parser = &parser;
            let client = client.clone();
            let global = &global;
            let session = &session;
            let arena = &arena;
            let exclusion_manager = exclusion_manager.clone();
            let args = &args;

            let active_cnt = &active_cnt;
            let wake = &wake;
            let done = &done;
            let failure_listing = &failure_listing;
            let progress = progress.clone();
            scope.spawn(move || {
                loop {
                    if done.load(Ordering::SeqCst) {
                        break;
                    }
                    // parked when the session cap was clamped below us
                    if worker_index >= session.max_threads() {
                        std::thread::sleep(std::time::Duration::from_millis(100));
                        continue;
                    }
                    active_cnt.fetch_add(1, Ordering::SeqCst);
                    while let Some(task) = worker.pop().or_else(|| {
                        std::iter::repeat_with(|| {
                            global
                                .steal_batch_and_pop(&worker)
                                .or_else(|| stealers.iter().map(|s| s.steal()).collect())
                        })
                        .find(|s| !s.is_retry())
                        .and_then(|s| s.success())
                    }) {
                        let relative = task.relative.join("/");
                        if exclusion_manager.match_str(&relative) == Comparison::Stop {
                            info!("Skipping excluded {:?}", relative);
                            continue;
                        }
                        info!("Listing {}", task.url);
                        progress.set_message(task.url.to_string());
                        progress.tick();

                        let html = match again(
                            || Ok(utils::get(&client, task.url.clone())?.text()?),
                            args.retry,
                        ) {
                            Ok(html) => html,
                            Err(e) => {
                                error!("Failed to fetch {}: {:?}", task.url, e);
                                failure_listing.store(true, Ordering::SeqCst);
                                let mut arena = arena.lock().unwrap();
                                let node = arena.get_mut(task.dir);
                                node.error = true;
                                node.finished = true;
                                node.finish_time = Some(chrono::Utc::now());
                                continue;
                            }
                        };

                        let subdirs = {
                            let mut arena = arena.lock().unwrap();
                            arena.get_mut(task.dir).start_time = Some(chrono::Utc::now());
                            let ctx = ParseContext {
                                client: Some(&client),
                                session,
                                check_parents: !args.no_parent_check,
                            };
                            if let Err(e) = parser.parse_html(&mut arena, task.dir, &html, &ctx) {
                                warn!("Parse of {} interrupted: {:?}", task.url, e);
                                break;
                            }
                            let node = arena.get_mut(task.dir);
                            node.finished = true;
                            node.finish_time = Some(chrono::Utc::now());
                            if node.error {
                                failure_listing.store(true, Ordering::SeqCst);
                                Vec::new()
                            } else {
                                let ids = node.subdirs.clone();
                                ids.into_iter()
                                    .map(|id| {
                                        let child = arena.get(id);
                                        (id, child.url.clone(), child.name.clone())
                                    })
                                    .collect()
                            }
                        };

                        for (dir, url, name) in subdirs {
                            let mut relative = task.relative.clone();
                            relative.push(name);
                            worker.push(Task { dir, relative, url });
                            wake.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    let active = active_cnt.fetch_sub(1, Ordering::SeqCst);
                    if active == 1 {
                        // only self was active: the queues are drained
                        done.store(true, Ordering::SeqCst);
                        break;
                    }
                    // sleep and wait for waking up
                    debug!("Sleep and wait for waking up");
                    loop {
                        if done.load(Ordering::SeqCst) {
                            return;
                        }
                        std::thread::sleep(std::time::Duration::from_millis(100));
                        let old_wake = wake.load(Ordering::SeqCst);
                        if old_wake > 0 {
                            let new_wake = old_wake - 1;
                            if wake
                                .compare_exchange(
                                    old_wake,
                                    new_wake,
                                    Ordering::SeqCst,
                                    Ordering::SeqCst,
                                )
                                .is_ok()
                            {
                                break;
                            }
                        }
                    }
                }
                info!("This thread finished");
            });
        }
    });
    progress.finish_and_clear();

    let arena = arena.into_inner().unwrap();
    let (dirs, files, bytes, errors) = summarize(&arena, root);
    info!(
        "Indexed {} directories, {} files ({}), {} errors",
        dirs,
        files,
        humansize::format_size(bytes, humansize::BINARY),
        errors
    );

    if let Some(output) = &args.output {
        let report = build_report(&arena, root);
        match File::create(output) {
            Ok(file) => {
                if let Err(e) = serde_json::to_writer_pretty(file, &report) {
                    error!("Failed to write report: {:?}", e);
                    std::process::exit(3);
                }
                info!("Report written to {:?}", output);
            }
            Err(e) => {
                error!("Failed to create {:?}: {:?}", output, e);
                std::process::exit(3);
            }
        }
    }

    let exit_code = if failure_listing.load(Ordering::SeqCst) { 1 } else { 0 };
    std::process::exit(exit_code);
}

fn summarize(arena: &DirArena, root: DirId) -> (usize, usize, u64, usize) {
    let mut dirs = 0;
    let mut files = 0;
    let mut bytes = 0;
    let mut errors = 0;
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = arena.get(id);
        dirs += 1;
        if node.error {
            errors += 1;
        }
        files += node.files.len();
        bytes += node
            .files
            .iter()
            .filter_map(|f| f.size.map(|s| s.get_estimated()))
            .sum::<u64>();
        stack.extend(node.subdirs.iter().copied());
    }
    (dirs, files, bytes, errors)
}

#[derive(Serialize)]
struct ReportFile {
    url: String,
    name: String,
    size: Option<u64>,
    mtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Serialize)]
struct ReportDir {
    url: String,
    name: String,
    parser: Option<String>,
    error: bool,
    finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_time: Option<String>,
    files: Vec<ReportFile>,
    subdirectories: Vec<ReportDir>,
}

fn build_report(arena: &DirArena, id: DirId) -> ReportDir {
    let node: &DirNode = arena.get(id);
    ReportDir {
        url: node.url.to_string(),
        name: node.name.clone(),
        parser: node.dialect.map(|d| d.to_string()),
        error: node.error,
        finished: node.finished,
        start_time: node.start_time.map(|t| t.to_rfc3339()),
        finish_time: node.finish_time.map(|t| t.to_rfc3339()),
        files: node
            .files
            .iter()
            .map(|f| ReportFile {
                url: f.url.to_string(),
                name: f.name.clone(),
                size: f.size.map(|s| s.get_estimated()),
                mtime: f.mtime.map(|t| t.to_string()),
                description: f.description.clone(),
            })
            .collect(),
        subdirectories: node
            .subdirs
            .iter()
            .map(|sub| build_report(arena, *sub))
            .collect(),
    }
}
