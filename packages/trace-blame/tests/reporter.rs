use std::sync::{Arc, Mutex};

use trace_blame::reporter::{self as reporting, SAVE_FAILURE_KEY};
use trace_blame::{
    BugRecord, ComponentKind, ComponentRef, Config, Engine, Failure, FrameParser, HostChannel,
    LogLevel, MethodHandle, ModuleId, PatchChain, PatchLayer, Reporter, ResolutionFailure,
    SymbolSnapshot, SymbolTable, TypeDescriptor, TypeEntry,
};

#[derive(Default)]
struct RecordingHost {
    ready: Mutex<Vec<String>>,
    failures: Mutex<Vec<ResolutionFailure>>,
}

impl HostChannel for RecordingHost {
    fn record_ready(&self, record: &Arc<BugRecord>) {
        self.ready.lock().unwrap().push(record.error_message());
    }

    fn report_failure(&self, _record: &BugRecord, failure: &ResolutionFailure) {
        self.failures.lock().unwrap().push(failure.clone());
    }
}

fn snapshot() -> SymbolSnapshot {
    SymbolSnapshot::default()
        .with_type(TypeEntry::new("Game.Level", "Level.dll").method("Load", ["System.Int32"]))
        .with_component(
            ComponentRef::new("LevelMod", "3.2", ComponentKind::Standalone).with_module("Level.dll"),
        )
}

fn reporter_with(engine: Engine, host: Arc<RecordingHost>) -> Reporter {
    let config = Config {
        worker_threads: 2,
        ..Config::default()
    };
    Reporter::new(engine, Arc::new(snapshot()), host, config).expect("reporter")
}

fn reporter(host: Arc<RecordingHost>) -> Reporter {
    let table = Arc::new(snapshot());
    reporter_with(Engine::new(FrameParser::default(), table.clone(), table), host)
}

#[test]
fn log_and_explicit_paths_share_one_dedup_registry() {
    let host = Arc::new(RecordingHost::default());
    let reporter = reporter(host.clone());
    let trace = "Game.Level:Load (int)";

    let first = reporter
        .report_exception(Some("Loading"), Failure::new("Exception", "boom", trace), Vec::new())
        .expect("first report is admitted");
    assert!(reporter.on_log_received("boom", trace, LogLevel::Exception).is_none());
    assert!(reporter
        .report_exception(None, Failure::new("Exception", "boom", trace), Vec::new())
        .is_none());

    reporter.wait_idle();

    assert_eq!(reporter.registry().len(), 1);
    assert_eq!(host.ready.lock().unwrap().as_slice(), ["Loading: boom"]);

    let next = reporter.take_next_ready().expect("ready record");
    assert!(Arc::ptr_eq(&next, &first));
    assert!(reporter.queue().is_empty());
}

#[test]
fn concurrent_reports_of_one_failure_create_one_record() {
    let host = Arc::new(RecordingHost::default());
    let reporter = reporter(host.clone());
    let trace = "Game.Level:Load (int)";

    let admitted: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reporter = &reporter;
                scope.spawn(move || {
                    let record = if i % 2 == 0 {
                        reporter.on_log_received("boom", trace, LogLevel::Exception)
                    } else {
                        reporter.report_exception(None, Failure::new("Exception", "boom", trace), Vec::new())
                    };
                    record.is_some()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    reporter.wait_idle();

    assert_eq!(admitted.iter().filter(|a| **a).count(), 1);
    assert_eq!(reporter.registry().len(), 1);
    assert_eq!(reporter.queue().len(), 1);
    assert_eq!(host.ready.lock().unwrap().len(), 1);
}

#[test]
fn ready_is_announced_once_per_record() {
    let host = Arc::new(RecordingHost::default());
    let reporter = reporter(host.clone());

    let record = reporter
        .on_log_received("boom", "Game.Level:Load (int)", LogLevel::Exception)
        .expect("admitted");
    reporter.wait_idle();
    reporter.ready(&record);
    reporter.wait_idle();

    assert_eq!(host.ready.lock().unwrap().len(), 1);
}

#[test]
fn global_reporter_is_installed_once() {
    let first = reporter(Arc::new(RecordingHost::default()));
    let second = reporter(Arc::new(RecordingHost::default()));

    assert!(reporting::install(first).is_ok());
    assert!(reporting::install(second).is_err());

    let installed = reporting::global().expect("installed");
    assert_eq!(installed.config().worker_threads, 2);
}

#[test]
fn only_exception_log_entries_are_admitted() {
    let host = Arc::new(RecordingHost::default());
    let reporter = reporter(host.clone());

    for level in [LogLevel::Log, LogLevel::Warning, LogLevel::Error, LogLevel::Assert] {
        assert!(reporter.on_log_received("boom", "Game.Level:Load (int)", level).is_none());
    }
    assert!(reporter.registry().is_empty());

    let record = reporter
        .on_log_received("boom", "Game.Level:Load (int)", LogLevel::Exception)
        .expect("admitted");
    reporter.wait_idle();

    assert!(record.is_ready());
    let affected: Vec<_> = record.affected().iter().map(|c| c.id.clone()).collect();
    assert_eq!(affected, vec!["LevelMod"]);
}

#[test]
fn blamed_components_are_always_affected() {
    let host = Arc::new(RecordingHost::default());
    let reporter = reporter(host);
    let blamed = ComponentRef::new("Reporter", "1.0", ComponentKind::Framework);

    let record = reporter
        .report_exception(
            None,
            Failure::new("Exception", "boom", "  at Game.Level.Load (System.Int32 index)"),
            vec![blamed.clone()],
        )
        .expect("admitted");
    reporter.wait_idle();

    let affected: Vec<_> = record.affected().iter().cloned().collect();
    assert_eq!(affected[0], blamed);
    assert_eq!(affected[1].id, "LevelMod");
}

struct FailingPatches;

impl PatchLayer for FailingPatches {
    fn patch_chain_of(&self, _method: &MethodHandle) -> anyhow::Result<PatchChain> {
        anyhow::bail!("patch registry unavailable")
    }
}

#[test]
fn collaborator_failure_discards_only_that_record() {
    let host = Arc::new(RecordingHost::default());
    let table = Arc::new(snapshot());
    let engine = Engine::new(FrameParser::default(), table, Arc::new(FailingPatches));
    let reporter = reporter_with(engine, host.clone());

    reporter.report_exception(
        None,
        Failure::new("Exception", "patched", "  at Game.Level.Load_Patch1 (System.Int32 index)"),
        Vec::new(),
    );
    reporter.report_exception(
        None,
        Failure::new("Exception", "plain", "  at Game.Level.Load (System.Int32 index)"),
        Vec::new(),
    );
    reporter.wait_idle();

    let failures = host.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], ResolutionFailure::Collaborator { .. }));
    assert_eq!(host.ready.lock().unwrap().as_slice(), ["plain"]);
    assert_eq!(reporter.queue().len(), 1);
}

struct PanickingTable;

impl SymbolTable for PanickingTable {
    fn resolve_type(&self, _qualified_name: &str) -> Option<TypeDescriptor> {
        panic!("symbol table torn down")
    }

    fn constructors_of(&self, _ty: &TypeDescriptor) -> Vec<MethodHandle> {
        Vec::new()
    }

    fn static_initializer_of(&self, _ty: &TypeDescriptor) -> Option<MethodHandle> {
        None
    }

    fn methods_named(&self, _ty: &TypeDescriptor, _name: &str) -> Vec<MethodHandle> {
        Vec::new()
    }

    fn owning_component_of(&self, _method: &MethodHandle) -> Option<ComponentRef> {
        None
    }

    fn module_of(&self, _method: &MethodHandle) -> ModuleId {
        ModuleId::new("unknown")
    }
}

#[test]
fn panics_during_resolution_are_reported_not_propagated() {
    let host = Arc::new(RecordingHost::default());
    let engine = Engine::new(
        FrameParser::default(),
        Arc::new(PanickingTable),
        Arc::new(snapshot()),
    );
    let reporter = reporter_with(engine, host.clone());

    reporter.report_exception(None, Failure::new("Exception", "boom", "  at A.B ()"), Vec::new());
    reporter.wait_idle();

    let failures = host.failures.lock().unwrap();
    assert_eq!(
        failures.as_slice(),
        [ResolutionFailure::panicked("symbol table torn down")]
    );
    assert!(reporter.queue().is_empty());
}

#[test]
fn foreground_ready_call_is_redispatched() {
    let host = Arc::new(RecordingHost::default());
    let reporter = reporter(host);
    reporter.dispatcher().register_foreground();

    let record = Arc::new(BugRecord::from_log_line("direct", "Game.Level:Load (int)"));
    reporter.ready(&record);
    reporter.wait_idle();

    assert!(record.is_ready());
}

#[test]
fn saving_reports_writes_file_and_reports_failures() {
    let host = Arc::new(RecordingHost::default());
    let reporter = reporter(host);
    reporter.on_log_received("boom", "Game.Level:Load (int)", LogLevel::Exception);
    reporter.wait_idle();
    let record = reporter.take_next_ready().expect("ready record");

    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("report.log");
    reporter.save_report(record.clone(), path.clone());
    reporter.wait_idle();
    let text = std::fs::read_to_string(&path).expect("report written");
    assert!(text.starts_with("boom\nGame.Level:Load (int)\n\n"));

    reporter.save_report(record, temp.path().join("missing").join("report.log"));
    reporter.wait_idle();

    let failed = reporter.take_next_ready().expect("save failure became a record");
    assert!(failed.error_message().starts_with(SAVE_FAILURE_KEY));
}
