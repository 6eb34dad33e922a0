//! Handling protocol tests driven through recording doubles.

use std::sync::{Arc, Barrier};
use std::thread;

use crashgate_core::testing::{
    CountingTerminator, FakeRegistry, LaunchFailure, RecordingHandler, RecordingHost,
    ScriptedInterceptor,
};
use crashgate_core::{
    CrashController, CrashControllerBuilder, Fault, FaultHandler, Installed, Payload,
    PresentationMode, Verdict,
};

struct Rig {
    host: Arc<RecordingHost>,
    terminator: Arc<CountingTerminator>,
    prior: Arc<RecordingHandler>,
}

impl Rig {
    fn new(host: RecordingHost) -> Self {
        Self {
            host: Arc::new(host),
            terminator: Arc::new(CountingTerminator::new()),
            prior: Arc::new(RecordingHandler::new()),
        }
    }

    fn builder(&self) -> CrashControllerBuilder {
        CrashController::builder(self.host.clone())
            .terminator(self.terminator.clone())
            .with_prior(self.prior.clone())
    }
}

fn rig() -> Rig {
    Rig::new(RecordingHost::new("com.example.app"))
}

#[test]
fn test_single_fire_under_concurrent_faults() {
    const THREADS: usize = 8;
    let rig = rig();
    let controller = rig.builder().pass_to_prior(true).build().unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let controller = controller.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let fault = Fault::new(format!("fault {i}"));
                barrier.wait();
                controller.handle(&fault)
            })
        })
        .collect();

    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(reports.iter().filter(|r| r.is_some()).count(), 1);
    assert_eq!(rig.host.launches().len(), 1);
    assert_eq!(rig.prior.count(), 1);
    assert_eq!(rig.terminator.count(), 1);
    assert!(controller.is_crashing());
}

#[test]
fn test_later_faults_are_dropped() {
    let rig = rig();
    let controller = rig.builder().build().unwrap();

    assert!(controller.handle(&Fault::new("first")).is_some());
    assert!(controller.handle(&Fault::new("second")).is_none());

    assert_eq!(rig.host.launches().len(), 1);
    assert_eq!(rig.terminator.count(), 1);
}

#[test]
fn test_before_hook_veto() {
    let rig = rig();
    let interceptor = Arc::new(ScriptedInterceptor::new(Verdict::StopAll, Verdict::Continue));
    let controller = rig
        .builder()
        .pass_to_prior(true)
        .interceptor(interceptor.clone())
        .build()
        .unwrap();

    let report = controller.handle(&Fault::new("boom")).unwrap();

    assert_eq!(report.before, Verdict::StopAll);
    assert_eq!(report.presented, None);
    assert_eq!(report.after, None);
    assert!(!report.chained);
    assert!(rig.host.launches().is_empty());
    assert!(interceptor.after_calls().is_empty());
    assert_eq!(rig.prior.count(), 0);
    assert_eq!(rig.terminator.count(), 1);
}

#[test]
fn test_before_hook_stop_chaining_still_presents() {
    let rig = rig();
    let interceptor = Arc::new(ScriptedInterceptor::new(
        Verdict::StopChaining,
        Verdict::Continue,
    ));
    let controller = rig
        .builder()
        .pass_to_prior(true)
        .interceptor(interceptor.clone())
        .build()
        .unwrap();

    let report = controller.handle(&Fault::new("boom")).unwrap();

    assert_eq!(report.presented, Some(true));
    assert!(!report.chained);
    assert_eq!(rig.host.launches().len(), 1);
    assert_eq!(interceptor.after_calls(), vec![true]);
    assert_eq!(rig.prior.count(), 0);
    assert_eq!(rig.terminator.count(), 1);
}

#[test]
fn test_after_hook_veto() {
    for after in [Verdict::StopAll, Verdict::StopChaining] {
        for pass in [true, false] {
            for failure in [LaunchFailure::None, LaunchFailure::Error] {
                let rig = Rig::new(RecordingHost::new("com.example.app").failing(failure));
                let controller = rig
                    .builder()
                    .pass_to_prior(pass)
                    .interceptor(Arc::new(ScriptedInterceptor::new(Verdict::Continue, after)))
                    .build()
                    .unwrap();

                let report = controller.handle(&Fault::new("boom")).unwrap();

                assert!(!report.chained, "after={after:?} pass={pass} failure={failure:?}");
                assert_eq!(rig.prior.count(), 0);
                assert_eq!(rig.terminator.count(), 1);
            }
        }
    }
}

#[test]
fn test_chaining_policy_table() {
    for pass in [true, false] {
        for success in [true, false] {
            for prior_present in [true, false] {
                let failure = if success {
                    LaunchFailure::None
                } else {
                    LaunchFailure::Error
                };
                let rig = Rig::new(RecordingHost::new("com.example.app").failing(failure));
                let mut builder = CrashController::builder(rig.host.clone())
                    .terminator(rig.terminator.clone())
                    .pass_to_prior(pass);
                if prior_present {
                    builder = builder.with_prior(rig.prior.clone());
                }
                let controller = builder.build().unwrap();

                let report = controller.handle(&Fault::new("boom")).unwrap();

                let expected = (pass || !success) && prior_present;
                let case = format!("pass={pass} success={success} prior={prior_present}");
                assert_eq!(report.presented, Some(success), "{case}");
                assert_eq!(report.chained, expected, "{case}");
                assert_eq!(rig.prior.count(), usize::from(expected), "{case}");
                assert_eq!(rig.terminator.count(), 1, "{case}");
            }
        }
    }
}

#[test]
fn test_force_pass_chains_after_successful_presentation() {
    let rig = rig();
    let controller = rig.builder().force_pass_to_prior(true).build().unwrap();

    let report = controller.handle(&Fault::new("boom")).unwrap();

    assert_eq!(report.presented, Some(true));
    assert!(report.chained);
    assert_eq!(rig.prior.messages(), vec!["boom"]);
}

#[test]
fn test_log_page_mode_dispatch() {
    let rig = rig();
    let controller = rig
        .builder()
        .mode(PresentationMode::LogPage)
        .highlight_keys(["Foo", "Bar"])
        .build()
        .unwrap();

    controller.handle(&Fault::new("boom").with_backtrace("  at Foo.bar()\n\tat Baz.qux()\n"));

    let launches = rig.host.launches();
    assert_eq!(launches.len(), 1);
    match &launches[0] {
        Payload::LogPage(page) => {
            assert_eq!(page.highlight_keys, vec!["com.example.app", "Foo", "Bar"]);
            assert_eq!(page.application_name, "app");
            assert!(page.crash_log_lines.contains(&"at Foo.bar()".to_string()));
            assert!(page.crash_log_lines.contains(&"at Baz.qux()".to_string()));
            assert!(page.raw_trace.contains("\tat Baz.qux()"));
        }
        other => panic!("expected log page, got {other:?}"),
    }
}

#[test]
fn test_dialog_mode_dispatch() {
    let rig = Rig::new(RecordingHost::new("com.example.app").with_label("Example"));
    let controller = rig
        .builder()
        .mode(PresentationMode::DialogUrl)
        .dialog_title("Crashed")
        .dialog_message(crashgate_core::DialogMessage::literal("A fix is available"))
        .dialog_url("https://example.com/fix")
        .build()
        .unwrap();

    controller.handle(&Fault::new("boom"));

    let launches = rig.host.launches();
    assert_eq!(launches.len(), 1);
    match &launches[0] {
        Payload::DialogUrl(dialog) => {
            assert_eq!(dialog.application_name, "Example");
            assert_eq!(dialog.title.as_deref(), Some("Crashed"));
            assert_eq!(dialog.message.as_deref(), Some("A fix is available"));
            assert_eq!(dialog.url, "https://example.com/fix");
        }
        other => panic!("expected dialog, got {other:?}"),
    }
}

#[test]
fn test_dispatch_panic_degrades_success() {
    let rig = Rig::new(RecordingHost::new("com.example.app").failing(LaunchFailure::Panic));
    let interceptor = Arc::new(ScriptedInterceptor::new(Verdict::Continue, Verdict::Continue));
    let controller = rig
        .builder()
        .pass_to_prior(false)
        .interceptor(interceptor.clone())
        .build()
        .unwrap();

    let report = controller.handle(&Fault::new("boom")).unwrap();

    assert_eq!(report.presented, Some(false));
    assert_eq!(interceptor.after_calls(), vec![false]);
    assert!(report.chained);
    assert_eq!(rig.prior.count(), 1);
    assert_eq!(rig.terminator.count(), 1);
}

#[test]
fn test_panicking_interceptor_counts_as_continue() {
    let rig = rig();
    let interceptor = Arc::new(ScriptedInterceptor::panicking());
    let controller = rig
        .builder()
        .interceptor(interceptor.clone())
        .build()
        .unwrap();

    let report = controller.handle(&Fault::new("boom")).unwrap();

    assert_eq!(interceptor.before_calls(), 1);
    assert_eq!(report.before, Verdict::Continue);
    assert_eq!(report.presented, Some(true));
    assert_eq!(rig.host.launches().len(), 1);
    assert_eq!(rig.terminator.count(), 1);
}

#[test]
fn test_install_captures_previous_handler() {
    let rig = Rig::new(RecordingHost::new("com.example.app").failing(LaunchFailure::Error));
    let registry = FakeRegistry::with_previous(rig.prior.clone());
    let controller = CrashController::builder(rig.host.clone())
        .terminator(rig.terminator.clone())
        .build()
        .unwrap();

    assert_eq!(controller.install(&registry).unwrap(), Installed::Installed);
    assert!(controller.has_prior());
    assert_eq!(
        controller.install(&registry).unwrap(),
        Installed::AlreadyCurrent
    );
    assert_eq!(registry.installs(), 1);

    // Dispatch fails, so the captured handler is chained
    let current = registry.current().unwrap();
    current.handle_fault(&Fault::new("boom"));
    assert_eq!(rig.prior.count(), 1);
}

#[test]
fn test_displaced_controller_reinstalls_and_chains_to_displacer() {
    let rig = Rig::new(RecordingHost::new("com.example.app").failing(LaunchFailure::Error));
    let registry = FakeRegistry::with_previous(rig.prior.clone());
    let controller = CrashController::builder(rig.host.clone())
        .terminator(rig.terminator.clone())
        .build()
        .unwrap();
    assert_eq!(controller.install(&registry).unwrap(), Installed::Installed);

    let displacer = Arc::new(RecordingHandler::new());
    registry.displace(displacer.clone());

    assert_eq!(controller.install(&registry).unwrap(), Installed::Installed);
    assert_eq!(registry.installs(), 2);
    assert!(Arc::ptr_eq(&registry.current().unwrap(), &controller));

    controller.handle(&Fault::new("boom"));
    assert_eq!(displacer.messages(), vec!["boom"]);
    assert_eq!(rig.prior.count(), 0);
}

#[test]
fn test_reinstall_without_displacement_is_noop() {
    let rig = rig();
    let registry = FakeRegistry::new();
    let controller = CrashController::builder(rig.host.clone())
        .terminator(rig.terminator.clone())
        .build()
        .unwrap();

    assert_eq!(controller.install(&registry).unwrap(), Installed::Installed);
    assert!(!controller.has_prior());
    assert_eq!(
        controller.install(&registry).unwrap(),
        Installed::AlreadyCurrent
    );
    assert_eq!(registry.installs(), 1);
}

#[test]
fn test_install_skipped_when_host_reports_running() {
    let rig = Rig::new(RecordingHost::new("com.example.app").running());
    let registry = FakeRegistry::new();
    let controller = CrashController::builder(rig.host.clone())
        .terminator(rig.terminator.clone())
        .build()
        .unwrap();

    assert_eq!(controller.install(&registry).unwrap(), Installed::Skipped);
    assert_eq!(registry.installs(), 0);
    assert!(registry.current().is_none());
}

#[test]
fn test_install_rejects_preset_prior() {
    let rig = rig();
    let registry = FakeRegistry::new();
    let controller = rig.builder().build().unwrap();

    assert!(controller.install(&registry).is_err());
    assert_eq!(registry.installs(), 0);
}

#[test]
fn test_handler_composes_into_host_chain() {
    let rig = rig();
    let controller = rig.builder().pass_to_prior(true).build().unwrap();
    let handler: Arc<dyn FaultHandler> = controller.handler();

    handler.handle_fault(&Fault::new("composed"));
    handler.handle_fault(&Fault::new("ignored"));

    assert_eq!(rig.host.launches().len(), 1);
    assert_eq!(rig.prior.messages(), vec!["composed"]);
    assert_eq!(rig.terminator.count(), 1);
}
